//! POSIX error numbers and the native error mapping.
//!
//! Every failure surfaced by the native layer is translated into an
//! [`Errno`] before it reaches the stream engine. On Unix hosts the raw OS
//! code already is a POSIX code and passes through unchanged; everywhere
//! else the portable [`std::io::ErrorKind`] is folded onto the closest
//! POSIX value.

use std::io;

/// A POSIX error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const ESRCH: Errno = Errno(3);
    pub const EINTR: Errno = Errno(4);
    pub const EIO: Errno = Errno(5);
    pub const EBADF: Errno = Errno(9);
    pub const EAGAIN: Errno = Errno(11);
    pub const ENOMEM: Errno = Errno(12);
    pub const EACCES: Errno = Errno(13);
    pub const EEXIST: Errno = Errno(17);
    pub const ENOTDIR: Errno = Errno(20);
    pub const EISDIR: Errno = Errno(21);
    pub const EINVAL: Errno = Errno(22);
    pub const EMFILE: Errno = Errno(24);
    pub const EFBIG: Errno = Errno(27);
    pub const ENOSPC: Errno = Errno(28);
    pub const ESPIPE: Errno = Errno(29);
    pub const EROFS: Errno = Errno(30);
    pub const EPIPE: Errno = Errno(32);
    pub const ENOSYS: Errno = Errno(38);
    pub const EOVERFLOW: Errno = Errno(75);
    pub const EADDRINUSE: Errno = Errno(98);
    pub const EADDRNOTAVAIL: Errno = Errno(99);
    pub const ECONNABORTED: Errno = Errno(103);
    pub const ECONNRESET: Errno = Errno(104);
    pub const ENOTCONN: Errno = Errno(107);
    pub const ETIMEDOUT: Errno = Errno(110);
    pub const ECONNREFUSED: Errno = Errno(111);

    /// Wrap a raw error number.
    pub const fn from_raw(code: i32) -> Self {
        Errno(code)
    }

    /// The raw error number.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The `strerror` text for this code.
    pub fn message(self) -> &'static str {
        match self {
            Errno(0) => "Success",
            Errno::EPERM => "Operation not permitted",
            Errno::ENOENT => "No such file or directory",
            Errno::ESRCH => "No such process",
            Errno::EINTR => "Interrupted system call",
            Errno::EIO => "Input/output error",
            Errno::EBADF => "Bad file descriptor",
            Errno::EAGAIN => "Resource temporarily unavailable",
            Errno::ENOMEM => "Cannot allocate memory",
            Errno::EACCES => "Permission denied",
            Errno::EEXIST => "File exists",
            Errno::ENOTDIR => "Not a directory",
            Errno::EISDIR => "Is a directory",
            Errno::EINVAL => "Invalid argument",
            Errno::EMFILE => "Too many open files",
            Errno::EFBIG => "File too large",
            Errno::ENOSPC => "No space left on device",
            Errno::ESPIPE => "Illegal seek",
            Errno::EROFS => "Read-only file system",
            Errno::EPIPE => "Broken pipe",
            Errno::ENOSYS => "Function not implemented",
            Errno::EOVERFLOW => "Value too large for defined data type",
            Errno::EADDRINUSE => "Address already in use",
            Errno::EADDRNOTAVAIL => "Cannot assign requested address",
            Errno::ECONNABORTED => "Software caused connection abort",
            Errno::ECONNRESET => "Connection reset by peer",
            Errno::ENOTCONN => "Transport endpoint is not connected",
            Errno::ETIMEDOUT => "Connection timed out",
            Errno::ECONNREFUSED => "Connection refused",
            _ => "Unknown error",
        }
    }

    /// Map a native I/O failure onto a POSIX error number.
    pub fn from_io_error(err: &io::Error) -> Self {
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            return Errno(code);
        }
        Self::from_kind(err.kind())
    }

    /// Fold a portable error kind onto the closest POSIX code.
    pub fn from_kind(kind: io::ErrorKind) -> Self {
        use io::ErrorKind;

        match kind {
            ErrorKind::NotFound => Errno::ENOENT,
            ErrorKind::PermissionDenied => Errno::EACCES,
            ErrorKind::ConnectionRefused => Errno::ECONNREFUSED,
            ErrorKind::ConnectionReset => Errno::ECONNRESET,
            ErrorKind::ConnectionAborted => Errno::ECONNABORTED,
            ErrorKind::NotConnected => Errno::ENOTCONN,
            ErrorKind::AddrInUse => Errno::EADDRINUSE,
            ErrorKind::AddrNotAvailable => Errno::EADDRNOTAVAIL,
            ErrorKind::BrokenPipe => Errno::EPIPE,
            ErrorKind::AlreadyExists => Errno::EEXIST,
            ErrorKind::WouldBlock => Errno::EAGAIN,
            ErrorKind::InvalidInput => Errno::EINVAL,
            ErrorKind::TimedOut => Errno::ETIMEDOUT,
            ErrorKind::Interrupted => Errno::EINTR,
            ErrorKind::Unsupported => Errno::ENOSYS,
            ErrorKind::OutOfMemory => Errno::ENOMEM,
            ErrorKind::WriteZero => Errno::ENOSPC,
            _ => Errno::EIO,
        }
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (errno {})", self.message(), self.0)
    }
}

impl std::error::Error for Errno {}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        Errno::from_io_error(&err)
    }
}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message_and_code() {
        let text = format!("{}", Errno::EBADF);
        assert!(text.contains("Bad file descriptor"));
        assert!(text.contains("9"));
    }

    #[test]
    fn unknown_code_has_generic_message() {
        assert_eq!(Errno::from_raw(4242).message(), "Unknown error");
    }

    #[test]
    fn kinds_map_to_posix_codes() {
        assert_eq!(Errno::from_kind(io::ErrorKind::NotFound), Errno::ENOENT);
        assert_eq!(Errno::from_kind(io::ErrorKind::PermissionDenied), Errno::EACCES);
        assert_eq!(Errno::from_kind(io::ErrorKind::InvalidInput), Errno::EINVAL);
        assert_eq!(Errno::from_kind(io::ErrorKind::BrokenPipe), Errno::EPIPE);
        assert_eq!(Errno::from_kind(io::ErrorKind::Other), Errno::EIO);
    }

    #[test]
    fn io_error_without_os_code_uses_kind() {
        let err = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        assert_eq!(Errno::from(err), Errno::EEXIST);
    }

    #[cfg(unix)]
    #[test]
    fn raw_os_code_passes_through() {
        let err = io::Error::from_raw_os_error(Errno::ESPIPE.raw());
        assert_eq!(Errno::from_io_error(&err), Errno::ESPIPE);
    }
}
