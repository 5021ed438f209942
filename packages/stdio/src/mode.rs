//! Buffering modes and stream targets.
//!
//! A stream's behaviour is the product of three independent axes: who owns
//! the buffer memory ([`BufferRequest`] / [`Ownership`]), when buffered
//! output is pushed to the descriptor ([`FlushPolicy`]), and which
//! directions are cached at all ([`DirectionClass`]).

use hostlibc_sys::{Fd, OpenMode};

use crate::buffer::ExternalBuffer;
use crate::config::DualDirection;

/// What a stream reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    /// A descriptor serviced by the native layer.
    Descriptor(Fd),
    /// An in-memory stream. The buffer is the whole content and the
    /// native layer is never called.
    Memory,
}

impl StreamTarget {
    pub fn fd(self) -> Option<Fd> {
        match self {
            StreamTarget::Descriptor(fd) => Some(fd),
            StreamTarget::Memory => None,
        }
    }
}

/// When buffered output is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// On buffer full, explicit flush, or close.
    #[default]
    Full,
    /// As `Full`, and also whenever a newline is written.
    Line,
    /// No retention.
    Unbuffered,
}

/// Buffer memory requested at open or set-buffer time.
#[derive(Debug, Clone)]
pub enum BufferRequest {
    /// Allocate internally. Zero selects the configured default size.
    Owned(usize),
    /// Use caller memory. The caller keeps its own reference and the
    /// stream never frees it.
    External(ExternalBuffer),
    /// No buffer; every call passes straight through.
    None,
}

/// Who owns a stream's buffer memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    External,
    None,
}

/// Which directions a stream caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionClass {
    /// Read-only stream with read-ahead.
    ReadBuffered,
    /// Write-only stream with write-behind.
    WriteBuffered,
    /// Read-write stream caching both directions under the
    /// direction-switch rule.
    DualBuffered,
    /// Read-write stream caching neither direction.
    BothUnbuffered,
}

impl DirectionClass {
    pub(crate) fn for_access(access: Access, dual: DualDirection) -> Self {
        match (access.read, access.write, dual) {
            (true, false, _) => DirectionClass::ReadBuffered,
            (false, _, _) => DirectionClass::WriteBuffered,
            (true, true, DualDirection::Buffered) => DirectionClass::DualBuffered,
            (true, true, DualDirection::Unbuffered) => DirectionClass::BothUnbuffered,
        }
    }
}

/// Directions a stream was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    /// Every write lands at the current end of the descriptor.
    pub append: bool,
}

impl Access {
    pub const READ: Access = Access {
        read: true,
        write: false,
        append: false,
    };

    pub const WRITE: Access = Access {
        read: false,
        write: true,
        append: false,
    };

    pub const READ_WRITE: Access = Access {
        read: true,
        write: true,
        append: false,
    };
}

impl From<OpenMode> for Access {
    fn from(mode: OpenMode) -> Self {
        Access {
            read: mode.readable(),
            write: mode.writable(),
            append: mode.append(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_from_open_mode() {
        assert_eq!(Access::from(OpenMode::Read), Access::READ);
        assert_eq!(Access::from(OpenMode::Write), Access::WRITE);
        assert_eq!(Access::from(OpenMode::ReadWrite), Access::READ_WRITE);

        let append = Access::from(OpenMode::AppendRead);
        assert!(append.read && append.write && append.append);
    }

    #[test]
    fn direction_class_follows_access() {
        let buffered = DualDirection::Buffered;
        assert_eq!(
            DirectionClass::for_access(Access::READ, buffered),
            DirectionClass::ReadBuffered
        );
        assert_eq!(
            DirectionClass::for_access(Access::WRITE, buffered),
            DirectionClass::WriteBuffered
        );
        assert_eq!(
            DirectionClass::for_access(Access::READ_WRITE, buffered),
            DirectionClass::DualBuffered
        );
        assert_eq!(
            DirectionClass::for_access(Access::READ_WRITE, DualDirection::Unbuffered),
            DirectionClass::BothUnbuffered
        );
    }

    #[test]
    fn memory_target_has_no_fd() {
        assert_eq!(StreamTarget::Memory.fd(), None);
        assert_eq!(StreamTarget::Descriptor(3).fd(), Some(3));
    }
}
