//! Native descriptor layer.
//!
//! Integer descriptors backed by host file handles. The stream engine only
//! ever talks to this layer through the [`Descriptor`] trait, so tests and
//! embedders can substitute their own implementation.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::errno::Errno;

/// An integer file descriptor.
pub type Fd = i32;

pub const STDIN_FILENO: Fd = 0;
pub const STDOUT_FILENO: Fd = 1;
pub const STDERR_FILENO: Fd = 2;

lazy_static::lazy_static! {
    static ref NATIVE: DescriptorTable = DescriptorTable::new();
}

/// The process-wide descriptor table.
pub fn native() -> &'static DescriptorTable {
    &NATIVE
}

/// Origin for a seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Access mode a descriptor was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// `r`
    #[default]
    Read,
    /// `w`: create or truncate.
    Write,
    /// `a`: create, every write lands at the end.
    Append,
    /// `r+`
    ReadWrite,
    /// `w+`: create or truncate, readable.
    WriteRead,
    /// `a+`: create, readable, writes land at the end.
    AppendRead,
    /// `wx`: the file must not exist yet.
    CreateNew,
    /// `w+x`
    CreateNewReadWrite,
}

impl OpenMode {
    /// Parse an fopen-style mode string.
    ///
    /// `b` and `t` are accepted and ignored. `x` is only valid after `w`.
    pub fn parse(mode: &str) -> Result<Self, Errno> {
        let mut chars = mode.chars();
        let first = chars.next().ok_or(Errno::EINVAL)?;

        let mut plus = false;
        let mut exclusive = false;
        for c in chars {
            match c {
                '+' => plus = true,
                'x' => exclusive = true,
                'b' | 't' => {}
                _ => return Err(Errno::EINVAL),
            }
        }

        match (first, plus, exclusive) {
            ('r', false, false) => Ok(OpenMode::Read),
            ('r', true, false) => Ok(OpenMode::ReadWrite),
            ('w', false, false) => Ok(OpenMode::Write),
            ('w', true, false) => Ok(OpenMode::WriteRead),
            ('w', false, true) => Ok(OpenMode::CreateNew),
            ('w', true, true) => Ok(OpenMode::CreateNewReadWrite),
            ('a', false, false) => Ok(OpenMode::Append),
            ('a', true, false) => Ok(OpenMode::AppendRead),
            _ => Err(Errno::EINVAL),
        }
    }

    pub fn readable(self) -> bool {
        matches!(
            self,
            OpenMode::Read
                | OpenMode::ReadWrite
                | OpenMode::WriteRead
                | OpenMode::AppendRead
                | OpenMode::CreateNewReadWrite
        )
    }

    pub fn writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    pub fn append(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::AppendRead)
    }

    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.readable());
        match self {
            OpenMode::Read | OpenMode::ReadWrite => {
                options.write(self.writable());
            }
            OpenMode::Write | OpenMode::WriteRead => {
                options.write(true).create(true).truncate(true);
            }
            OpenMode::Append | OpenMode::AppendRead => {
                options.append(true).create(true);
            }
            OpenMode::CreateNew | OpenMode::CreateNewReadWrite => {
                options.write(true).create_new(true);
            }
        }
        options
    }
}

/// Blocking descriptor-level I/O.
///
/// Byte counts on success, a POSIX error number on failure. A read of zero
/// bytes means end of data.
pub trait Descriptor: Send + Sync {
    fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno>;

    fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno>;

    /// Reposition the descriptor and return the resulting absolute offset.
    fn seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno>;

    fn close(&self, fd: Fd) -> Result<(), Errno>;

    /// Open a path and return a new descriptor.
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Fd, Errno> {
        let _ = (path, mode);
        Err(Errno::ENOSYS)
    }
}

impl<D: Descriptor + ?Sized> Descriptor for &D {
    fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno> {
        (**self).read(fd, buf)
    }

    fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno> {
        (**self).write(fd, buf)
    }

    fn seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno> {
        (**self).seek(fd, offset, whence)
    }

    fn close(&self, fd: Fd) -> Result<(), Errno> {
        (**self).close(fd)
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Fd, Errno> {
        (**self).open(path, mode)
    }
}

enum Backing {
    File(File),
    Stdin,
    Stdout,
    Stderr,
}

/// An open descriptor.
struct OpenDescriptor {
    backing: Backing,
    mode: OpenMode,
}

/// Table of open descriptors, allocated lowest-number-first.
pub struct DescriptorTable {
    entries: RwLock<BTreeMap<Fd, Arc<OpenDescriptor>>>,
}

impl DescriptorTable {
    /// A table with 0, 1 and 2 bound to the process standard streams.
    pub fn new() -> Self {
        let table = Self::empty();
        {
            let mut entries = table.write_entries();
            for (fd, backing, mode) in [
                (STDIN_FILENO, Backing::Stdin, OpenMode::Read),
                (STDOUT_FILENO, Backing::Stdout, OpenMode::Write),
                (STDERR_FILENO, Backing::Stderr, OpenMode::Write),
            ] {
                entries.insert(
                    fd,
                    Arc::new(OpenDescriptor {
                        backing,
                        mode,
                    }),
                );
            }
        }
        table
    }

    /// A table with no descriptors at all.
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adopt an already open file under the lowest free descriptor.
    pub fn adopt(&self, file: File, mode: OpenMode) -> Fd {
        self.insert(OpenDescriptor {
            backing: Backing::File(file),
            mode,
        })
    }

    pub fn is_open(&self, fd: Fd) -> bool {
        self.read_entries().contains_key(&fd)
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, descriptor: OpenDescriptor) -> Fd {
        let mut entries = self.write_entries();
        let mut fd: Fd = 0;
        for &taken in entries.keys() {
            if taken != fd {
                break;
            }
            fd += 1;
        }
        entries.insert(fd, Arc::new(descriptor));
        fd
    }

    fn get(&self, fd: Fd) -> Result<Arc<OpenDescriptor>, Errno> {
        self.read_entries().get(&fd).cloned().ok_or(Errno::EBADF)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Fd, Arc<OpenDescriptor>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Fd, Arc<OpenDescriptor>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptor for DescriptorTable {
    fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno> {
        let descriptor = self.get(fd)?;
        if !descriptor.mode.readable() {
            return Err(Errno::EBADF);
        }

        let count = match &descriptor.backing {
            Backing::File(file) => {
                let mut file: &File = file;
                file.read(buf)
            }
            Backing::Stdin => io::stdin().lock().read(buf),
            Backing::Stdout | Backing::Stderr => return Err(Errno::EBADF),
        }?;
        tracing::trace!(fd, count, "native read");
        Ok(count)
    }

    fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno> {
        let descriptor = self.get(fd)?;
        if !descriptor.mode.writable() {
            return Err(Errno::EBADF);
        }

        let count = match &descriptor.backing {
            Backing::File(file) => {
                let mut file: &File = file;
                file.write(buf)
            }
            // The std handles keep their own buffer; push it out so the
            // byte really left this layer when we report it written.
            Backing::Stdout => {
                let mut out = io::stdout().lock();
                out.write(buf).and_then(|n| out.flush().map(|_| n))
            }
            Backing::Stderr => io::stderr().lock().write(buf),
            Backing::Stdin => return Err(Errno::EBADF),
        }?;
        tracing::trace!(fd, count, "native write");
        Ok(count)
    }

    fn seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno> {
        let descriptor = self.get(fd)?;
        let Backing::File(file) = &descriptor.backing else {
            return Err(Errno::ESPIPE);
        };

        let target = match whence {
            Whence::Start => {
                let start = u64::try_from(offset).map_err(|_| Errno::EINVAL)?;
                SeekFrom::Start(start)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };

        let mut file: &File = file;
        Ok(file.seek(target)?)
    }

    fn close(&self, fd: Fd) -> Result<(), Errno> {
        self.write_entries().remove(&fd).ok_or(Errno::EBADF)?;
        tracing::trace!(fd, "descriptor closed");
        Ok(())
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Fd, Errno> {
        let file = mode.options().open(path)?;
        let fd = self.insert(OpenDescriptor {
            backing: Backing::File(file),
            mode,
        });
        tracing::trace!(fd, path = %path.display(), ?mode, "descriptor opened");
        Ok(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn parse_mode_strings() {
        assert_eq!(OpenMode::parse("r").unwrap(), OpenMode::Read);
        assert_eq!(OpenMode::parse("rb").unwrap(), OpenMode::Read);
        assert_eq!(OpenMode::parse("r+").unwrap(), OpenMode::ReadWrite);
        assert_eq!(OpenMode::parse("rb+").unwrap(), OpenMode::ReadWrite);
        assert_eq!(OpenMode::parse("w").unwrap(), OpenMode::Write);
        assert_eq!(OpenMode::parse("w+").unwrap(), OpenMode::WriteRead);
        assert_eq!(OpenMode::parse("wx").unwrap(), OpenMode::CreateNew);
        assert_eq!(OpenMode::parse("w+x").unwrap(), OpenMode::CreateNewReadWrite);
        assert_eq!(OpenMode::parse("a").unwrap(), OpenMode::Append);
        assert_eq!(OpenMode::parse("a+").unwrap(), OpenMode::AppendRead);
    }

    #[test]
    fn parse_rejects_malformed_modes() {
        assert_eq!(OpenMode::parse(""), Err(Errno::EINVAL));
        assert_eq!(OpenMode::parse("q"), Err(Errno::EINVAL));
        assert_eq!(OpenMode::parse("rx"), Err(Errno::EINVAL));
        assert_eq!(OpenMode::parse("r?"), Err(Errno::EINVAL));
    }

    #[test]
    fn mode_capabilities() {
        assert!(OpenMode::Read.readable());
        assert!(!OpenMode::Read.writable());
        assert!(!OpenMode::Write.readable());
        assert!(OpenMode::AppendRead.append());
        assert!(OpenMode::AppendRead.readable());
        assert!(!OpenMode::ReadWrite.append());
    }

    #[test]
    fn standard_descriptors_are_preopened() {
        let table = DescriptorTable::new();
        assert!(table.is_open(STDIN_FILENO));
        assert!(table.is_open(STDOUT_FILENO));
        assert!(table.is_open(STDERR_FILENO));
        assert_eq!(table.seek(STDOUT_FILENO, 0, Whence::Current), Err(Errno::ESPIPE));
    }

    #[test]
    fn open_uses_lowest_free_descriptor() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::new();

        let a = table.open(&dir.path().join("a"), OpenMode::Write).unwrap();
        let b = table.open(&dir.path().join("b"), OpenMode::Write).unwrap();
        assert_eq!((a, b), (3, 4));

        table.close(a).unwrap();
        let c = table.open(&dir.path().join("c"), OpenMode::Write).unwrap();
        assert_eq!(c, 3);
    }

    #[test]
    fn write_seek_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::empty();
        let fd = table
            .open(&dir.path().join("data"), OpenMode::WriteRead)
            .unwrap();

        assert_eq!(table.write(fd, b"hello").unwrap(), 5);
        assert_eq!(table.seek(fd, 0, Whence::Current).unwrap(), 5);
        assert_eq!(table.seek(fd, 1, Whence::Start).unwrap(), 1);

        let mut buf = [0u8; 8];
        let n = table.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ello");
        assert_eq!(table.read(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_existing_file() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "contents").unwrap();

        let table = DescriptorTable::empty();
        let fd = table.open(temp.path(), OpenMode::Read).unwrap();
        let mut buf = [0u8; 16];
        let n = table.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"contents");
    }

    #[test]
    fn direction_is_enforced() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::empty();
        let fd = table.open(&dir.path().join("w"), OpenMode::Write).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(table.read(fd, &mut buf), Err(Errno::EBADF));
    }

    #[test]
    fn negative_absolute_seek_is_invalid() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::empty();
        let fd = table.open(&dir.path().join("s"), OpenMode::WriteRead).unwrap();
        assert_eq!(table.seek(fd, -1, Whence::Start), Err(Errno::EINVAL));
    }

    #[test]
    fn missing_file_maps_to_enoent() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::empty();
        let result = table.open(&dir.path().join("missing"), OpenMode::Read);
        assert_eq!(result, Err(Errno::ENOENT));
    }

    #[test]
    fn create_new_refuses_existing_file() {
        let temp = NamedTempFile::new().unwrap();
        let table = DescriptorTable::empty();
        assert_eq!(
            table.open(temp.path(), OpenMode::CreateNew),
            Err(Errno::EEXIST)
        );
    }

    #[test]
    fn closed_descriptor_is_bad() {
        let dir = TempDir::new().unwrap();
        let table = DescriptorTable::empty();
        let fd = table.open(&dir.path().join("c"), OpenMode::Write).unwrap();

        table.close(fd).unwrap();
        assert_eq!(table.close(fd), Err(Errno::EBADF));
        assert_eq!(table.write(fd, b"x"), Err(Errno::EBADF));
        assert!(table.is_empty());
    }

    #[test]
    fn adopt_existing_file() {
        let temp = NamedTempFile::new().unwrap();
        let file = temp.reopen().unwrap();
        let table = DescriptorTable::empty();
        let fd = table.adopt(file, OpenMode::Read);
        assert_eq!(fd, 0);
        assert_eq!(table.len(), 1);
    }
}
