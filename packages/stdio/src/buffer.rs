//! Stream buffer memory and cursors.
//!
//! The buffer is a tagged variant over who owns the memory, so releasing
//! it is an exhaustive match rather than a flag test. Two cursors mark the
//! live sub-range: `start <= end <= size` after every operation.
//!
//! For descriptor streams `start..end` is either unread read-ahead or
//! pending write-behind, depending on the last operation. For in-memory
//! streams `end` is the content length and `start` the cursor.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StdioError};
use crate::mode::Ownership;

/// Caller-supplied buffer memory.
///
/// Cloning shares the same memory. The caller keeps a clone; a stream
/// holding another clone never frees the memory, and once the stream is
/// closed the caller can still inspect what was written through it.
#[derive(Debug, Clone)]
pub struct ExternalBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ExternalBuffer {
    /// A zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_vec(vec![0; size])
    }

    /// Wrap existing bytes. The length is fixed from here on.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the current contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// True if both values share the same memory.
    pub fn ptr_eq(&self, other: &ExternalBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum Storage {
    Owned(Vec<u8>),
    External(ExternalBuffer),
    None,
}

/// Snapshot of a buffer's cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub ownership: Ownership,
    pub start: usize,
    pub end: usize,
    pub size: usize,
}

pub(crate) struct Buffer {
    storage: Storage,
    start: usize,
    end: usize,
}

impl Buffer {
    /// Allocate a library-owned buffer. Allocation failure is reported,
    /// never aborts.
    pub(crate) fn owned(size: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| StdioError::OutOfMemory)?;
        bytes.resize(size, 0);
        Ok(Self::with_storage(Storage::Owned(bytes)))
    }

    pub(crate) fn external(buffer: ExternalBuffer) -> Self {
        Self::with_storage(Storage::External(buffer))
    }

    pub(crate) fn none() -> Self {
        Self::with_storage(Storage::None)
    }

    fn with_storage(storage: Storage) -> Self {
        Self {
            storage,
            start: 0,
            end: 0,
        }
    }

    pub(crate) fn ownership(&self) -> Ownership {
        match self.storage {
            Storage::Owned(_) => Ownership::Owned,
            Storage::External(_) => Ownership::External,
            Storage::None => Ownership::None,
        }
    }

    pub(crate) fn size(&self) -> usize {
        match &self.storage {
            Storage::Owned(bytes) => bytes.len(),
            Storage::External(buffer) => buffer.len(),
            Storage::None => 0,
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self.storage, Storage::None)
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    /// Bytes between the cursors.
    pub(crate) fn pending(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn is_full(&self) -> bool {
        self.end == self.size()
    }

    pub(crate) fn info(&self) -> BufferInfo {
        BufferInfo {
            ownership: self.ownership(),
            start: self.start,
            end: self.end,
            size: self.size(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Move both cursors. Callers must keep `start <= end <= size`.
    pub(crate) fn set_cursors(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.size());
        self.start = start;
        self.end = end;
    }

    /// Run `f` over the whole backing memory.
    pub(crate) fn with_bytes<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        match &mut self.storage {
            Storage::Owned(bytes) => f(bytes.as_mut_slice()),
            Storage::External(buffer) => f(buffer.lock().as_mut_slice()),
            Storage::None => f(&mut []),
        }
    }

    /// Copy unread bytes into `dst`, advancing `start`.
    pub(crate) fn take(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.pending());
        let (start, end) = (self.start, self.start + count);
        self.with_bytes(|bytes| dst[..count].copy_from_slice(&bytes[start..end]));
        self.consume(count);
        count
    }

    /// Append as much of `src` as fits after `end`.
    pub(crate) fn put(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.size() - self.end);
        let (start, end) = (self.end, self.end + count);
        self.with_bytes(|bytes| bytes[start..end].copy_from_slice(&src[..count]));
        self.end = end;
        count
    }

    /// Drop `count` bytes from the front of the live range.
    pub(crate) fn consume(&mut self, count: usize) {
        self.start += count.min(self.pending());
        if self.start == self.end {
            self.reset();
        }
    }

    /// Refill an empty buffer from `read`, which receives the whole
    /// backing memory and returns how much of it was filled.
    pub(crate) fn fill<E>(
        &mut self,
        read: impl FnOnce(&mut [u8]) -> std::result::Result<usize, E>,
    ) -> std::result::Result<usize, E> {
        debug_assert_eq!(self.pending(), 0);
        self.reset();
        let count = self.with_bytes(read)?;
        self.end = count.min(self.size());
        Ok(self.end)
    }

    /// Hand the live range to `write` and consume what it accepted.
    pub(crate) fn drain<E>(
        &mut self,
        write: impl FnOnce(&[u8]) -> std::result::Result<usize, E>,
    ) -> std::result::Result<usize, E> {
        let (start, end) = (self.start, self.end);
        let count = self.with_bytes(|bytes| write(&bytes[start..end]))?;
        self.consume(count);
        Ok(count)
    }

    /// Grow an owned buffer to at least `size` bytes.
    pub(crate) fn grow(&mut self, size: usize) -> Result<()> {
        let Storage::Owned(bytes) = &mut self.storage else {
            return Err(StdioError::InvalidArgument("only owned buffers can grow"));
        };
        if size <= bytes.len() {
            return Ok(());
        }

        let target = size.max(bytes.len().saturating_mul(2));
        bytes
            .try_reserve_exact(target - bytes.len())
            .map_err(|_| StdioError::OutOfMemory)?;
        bytes.resize(target, 0);
        Ok(())
    }

    /// Give the memory back to its owner.
    pub(crate) fn release(self) -> Ownership {
        match self.storage {
            Storage::Owned(bytes) => {
                drop(bytes);
                Ownership::Owned
            }
            // Only our reference goes away; the caller's stays valid.
            Storage::External(buffer) => {
                drop(buffer);
                Ownership::External
            }
            Storage::None => Ownership::None,
        }
    }
}
