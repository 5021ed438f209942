//! The stream service.
//!
//! `Stdio` owns the registry and the descriptor layer. Every operation
//! follows the same discipline: resolve the handle under the registry lock,
//! release it, then take the stream's own lock and check the stream is
//! still live before touching it. No call ever holds two locks at once.

use std::path::Path;
use std::sync::{Arc, MutexGuard, OnceLock};

use hostlibc_sys::fd::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use hostlibc_sys::{Descriptor, Errno, Fd, OpenMode, Whence};

use crate::config::StdioConfig;
use crate::error::{Result, StdioError};
use crate::handle::StreamHandle;
use crate::mode::{Access, BufferRequest, FlushPolicy, StreamTarget};
use crate::registry::{Registry, SharedStream};
use crate::stream::{StreamInfo, StreamState};

/// Whether an operation is refused while the stream's error flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    FailFast,
    Always,
}

/// Handles of the three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardStreams {
    pub stdin: StreamHandle,
    pub stdout: StreamHandle,
    pub stderr: StreamHandle,
}

/// A registry of buffered streams over a descriptor layer.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use hostlibc_stdio::{Access, BufferRequest, FlushPolicy, Stdio, StdioConfig, StreamTarget};
/// use hostlibc_sys::DescriptorTable;
///
/// let stdio = Stdio::new(StdioConfig::default(), Arc::new(DescriptorTable::empty()));
/// let stream = stdio
///     .open_stream(
///         StreamTarget::Memory,
///         Access::READ_WRITE,
///         FlushPolicy::Full,
///         BufferRequest::Owned(0),
///     )
///     .unwrap();
///
/// stdio.puts(stream, "hello").unwrap();
/// assert_eq!(stdio.memory_contents(stream).unwrap(), b"hello");
/// stdio.close_stream(stream).unwrap();
/// ```
pub struct Stdio {
    config: StdioConfig,
    io: Arc<dyn Descriptor>,
    registry: Registry,
    standard: OnceLock<StandardStreams>,
}

fn lock(stream: &SharedStream) -> MutexGuard<'_, StreamState> {
    stream.lock().unwrap_or_else(|e| e.into_inner())
}

impl Stdio {
    pub fn new(config: StdioConfig, io: Arc<dyn Descriptor>) -> Self {
        let registry = Registry::new(config.max_streams);
        Self {
            config,
            io,
            registry,
            standard: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &StdioConfig {
        &self.config
    }

    /// Create a stream and register it.
    ///
    /// On failure nothing is registered and a descriptor target is left
    /// open for the caller.
    pub fn open_stream(
        &self,
        target: StreamTarget,
        access: Access,
        flush: FlushPolicy,
        buffer: BufferRequest,
    ) -> Result<StreamHandle> {
        if self.registry.is_closed() {
            return Err(StdioError::ShutDown);
        }
        let state =
            StreamState::open(target, access, flush, buffer, &self.config, &*self.io)?;
        let handle = self.registry.register(state)?;
        tracing::debug!(?handle, ?target, "stream registered");
        Ok(handle)
    }

    /// Open `path` with an fopen-style mode string.
    pub fn open_path(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        flush: FlushPolicy,
    ) -> Result<StreamHandle> {
        let mode = OpenMode::parse(mode)
            .map_err(|_| StdioError::InvalidArgument("malformed mode string"))?;
        let fd = self.io.open(path.as_ref(), mode)?;

        match self.open_stream(
            StreamTarget::Descriptor(fd),
            Access::from(mode),
            flush,
            BufferRequest::Owned(0),
        ) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                if let Err(errno) = self.io.close(fd) {
                    tracing::warn!(fd, %errno, "close after failed open");
                }
                Err(err)
            }
        }
    }

    /// Register streams over descriptors 0, 1 and 2: stdin fully
    /// buffered, stdout line buffered, stderr unbuffered. Calling this
    /// again returns the streams already registered.
    pub fn open_standard_streams(&self) -> Result<StandardStreams> {
        if let Some(streams) = self.standard.get() {
            return Ok(*streams);
        }

        let owned = BufferRequest::Owned(0);
        let stdin = self.open_stream(
            StreamTarget::Descriptor(STDIN_FILENO),
            Access::READ,
            FlushPolicy::Full,
            owned.clone(),
        )?;
        let stdout = self.open_stream(
            StreamTarget::Descriptor(STDOUT_FILENO),
            Access::WRITE,
            FlushPolicy::Line,
            owned,
        )?;
        let stderr = self.open_stream(
            StreamTarget::Descriptor(STDERR_FILENO),
            Access::WRITE,
            FlushPolicy::Unbuffered,
            BufferRequest::None,
        )?;
        let streams = StandardStreams {
            stdin,
            stdout,
            stderr,
        };

        if self.standard.set(streams).is_err() {
            // Lost a race with another caller; drop our registrations
            // without closing the shared descriptors.
            for handle in [stdin, stdout, stderr] {
                self.registry.unregister(handle);
            }
        }
        self.standard.get().copied().ok_or(StdioError::InvalidHandle)
    }

    pub fn stdin(&self) -> Option<StreamHandle> {
        self.standard.get().map(|streams| streams.stdin)
    }

    pub fn stdout(&self) -> Option<StreamHandle> {
        self.standard.get().map(|streams| streams.stdout)
    }

    pub fn stderr(&self) -> Option<StreamHandle> {
        self.standard.get().map(|streams| streams.stderr)
    }

    /// Resolve a handle that crossed a raw integer boundary.
    pub fn resolve_raw(&self, raw: u64) -> Result<StreamHandle> {
        let handle = StreamHandle::from_raw(raw).ok_or(StdioError::InvalidHandle)?;
        match self.registry.lookup(handle) {
            Some(_) => Ok(handle),
            None => Err(StdioError::InvalidHandle),
        }
    }

    fn with_stream<T>(
        &self,
        handle: StreamHandle,
        gate: Gate,
        op: impl FnOnce(&mut StreamState, &dyn Descriptor) -> Result<T>,
    ) -> Result<T> {
        let stream = self
            .registry
            .lookup(handle)
            .ok_or(StdioError::InvalidHandle)?;
        let mut state = lock(&stream);
        if !state.is_live() {
            return Err(StdioError::InvalidHandle);
        }
        if gate == Gate::FailFast {
            if let Some(errno) = state.sticky_error() {
                return Err(StdioError::Io(errno));
            }
        }
        op(&mut state, &*self.io)
    }

    /// Read up to `buf.len()` bytes. A short count means end of stream or
    /// an error; check [`Stdio::is_eof`] and [`Stdio::is_error`].
    pub fn read(&self, handle: StreamHandle, buf: &mut [u8]) -> Result<usize> {
        self.with_stream(handle, Gate::FailFast, |state, io| state.read(io, buf))
    }

    /// Read one byte. `None` at end of stream.
    pub fn getc(&self, handle: StreamHandle) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(handle, &mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Read through the next newline, or at most `max` bytes. An empty
    /// result means end of stream.
    pub fn read_line(&self, handle: StreamHandle, max: usize) -> Result<Vec<u8>> {
        self.with_stream(handle, Gate::FailFast, |state, io| state.read_line(io, max))
    }

    /// Write `buf`, returning how much of it was accepted. A short count
    /// leaves the error flag set.
    pub fn write(&self, handle: StreamHandle, buf: &[u8]) -> Result<usize> {
        self.with_stream(handle, Gate::FailFast, |state, io| state.write(io, buf))
    }

    pub fn putc(&self, handle: StreamHandle, byte: u8) -> Result<()> {
        self.write(handle, &[byte]).map(|_| ())
    }

    /// Write a string. No newline is added.
    pub fn puts(&self, handle: StreamHandle, s: &str) -> Result<usize> {
        self.write(handle, s.as_bytes())
    }

    /// Reposition the stream and return the new offset. Clears end of
    /// stream.
    pub fn seek(&self, handle: StreamHandle, offset: i64, whence: Whence) -> Result<u64> {
        self.with_stream(handle, Gate::FailFast, |state, io| {
            state.seek(io, offset, whence)
        })
    }

    /// The logical offset: where the next read or write would happen.
    pub fn tell(&self, handle: StreamHandle) -> Result<u64> {
        self.with_stream(handle, Gate::Always, |state, io| state.tell(io))
    }

    /// Seek to the start and clear both flags.
    pub fn rewind(&self, handle: StreamHandle) -> Result<()> {
        self.with_stream(handle, Gate::Always, |state, io| {
            state.clear_status();
            state.seek(io, 0, Whence::Start)?;
            state.clear_status();
            Ok(())
        })
    }

    pub fn flush(&self, handle: StreamHandle) -> Result<()> {
        self.with_stream(handle, Gate::FailFast, |state, io| state.flush(io))
    }

    /// Flush every registered stream. All streams are attempted; the
    /// first failure is returned.
    pub fn flush_all(&self) -> Result<()> {
        let mut result = Ok(());
        for stream in self.registry.snapshot() {
            let mut state = lock(&stream);
            if !state.is_live() {
                continue;
            }
            let outcome = match state.sticky_error() {
                Some(errno) => Err(StdioError::Io(errno)),
                None => state.flush(&*self.io),
            };
            result = result.and(outcome);
        }
        result
    }

    /// Replace a stream's buffer and flush policy.
    ///
    /// Pending writes are drained and read-ahead dropped first; if that
    /// fails the stream keeps its old buffer.
    pub fn set_buffer(
        &self,
        handle: StreamHandle,
        flush: FlushPolicy,
        buffer: BufferRequest,
    ) -> Result<()> {
        self.with_stream(handle, Gate::FailFast, |state, io| {
            state.set_buffer(io, flush, buffer, &self.config)
        })
    }

    pub fn is_eof(&self, handle: StreamHandle) -> Result<bool> {
        self.with_stream(handle, Gate::Always, |state, _| Ok(state.info().status.eof))
    }

    pub fn is_error(&self, handle: StreamHandle) -> Result<bool> {
        Ok(self.last_error(handle)?.is_some())
    }

    /// The error that set the error flag, if it is set.
    pub fn last_error(&self, handle: StreamHandle) -> Result<Option<Errno>> {
        self.with_stream(handle, Gate::Always, |state, _| Ok(state.sticky_error()))
    }

    /// Clear both the end-of-stream and error flags.
    pub fn clear_error(&self, handle: StreamHandle) -> Result<()> {
        self.with_stream(handle, Gate::Always, |state, _| {
            state.clear_status();
            Ok(())
        })
    }

    /// The descriptor under a stream, `None` for in-memory streams.
    pub fn fileno(&self, handle: StreamHandle) -> Result<Option<Fd>> {
        self.with_stream(handle, Gate::Always, |state, _| Ok(state.fd()))
    }

    /// Bytes held by an in-memory stream.
    pub fn memory_contents(&self, handle: StreamHandle) -> Result<Vec<u8>> {
        self.with_stream(handle, Gate::Always, |state, _| {
            state
                .memory_contents()
                .ok_or(StdioError::InvalidArgument("not an in-memory stream"))
        })
    }

    pub fn info(&self, handle: StreamHandle) -> Result<StreamInfo> {
        self.with_stream(handle, Gate::Always, |state, _| Ok(state.info()))
    }

    /// Flush and close a stream, then close its descriptor.
    ///
    /// The handle is dead afterwards even when an error is returned.
    pub fn close_stream(&self, handle: StreamHandle) -> Result<()> {
        let stream = self
            .registry
            .unregister(handle)
            .ok_or(StdioError::InvalidHandle)?;
        let mut state = lock(&stream);
        if !state.is_live() {
            return Err(StdioError::InvalidHandle);
        }
        let result = state.finalize(&*self.io);
        tracing::debug!(?handle, ok = result.is_ok(), "stream closed");
        result
    }

    /// Finalize every registered stream and refuse new registrations.
    /// Returns how many streams were finalized.
    pub fn teardown(&self) -> usize {
        let streams = self.registry.drain_all();
        let mut finalized = 0;
        for stream in &streams {
            let mut state = lock(stream);
            if !state.is_live() {
                continue;
            }
            if let Err(err) = state.finalize(&*self.io) {
                tracing::warn!(fd = ?state.fd(), %err, "finalize during teardown failed");
            }
            finalized += 1;
        }
        tracing::debug!(finalized, "stream registry torn down");
        finalized
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Stdio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stdio")
            .field("config", &self.config)
            .field("streams", &self.len())
            .finish()
    }
}
