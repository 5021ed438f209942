//! Per-stream state and the buffered I/O paths.
//!
//! Everything here runs with the stream's lock already held by the
//! caller; nothing in this module locks.

use hostlibc_sys::{Descriptor, Errno, Fd, Whence};

use crate::buffer::{Buffer, BufferInfo};
use crate::config::{DualDirection, StdioConfig};
use crate::direction::{transition, LastOp, Request, SwitchAction};
use crate::error::{Result, StdioError};
use crate::mode::{Access, BufferRequest, DirectionClass, FlushPolicy, Ownership, StreamTarget};

/// Tag carried by every live stream. Cleared when the stream is
/// finalized so late callers see an invalid handle.
const STREAM_MAGIC: u32 = 0x5354_524d;

/// Sticky end-of-stream and error indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatus {
    pub eof: bool,
    pub error: Option<Errno>,
}

/// Snapshot of a stream's configuration and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub target: StreamTarget,
    pub class: DirectionClass,
    pub flush: FlushPolicy,
    pub last_op: LastOp,
    /// Logical offset, not counting read-ahead or write-behind.
    pub position: u64,
    pub status: StreamStatus,
    pub buffer: BufferInfo,
}

/// How to treat unread read-ahead being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Realign {
    /// Move the descriptor back to the logical position. An unseekable
    /// descriptor simply loses the read-ahead.
    Seek,
    /// As `Seek`, but keep the read-ahead if the descriptor is unseekable.
    KeepIfUnseekable,
}

pub(crate) struct StreamState {
    magic: u32,
    target: StreamTarget,
    access: Access,
    flush: FlushPolicy,
    class: DirectionClass,
    buffer: Buffer,
    /// Offset as seen by the caller, independent of read-ahead and
    /// write-behind.
    position: u64,
    last_op: LastOp,
    status: StreamStatus,
}

impl StreamState {
    pub(crate) fn open(
        target: StreamTarget,
        access: Access,
        flush: FlushPolicy,
        request: BufferRequest,
        config: &StdioConfig,
        io: &dyn Descriptor,
    ) -> Result<Self> {
        if !access.read && !access.write {
            return Err(StdioError::InvalidArgument(
                "stream must be opened for reading or writing",
            ));
        }

        let mut state = match target {
            StreamTarget::Memory => {
                let buffer = match request {
                    BufferRequest::None => {
                        return Err(StdioError::InvalidArgument(
                            "in-memory stream needs a buffer",
                        ))
                    }
                    BufferRequest::Owned(size) => Buffer::owned(size)?,
                    BufferRequest::External(external) => {
                        let mut buffer = Buffer::external(external);
                        // A readable stream over caller memory starts with
                        // that memory as its content.
                        if access.read {
                            let size = buffer.size();
                            buffer.set_cursors(0, size);
                        }
                        buffer
                    }
                };
                Self::new(
                    target,
                    access,
                    FlushPolicy::Full,
                    DirectionClass::for_access(access, DualDirection::Buffered),
                    buffer,
                )
            }
            StreamTarget::Descriptor(_) => {
                let class = DirectionClass::for_access(access, config.dual_direction);
                let (flush, buffer) = Self::configure(class, flush, request, config)?;
                Self::new(target, access, flush, class, buffer)
            }
        };

        if let StreamTarget::Descriptor(fd) = target {
            state.position = match io.seek(fd, 0, Whence::Current) {
                Ok(offset) => offset,
                Err(Errno::ESPIPE) => 0,
                Err(errno) => return Err(StdioError::Io(errno)),
            };
        }

        tracing::debug!(
            ?target,
            class = ?state.class,
            flush = ?state.flush,
            ownership = ?state.buffer.ownership(),
            size = state.buffer.size(),
            "stream opened"
        );
        Ok(state)
    }

    fn new(
        target: StreamTarget,
        access: Access,
        flush: FlushPolicy,
        class: DirectionClass,
        buffer: Buffer,
    ) -> Self {
        let position = buffer.start() as u64;
        Self {
            magic: STREAM_MAGIC,
            target,
            access,
            flush,
            class,
            buffer,
            position,
            last_op: LastOp::None,
            status: StreamStatus::default(),
        }
    }

    /// Resolve the buffer and effective flush policy for a descriptor
    /// stream. Any unbuffered axis wins: both-unbuffered streams, the
    /// unbuffered policy and a `None` request all end up with no buffer.
    fn configure(
        class: DirectionClass,
        flush: FlushPolicy,
        request: BufferRequest,
        config: &StdioConfig,
    ) -> Result<(FlushPolicy, Buffer)> {
        if class == DirectionClass::BothUnbuffered || flush == FlushPolicy::Unbuffered {
            return Ok((FlushPolicy::Unbuffered, Buffer::none()));
        }

        match request {
            BufferRequest::None => Ok((FlushPolicy::Unbuffered, Buffer::none())),
            BufferRequest::Owned(0) => Ok((flush, Buffer::owned(config.buffer_size.max(1))?)),
            BufferRequest::Owned(size) => Ok((flush, Buffer::owned(size)?)),
            BufferRequest::External(external) if external.is_empty() => Err(
                StdioError::InvalidArgument("external buffer must not be empty"),
            ),
            BufferRequest::External(external) => Ok((flush, Buffer::external(external))),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.magic == STREAM_MAGIC
    }

    pub(crate) fn sticky_error(&self) -> Option<Errno> {
        self.status.error
    }

    pub(crate) fn clear_status(&mut self) {
        self.status = StreamStatus::default();
    }

    pub(crate) fn fd(&self) -> Option<Fd> {
        self.target.fd()
    }

    pub(crate) fn info(&self) -> StreamInfo {
        StreamInfo {
            target: self.target,
            class: self.class,
            flush: self.flush,
            last_op: self.last_op,
            position: self.position,
            status: self.status,
            buffer: self.buffer.info(),
        }
    }

    /// Record a native failure in the sticky error flag.
    fn raise(&mut self, errno: Errno) -> StdioError {
        tracing::warn!(fd = ?self.target.fd(), %errno, "stream error");
        self.status.error = Some(errno);
        StdioError::Io(errno)
    }

    /// Record a usage failure that POSIX also reports through the error flag.
    fn refuse(&mut self, err: StdioError) -> StdioError {
        self.status.error = Some(err.errno());
        err
    }

    pub(crate) fn read(&mut self, io: &dyn Descriptor, dst: &mut [u8]) -> Result<usize> {
        if !self.access.read {
            return Err(self.refuse(StdioError::NotReadable));
        }
        if dst.is_empty() {
            return Ok(0);
        }
        let fd = match self.target {
            StreamTarget::Memory => return Ok(self.read_memory(dst)),
            StreamTarget::Descriptor(fd) => fd,
        };

        if self.status.eof && self.buffer.pending() == 0 {
            return Ok(0);
        }
        self.switch_direction(io, fd, Request::Read, Realign::Seek)?;

        if self.buffer.is_none() {
            let count = match io.read(fd, dst) {
                Ok(count) => count,
                Err(errno) => return Err(self.raise(errno)),
            };
            if count == 0 {
                self.status.eof = true;
            }
            self.position += count as u64;
            return Ok(count);
        }

        let mut delivered = 0;
        while delivered < dst.len() {
            if self.buffer.pending() == 0 {
                match self.fill(io, fd) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(err) if delivered == 0 => return Err(err),
                    Err(_) => break,
                }
            }
            delivered += self.buffer.take(&mut dst[delivered..]);
        }

        self.position += delivered as u64;
        Ok(delivered)
    }

    pub(crate) fn write(&mut self, io: &dyn Descriptor, src: &[u8]) -> Result<usize> {
        if !self.access.write {
            return Err(self.refuse(StdioError::NotWritable));
        }
        if src.is_empty() {
            return Ok(0);
        }
        let fd = match self.target {
            StreamTarget::Memory => return self.write_memory(src),
            StreamTarget::Descriptor(fd) => fd,
        };

        let resuming = self.last_op == LastOp::Write;
        self.switch_direction(io, fd, Request::Write, Realign::Seek)?;
        if self.access.append && !resuming {
            match io.seek(fd, 0, Whence::End) {
                Ok(end) => self.position = end,
                Err(Errno::ESPIPE) => {}
                Err(errno) => return Err(self.raise(errno)),
            }
        }

        if self.buffer.is_none() {
            let count = match io.write(fd, src) {
                Ok(count) => count,
                Err(errno) => return Err(self.raise(errno)),
            };
            self.position += count as u64;
            if count < src.len() {
                let err = self.raise(Errno::EIO);
                if count == 0 {
                    return Err(err);
                }
            }
            return Ok(count);
        }

        let mut accepted = 0;
        let mut failure = None;
        while accepted < src.len() {
            if self.buffer.is_full() {
                if let Err(err) = self.drain(io, fd) {
                    failure = Some(err);
                    break;
                }
            }
            accepted += self.buffer.put(&src[accepted..]);
        }

        if failure.is_none() {
            let triggered = match self.flush {
                FlushPolicy::Full => self.buffer.is_full(),
                FlushPolicy::Line => self.buffer.is_full() || src[..accepted].contains(&b'\n'),
                FlushPolicy::Unbuffered => true,
            };
            if triggered {
                failure = self.drain(io, fd).err();
            }
        }

        self.position += accepted as u64;
        match failure {
            Some(err) if accepted == 0 => Err(err),
            _ => Ok(accepted),
        }
    }

    pub(crate) fn seek(&mut self, io: &dyn Descriptor, offset: i64, whence: Whence) -> Result<u64> {
        let fd = match self.target {
            StreamTarget::Memory => return self.seek_memory(offset, whence),
            StreamTarget::Descriptor(fd) => fd,
        };

        let (native_offset, native_whence) = match whence {
            Whence::Start if offset < 0 => {
                return Err(StdioError::InvalidArgument("seek before start of stream"))
            }
            Whence::Start => (offset, Whence::Start),
            Whence::Current if self.class == DirectionClass::BothUnbuffered => {
                (offset, Whence::Current)
            }
            Whence::Current => {
                let target = i64::try_from(self.position)
                    .ok()
                    .and_then(|position| position.checked_add(offset))
                    .filter(|target| *target >= 0)
                    .ok_or(StdioError::InvalidArgument("seek before start of stream"))?;
                (target, Whence::Start)
            }
            Whence::End => (offset, Whence::End),
        };

        // The native seek is absolute for buffered streams, so read-ahead
        // is only dropped once it succeeds. A failure leaves the stream as
        // it was.
        let (action, next) = transition(self.last_op, Request::Reposition);
        if action == SwitchAction::DrainWrites {
            self.drain(io, fd)?;
        }
        let position = match io.seek(fd, native_offset, native_whence) {
            Ok(position) => position,
            Err(Errno::EINVAL) => return Err(StdioError::Io(Errno::EINVAL)),
            Err(errno) => return Err(self.raise(errno)),
        };

        if action == SwitchAction::DiscardReadAhead {
            tracing::trace!(fd, dropped = self.buffer.pending(), "read-ahead discarded");
            self.buffer.reset();
        }
        self.last_op = next;
        self.position = position;
        self.status.eof = false;
        Ok(position)
    }

    pub(crate) fn tell(&self, io: &dyn Descriptor) -> Result<u64> {
        match (self.target, self.class) {
            (StreamTarget::Descriptor(fd), DirectionClass::BothUnbuffered) => {
                Ok(io.seek(fd, 0, Whence::Current)?)
            }
            _ => Ok(self.position),
        }
    }

    pub(crate) fn flush(&mut self, io: &dyn Descriptor) -> Result<()> {
        match self.target {
            StreamTarget::Memory => Ok(()),
            StreamTarget::Descriptor(fd) => {
                self.switch_direction(io, fd, Request::Reposition, Realign::KeepIfUnseekable)
            }
        }
    }

    /// Replace the buffer. Pending writes are drained and read-ahead is
    /// dropped first; the new buffer is allocated before anything else is
    /// touched so an allocation failure leaves the stream unchanged.
    pub(crate) fn set_buffer(
        &mut self,
        io: &dyn Descriptor,
        flush: FlushPolicy,
        request: BufferRequest,
        config: &StdioConfig,
    ) -> Result<()> {
        let fd = match self.target {
            StreamTarget::Memory => {
                return Err(StdioError::InvalidArgument(
                    "in-memory streams cannot be rebuffered",
                ))
            }
            StreamTarget::Descriptor(fd) => fd,
        };

        let (flush, buffer) = Self::configure(self.class, flush, request, config)?;
        self.switch_direction(io, fd, Request::Reposition, Realign::Seek)?;

        let previous = std::mem::replace(&mut self.buffer, buffer);
        self.flush = flush;
        let released = previous.release();
        tracing::debug!(
            fd,
            ?flush,
            ownership = ?self.buffer.ownership(),
            size = self.buffer.size(),
            ?released,
            "stream rebuffered"
        );
        Ok(())
    }

    /// Read through the next newline, or until `max` bytes, end of
    /// stream, or an error.
    pub(crate) fn read_line(&mut self, io: &dyn Descriptor, max: usize) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while line.len() < max {
            match self.read(io, &mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(err) if line.is_empty() => return Err(err),
                Err(_) => break,
            }
        }
        Ok(line)
    }

    /// Content of an in-memory stream.
    pub(crate) fn memory_contents(&mut self) -> Option<Vec<u8>> {
        match self.target {
            StreamTarget::Memory => {
                let end = self.buffer.end();
                Some(self.buffer.with_bytes(|bytes| bytes[..end].to_vec()))
            }
            StreamTarget::Descriptor(_) => None,
        }
    }

    /// Flush, release the buffer and close the descriptor. The stream is
    /// dead afterwards whatever the outcome.
    pub(crate) fn finalize(&mut self, io: &dyn Descriptor) -> Result<()> {
        self.magic = 0;

        let mut result = Ok(());
        if let StreamTarget::Descriptor(fd) = self.target {
            if self.last_op == LastOp::Write && self.buffer.pending() > 0 {
                result = match self.status.error {
                    Some(errno) => Err(StdioError::Io(errno)),
                    None => self.drain(io, fd),
                };
            }
            if let Err(errno) = io.close(fd) {
                tracing::warn!(fd, %errno, "close failed");
                result = result.and(Err(StdioError::Io(errno)));
            }
        }

        let buffer = std::mem::replace(&mut self.buffer, Buffer::none());
        let released = buffer.release();
        tracing::debug!(target = ?self.target, ?released, "stream finalized");
        result
    }

    /// Apply the direction-switch table before `request`.
    fn switch_direction(
        &mut self,
        io: &dyn Descriptor,
        fd: Fd,
        request: Request,
        realign: Realign,
    ) -> Result<()> {
        let (action, next) = transition(self.last_op, request);
        match action {
            SwitchAction::Proceed => {}
            SwitchAction::DrainWrites => self.drain(io, fd)?,
            SwitchAction::DiscardReadAhead => {
                if !self.discard_read_ahead(io, fd, realign)? {
                    return Ok(());
                }
            }
        }
        self.last_op = next;
        Ok(())
    }

    /// Returns false when the read-ahead was kept.
    fn discard_read_ahead(&mut self, io: &dyn Descriptor, fd: Fd, realign: Realign) -> Result<bool> {
        if self.buffer.pending() == 0 {
            self.buffer.reset();
            return Ok(true);
        }

        let Ok(target) = i64::try_from(self.position) else {
            return Err(self.raise(Errno::EOVERFLOW));
        };
        match io.seek(fd, target, Whence::Start) {
            Ok(_) => {}
            Err(Errno::ESPIPE) if realign == Realign::KeepIfUnseekable => return Ok(false),
            Err(Errno::ESPIPE) => {}
            Err(errno) => return Err(self.raise(errno)),
        }

        tracing::trace!(fd, dropped = self.buffer.pending(), "read-ahead discarded");
        self.buffer.reset();
        Ok(true)
    }

    /// One native read into the empty buffer.
    fn fill(&mut self, io: &dyn Descriptor, fd: Fd) -> Result<usize> {
        match self.buffer.fill(|bytes| io.read(fd, bytes)) {
            Ok(0) => {
                self.status.eof = true;
                Ok(0)
            }
            Ok(count) => {
                tracing::trace!(fd, count, "buffer filled");
                Ok(count)
            }
            Err(errno) => Err(self.raise(errno)),
        }
    }

    /// One native write of everything buffered. Whatever the descriptor
    /// does not accept stays buffered for the next attempt.
    fn drain(&mut self, io: &dyn Descriptor, fd: Fd) -> Result<()> {
        let pending = self.buffer.pending();
        if pending == 0 {
            return Ok(());
        }

        match self.buffer.drain(|bytes| io.write(fd, bytes)) {
            Ok(written) if written == pending => {
                tracing::trace!(fd, written, "buffer drained");
                Ok(())
            }
            Ok(_) => Err(self.raise(Errno::EIO)),
            Err(errno) => Err(self.raise(errno)),
        }
    }

    fn read_memory(&mut self, dst: &mut [u8]) -> usize {
        let (start, end) = (self.buffer.start(), self.buffer.end());
        let count = dst.len().min(end - start);
        self.buffer
            .with_bytes(|bytes| dst[..count].copy_from_slice(&bytes[start..start + count]));
        self.buffer.set_cursors(start + count, end);
        self.position = (start + count) as u64;
        if count < dst.len() {
            self.status.eof = true;
        }
        count
    }

    fn write_memory(&mut self, src: &[u8]) -> Result<usize> {
        if self.access.append {
            let end = self.buffer.end();
            self.buffer.set_cursors(end, end);
        }

        let start = self.buffer.start();
        let wanted = start.saturating_add(src.len());
        if wanted > self.buffer.size() && self.buffer.ownership() == Ownership::Owned {
            if let Err(err) = self.buffer.grow(wanted) {
                return Err(self.refuse(err));
            }
        }

        let count = src.len().min(self.buffer.size() - start);
        self.buffer
            .with_bytes(|bytes| bytes[start..start + count].copy_from_slice(&src[..count]));
        let end = self.buffer.end().max(start + count);
        self.buffer.set_cursors(start + count, end);
        self.position = (start + count) as u64;

        if count < src.len() {
            let err = self.raise(Errno::ENOSPC);
            if count == 0 {
                return Err(err);
            }
        }
        Ok(count)
    }

    fn seek_memory(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let (start, end) = (self.buffer.start(), self.buffer.end());
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => start,
            Whence::End => end,
        };

        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target <= end)
            .ok_or(StdioError::InvalidArgument(
                "seek outside in-memory stream",
            ))?;

        self.buffer.set_cursors(target, end);
        self.position = target as u64;
        self.status.eof = false;
        Ok(self.position)
    }
}
