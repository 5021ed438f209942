//! # hostlibc-stdio
//!
//! POSIX buffered streams over an integer descriptor layer.
//!
//! A [`Stdio`] service keeps a registry of open streams. Each stream owns a
//! buffer that batches reads into read-ahead and writes into write-behind,
//! so most calls never reach the descriptor. A stream's behaviour is fixed
//! by three axes chosen at open time:
//!
//! - who owns the buffer memory ([`BufferRequest`]),
//! - when output is pushed out ([`FlushPolicy`]),
//! - which directions are cached ([`DirectionClass`]).
//!
//! Streams opened for both reading and writing switch direction through a
//! small state machine: buffered writes are drained before a read, and
//! unread read-ahead is dropped (with the descriptor moved back to the
//! logical position) before a write or seek.
//!
//! Errors follow the C convention. A call that moves some bytes before a
//! failure returns the partial count and sets the stream's error flag;
//! [`Stdio::is_error`] and [`Stdio::last_error`] report it until
//! [`Stdio::clear_error`].
//!
//! ## Modules
//!
//! ```text
//! stdio/      # The service: handle resolution, locking, public operations
//! stream/     # Per-stream state, fill/drain, seek, close
//! direction/  # Direction-switch transition table
//! buffer/     # Buffer memory and cursors
//! registry/   # Slot table of open streams
//! handle/     # Stream handles and their raw form
//! mode/       # Targets, access, flush policy, buffer requests
//! config/     # StdioConfig
//! error/      # StdioError
//! ```

mod buffer;
mod config;
mod direction;
mod error;
mod handle;
mod mode;
mod registry;
mod stdio;
mod stream;

pub use buffer::{BufferInfo, ExternalBuffer};
pub use config::{DualDirection, StdioConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_STREAMS};
pub use direction::LastOp;
pub use error::{Result, StdioError};
pub use handle::StreamHandle;
pub use mode::{Access, BufferRequest, DirectionClass, FlushPolicy, Ownership, StreamTarget};
pub use stdio::{StandardStreams, Stdio};
pub use stream::{StreamInfo, StreamStatus};

// Re-export the descriptor layer types that appear in this crate's API
pub use hostlibc_sys::{Descriptor, Errno, Fd, OpenMode, Whence};
