//! Error types for the stream engine.

use hostlibc_sys::Errno;
use thiserror::Error;

/// Errors returned by stream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StdioError {
    /// The handle is null, mistagged, closed, or never existed.
    #[error("invalid stream handle")]
    InvalidHandle,

    /// A malformed mode or argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Buffer allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// The registry is at capacity.
    #[error("too many open streams")]
    TooManyStreams,

    #[error("stream is not open for reading")]
    NotReadable,

    #[error("stream is not open for writing")]
    NotWritable,

    /// Process teardown already swept the registry.
    #[error("stream registry has been torn down")]
    ShutDown,

    /// A native call failed, or the stream carries a sticky error.
    #[error("i/o error: {0}")]
    Io(#[from] Errno),
}

impl StdioError {
    /// The POSIX error number reported for this error.
    pub fn errno(&self) -> Errno {
        match self {
            StdioError::InvalidHandle
            | StdioError::InvalidArgument(_)
            | StdioError::ShutDown => Errno::EINVAL,
            StdioError::OutOfMemory => Errno::ENOMEM,
            StdioError::TooManyStreams => Errno::EMFILE,
            StdioError::NotReadable | StdioError::NotWritable => Errno::EBADF,
            StdioError::Io(errno) => *errno,
        }
    }
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StdioError>;
