//! hostlibc: POSIX stdio streams and process services over host file handles.
//!
//! This crate ties the layers together:
//! - [`sys`]: the native descriptor table, errno mapping, environment,
//!   process id and thread-specific storage
//! - [`stdio`]: the buffered stream engine
//!
//! The process-wide [`stdio()`] service runs over the native descriptor
//! table and has stdin, stdout and stderr registered on first use.
//! [`exit`] flushes and closes every open stream before the process ends.
//!
//! # Example
//!
//! ```rust,no_run
//! use hostlibc::FlushPolicy;
//!
//! let stdio = hostlibc::stdio();
//! let out = stdio.stdout().unwrap();
//! stdio.puts(out, "hello\n").unwrap();
//!
//! let log = stdio.open_path("run.log", "a", FlushPolicy::Full).unwrap();
//! stdio.puts(log, "started\n").unwrap();
//!
//! hostlibc::exit(0);
//! ```

use std::sync::Arc;

pub use hostlibc_stdio as stdio;
pub use hostlibc_sys as sys;

pub use hostlibc_stdio::{
    Access, BufferRequest, Errno, ExternalBuffer, FlushPolicy, Stdio, StdioConfig, StdioError,
    StreamHandle, StreamTarget, Whence,
};

lazy_static::lazy_static! {
    static ref STDIO: Stdio = {
        let stdio = Stdio::new(StdioConfig::default(), Arc::new(sys::fd::native()));
        if let Err(err) = stdio.open_standard_streams() {
            tracing::warn!(%err, "standard streams unavailable");
        }
        stdio
    };
}

/// The process-wide stream service.
pub fn stdio() -> &'static Stdio {
    &STDIO
}

/// Flush and close every open stream, then end the process.
pub fn exit(code: i32) -> ! {
    let finalized = STDIO.teardown();
    tracing::debug!(code, finalized, "exiting");
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlibc_sys::fd::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};

    #[test]
    fn standard_streams_are_registered() {
        let stdio = stdio();
        let fileno = |handle: Option<StreamHandle>| stdio.fileno(handle.unwrap()).unwrap();

        assert_eq!(fileno(stdio.stdin()), Some(STDIN_FILENO));
        assert_eq!(fileno(stdio.stdout()), Some(STDOUT_FILENO));
        assert_eq!(fileno(stdio.stderr()), Some(STDERR_FILENO));
    }

    #[test]
    fn standard_stream_buffering() {
        let stdio = stdio();
        let flush = |handle: Option<StreamHandle>| stdio.info(handle.unwrap()).unwrap().flush;

        assert_eq!(flush(stdio.stdin()), FlushPolicy::Full);
        assert_eq!(flush(stdio.stdout()), FlushPolicy::Line);
        assert_eq!(flush(stdio.stderr()), FlushPolicy::Unbuffered);
    }
}
