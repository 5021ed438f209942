//! # hostlibc-sys
//!
//! Native primitives underneath the hostlibc stream engine.
//!
//! This crate holds the one-shot translation calls that have no state
//! machine of their own: the integer descriptor layer over host file
//! handles, the mapping from native failures to POSIX error numbers, and a
//! few thin process services.
//!
//! ## Modules
//!
//! ```text
//! errno/   # POSIX error numbers, native error mapping
//! fd/      # Descriptor trait and the native descriptor table
//! env/     # getenv / setenv / unsetenv
//! proc/    # Process identity and kill
//! tss/     # Thread-specific storage keys
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use hostlibc_sys::fd::{self, Descriptor, OpenMode};
//!
//! let table = fd::native();
//! let fd = table.open("notes.txt".as_ref(), OpenMode::Write).unwrap();
//! table.write(fd, b"hello\n").unwrap();
//! table.close(fd).unwrap();
//! ```

pub mod env;
pub mod errno;
pub mod fd;
pub mod proc;
pub mod tss;

pub use errno::Errno;
pub use fd::{Descriptor, DescriptorTable, Fd, OpenMode, Whence};
pub use proc::{Pid, NSIG};
pub use tss::TssKey;
