//! Process identity and termination.

use crate::errno::Errno;

/// A process id.
pub type Pid = i32;

/// Signal-number bound. [`kill`] rejects anything above it.
pub const NSIG: i32 = 65;

/// The id of the calling process.
pub fn getpid() -> Pid {
    std::process::id() as Pid
}

/// Send `sig` to the process `pid`.
///
/// Signal 0 only checks that the target exists. A process ended by a
/// signal reports exit status `128 + sig` to its parent's shell.
pub fn kill(pid: Pid, sig: i32) -> Result<(), Errno> {
    if !(0..=NSIG).contains(&sig) {
        return Err(Errno::EINVAL);
    }
    tracing::trace!(pid, sig, "kill");
    native_kill(pid, sig)
}

#[cfg(unix)]
fn native_kill(pid: Pid, sig: i32) -> Result<(), Errno> {
    // SAFETY: kill(2) takes plain integers and touches no memory.
    let rc = unsafe { libc::kill(pid, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().into())
    }
}

#[cfg(not(unix))]
fn native_kill(pid: Pid, sig: i32) -> Result<(), Errno> {
    if pid != getpid() {
        return Err(Errno::ESRCH);
    }
    match sig {
        0 => Ok(()),
        _ => std::process::exit(128 + sig),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_matches_std() {
        assert_eq!(getpid() as u32, std::process::id());
    }

    #[test]
    fn signal_out_of_range() {
        assert_eq!(kill(getpid(), -1), Err(Errno::EINVAL));
        assert_eq!(kill(getpid(), NSIG + 1), Err(Errno::EINVAL));
    }

    #[test]
    fn null_signal_probes_existence() {
        assert_eq!(kill(getpid(), 0), Ok(()));
    }

    #[cfg(unix)]
    #[test]
    fn missing_process() {
        // Above the Linux pid_max ceiling.
        assert_eq!(kill(0x7fff_fff0, 0), Err(Errno::ESRCH));
    }

    #[cfg(unix)]
    #[test]
    fn terminate_child() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::Command;

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        kill(child.id() as Pid, libc::SIGTERM).unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
