use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

/// Signal the whole process group led by `pid`. ESRCH (already gone) is not an error.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(e) => {
            tracing::debug!(pid, ?signal, error = %e, "killpg failed");
            false
        }
    }
}

pub(crate) fn term_group(pid: u32) -> bool {
    signal_group(pid, Signal::SIGTERM)
}

pub(crate) fn kill_group(pid: u32) -> bool {
    signal_group(pid, Signal::SIGKILL)
}

/// Whether any member of the group led by `pid` still exists.
pub(crate) fn group_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    killpg(Pid::from_raw(raw), None).is_ok()
}
