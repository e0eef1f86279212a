//! Worker Process Lifecycle
//!
//! Fork a worker that runs a blocking loop, and reap it when the session
//! ends. Every transport creates its channel handles first, then forks; each
//! side drops the handles that belong to the other before doing anything else.

use std::panic::{self, AssertUnwindSafe};

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use super::TransportError;

/// Exit status of a worker whose loop returned an error
pub const WORKER_FAILURE_EXIT: i32 = 1;

/// Exit status of a worker whose loop panicked
pub const WORKER_PANIC_EXIT: i32 = 101;

/// Fork a worker process
///
/// In the parent, `worker` is dropped (closing any handles it captured) and
/// the parent-side handles are handed back with the child's pid. In the
/// child, `parent_side` is dropped, `worker` runs to completion and the
/// process exits; this function never returns there.
///
/// # Errors
///
/// Returns `TransportError::ResourceAcquisition` if `fork` fails.
pub fn fork_worker<P, F>(
    role: &'static str,
    parent_side: P,
    worker: F,
) -> Result<(Pid, P), TransportError>
where
    F: FnOnce() -> Result<(), TransportError>,
{
    // SAFETY: the child only touches state it owns (the handles moved into
    // `worker`) and leaves through `exit` without returning to the caller.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            drop(worker);
            tracing::debug!(role, pid = child.as_raw(), "Worker forked");
            Ok((child, parent_side))
        }
        Ok(ForkResult::Child) => {
            drop(parent_side);
            die_with_parent();

            let code = match panic::catch_unwind(AssertUnwindSafe(worker)) {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    tracing::error!(role, error = %e, "Worker terminated on fatal error");
                    WORKER_FAILURE_EXIT
                }
                Err(_) => WORKER_PANIC_EXIT,
            };
            std::process::exit(code)
        }
        Err(errno) => Err(TransportError::acquire(
            format!("{role} worker process"),
            errno.into(),
        )),
    }
}

/// Block until the worker exits and check its status
///
/// # Errors
///
/// Returns `TransportError::WorkerFailed` if the worker exited non-zero or
/// was killed by a signal. The worker is reaped either way.
pub fn reap_worker(role: &'static str, pid: Pid) -> Result<(), TransportError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, 0)) => {
                tracing::debug!(role, pid = pid.as_raw(), "Worker reaped");
                return Ok(());
            }
            Ok(WaitStatus::Exited(_, code)) => {
                return Err(TransportError::WorkerFailed(format!(
                    "{role} worker {pid} exited with status {code}"
                )));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Err(TransportError::WorkerFailed(format!(
                    "{role} worker {pid} killed by {signal}"
                )));
            }
            // Stopped / continued: still our child, keep waiting
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => {
                tracing::warn!(role, pid = pid.as_raw(), "Worker already reaped");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Whether `pid` is still a waitable child of this process
///
/// Returns `false` once the worker has been reaped.
#[must_use]
pub fn is_child_alive(pid: Pid) -> bool {
    !matches!(
        waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG)),
        Err(Errno::ECHILD)
    )
}

/// Ask the kernel to SIGKILL this process when the forking thread exits
#[cfg(target_os = "linux")]
fn die_with_parent() {
    // SAFETY: prctl(PR_SET_PDEATHSIG) only sets a flag on the calling process.
    let result = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) };
    if result != 0 {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            "prctl(PR_SET_PDEATHSIG) failed"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_and_reap_success() {
        let (pid, ()) = fork_worker("test", (), || Ok(())).unwrap();
        reap_worker("test", pid).unwrap();
        assert!(!is_child_alive(pid));
    }

    #[test]
    fn test_worker_error_becomes_nonzero_exit() {
        let (pid, ()) = fork_worker("test", (), || {
            Err(TransportError::Protocol("boom".into()))
        })
        .unwrap();

        let result = reap_worker("test", pid);
        match result {
            Err(TransportError::WorkerFailed(msg)) => {
                assert!(msg.contains(&WORKER_FAILURE_EXIT.to_string()));
            }
            other => panic!("Expected WorkerFailed, got: {other:?}"),
        }
    }

    #[test]
    fn test_worker_panic_does_not_escape() {
        let (pid, ()) = fork_worker("test", (), || panic!("worker panicked")).unwrap();
        assert!(matches!(
            reap_worker("test", pid),
            Err(TransportError::WorkerFailed(_))
        ));
    }
}
