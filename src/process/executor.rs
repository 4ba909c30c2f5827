/*!
 * Process Executor
 * Handles OS-level process spawning, signalling and reaping
 */

use super::traits::ProcessHandle;
use super::types::{ExitOutcome, SignalFailure, StopSignal};
use crate::core::types::{split_env_entry, Pid};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// A child process launched by the supervisor.
///
/// Only the PID is kept: waiting and signalling go through `nix` so that the
/// coordinator's `waitpid(-1)` and the exit-wait share one reaping model.
#[derive(Debug)]
pub struct UnixProcess {
    pid: unistd::Pid,
}

impl UnixProcess {
    /// Spawn `path` with `env` appended to the ambient environment
    pub fn spawn(path: &Path, env: &[String]) -> io::Result<Self> {
        let mut cmd = Command::new(path);

        for entry in env {
            match split_env_entry(entry) {
                Some((key, value)) => {
                    cmd.env(key, value);
                }
                None => warn!(entry = %entry, "Skipping malformed environment entry"),
            }
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Dropping the std handle neither waits nor kills
        let child = cmd.spawn()?;
        let pid = i32::try_from(child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pid out of range"))?;

        info!(path = %path.display(), pid, "Spawned OS process");

        Ok(Self {
            pid: unistd::Pid::from_raw(pid),
        })
    }
}

impl ProcessHandle for UnixProcess {
    fn pid(&self) -> Pid {
        self.pid.as_raw()
    }

    fn is_alive(&self) -> bool {
        kill(self.pid, None).is_ok()
    }

    fn signal(&self, signal: StopSignal) -> Result<(), SignalFailure> {
        match kill(self.pid, signal.as_nix()) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(SignalFailure::Gone),
            Err(e) => Err(SignalFailure::Os(e.desc().to_string())),
        }
    }

    fn wait(&self) -> ExitOutcome {
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return ExitOutcome::Exited(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => return ExitOutcome::Signaled(sig as i32),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return ExitOutcome::ReapedElsewhere,
                Err(e) => {
                    warn!(pid = self.pid.as_raw(), error = %e, "waitpid failed");
                    return ExitOutcome::ReapedElsewhere;
                }
            }
        }
    }
}

/// Result of one non-blocking reap attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// A child exited and its status was collected
    Reaped { pid: Pid, outcome: ExitOutcome },
    /// Children exist but none has exited
    NothingToReap,
    /// The supervisor has no children at all
    NoChildren,
    /// `waitpid` failed for another reason
    Failed(String),
}

/// Collect at most one exited child without blocking
pub fn reap_one() -> ReapOutcome {
    match waitpid(unistd::Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => ReapOutcome::NothingToReap,
        Ok(WaitStatus::Exited(pid, code)) => ReapOutcome::Reaped {
            pid: pid.as_raw(),
            outcome: ExitOutcome::Exited(code),
        },
        Ok(WaitStatus::Signaled(pid, sig, _)) => ReapOutcome::Reaped {
            pid: pid.as_raw(),
            outcome: ExitOutcome::Signaled(sig as i32),
        },
        Ok(other) => {
            debug!(status = ?other, "Ignoring non-exit wait status");
            ReapOutcome::NothingToReap
        }
        Err(Errno::ECHILD) => ReapOutcome::NoChildren,
        Err(e) => ReapOutcome::Failed(e.desc().to_string()),
    }
}
