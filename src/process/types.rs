/*!
 * Process Types
 * Common types for instance supervision
 */

use crate::core::types::{Environment, Pid};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Instance state, probed from the OS on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Process answers the null signal
    Running,
    /// Process is gone
    Terminated,
}

/// Point-in-time snapshot of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub name: String,
    pub state: InstanceState,
    pub pid: Pid,
    pub restartable: bool,
    pub env: Environment,
}

/// Signals used by the termination protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful request (SIGINT)
    Interrupt,
    /// Forceful termination (SIGKILL)
    Kill,
}

impl StopSignal {
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            StopSignal::Interrupt => nix::sys::signal::Signal::SIGINT,
            StopSignal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_nix().as_str())
    }
}

/// Signal delivery failure at the OS boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalFailure {
    #[error("no such process")]
    Gone,

    #[error("{0}")]
    Os(String),
}

/// How a process left, as observed by the exit-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Nothing to stop: the process was already gone
    NotRunning,
    /// Normal exit with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled(i32),
    /// Exited, but its status was consumed by another reaper
    ReapedElsewhere,
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::NotRunning => write!(f, "not running"),
            ExitOutcome::Exited(code) => write!(f, "exited with code {}", code),
            ExitOutcome::Signaled(sig) => write!(f, "killed by signal {}", sig),
            ExitOutcome::ReapedElsewhere => write!(f, "exited (reaped elsewhere)"),
        }
    }
}
