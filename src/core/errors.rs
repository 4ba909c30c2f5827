/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{InstanceId, InstanceKey, Pid};
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Supervisor operation result
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Failures surfaced by instance and registry operations
#[derive(Error, Debug, Clone, Serialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SupervisorError {
    #[error("Failed to launch instance \"{name}\": {reason}")]
    #[diagnostic(
        code(supervisor::launch_failed),
        help("Check that the executable exists, is executable and that system resources are available.")
    )]
    Launch { name: String, reason: String },

    #[error("Failed to deliver {signal} to pid {pid}: {reason}")]
    #[diagnostic(
        code(supervisor::signal_delivery_failed),
        help("The process may have exited in the meantime or belongs to another user.")
    )]
    SignalDelivery {
        pid: Pid,
        signal: String,
        reason: String,
    },

    #[error("Process {pid} did not terminate within {timeout_ms}ms")]
    #[diagnostic(
        code(supervisor::termination_timeout),
        help("The process is still running. Retry or stop it with force enabled.")
    )]
    TerminationTimeout { pid: Pid, timeout_ms: u64 },

    #[error("Unknown instance with {0}")]
    #[diagnostic(
        code(supervisor::unknown_instance),
        help("The instance may have been stopped already or never existed.")
    )]
    UnknownInstance(InstanceKey),

    #[error("Instance {id} is alive (pid {pid})")]
    #[diagnostic(
        code(supervisor::already_alive),
        help("A restart was requested for a running process. This indicates inconsistent state.")
    )]
    AlreadyAlive { id: InstanceId, pid: Pid },

    #[error("Instance {0} is not restartable")]
    #[diagnostic(
        code(supervisor::not_restartable),
        help("The instance was started with restartable=false or has been stopped explicitly.")
    )]
    NotRestartable(InstanceId),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(supervisor::invalid_argument))]
    InvalidArgument(String),
}

impl SupervisorError {
    /// Stable machine-readable code for the command layer
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Launch { .. } => "launch_failed",
            SupervisorError::SignalDelivery { .. } => "signal_delivery_failed",
            SupervisorError::TerminationTimeout { .. } => "termination_timeout",
            SupervisorError::UnknownInstance(_) => "unknown_instance",
            SupervisorError::AlreadyAlive { .. } => "already_alive",
            SupervisorError::NotRestartable(_) => "not_restartable",
            SupervisorError::InvalidArgument(_) => "invalid_argument",
        }
    }
}
