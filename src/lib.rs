/*!
 * Process Supervisor Library
 * Launches, restarts and terminates named executables on behalf of callers
 */

pub mod api;
pub mod core;
pub mod monitoring;
pub mod process;
pub mod supervisor;

// Re-exports
pub use crate::core::{
    Config, ConfigError, ConfigResult, Environment, InstanceId, InstanceKey, Pid,
    SupervisorError, SupervisorResult,
};
pub use monitoring::init_tracing;
pub use process::{ExitOutcome, InstanceState, InstanceStatus, ProcessInstance};
pub use supervisor::{
    CoordinatorHandle, InstanceRegistry, TerminationCoordinator, DEFAULT_SWEEP_INTERVAL,
};
