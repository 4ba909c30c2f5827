/*!
 * Supervisor Module
 * Instance registry and the termination coordinator
 */

pub mod coordinator;
pub mod registry;

pub use coordinator::{
    reap_and_restart, CoordinatorBuilder, CoordinatorCommand, CoordinatorHandle,
    TerminationCoordinator, DEFAULT_SWEEP_INTERVAL,
};
pub use registry::InstanceRegistry;
