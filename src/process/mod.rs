/*!
 * Process Module
 * OS process boundary and per-instance lifecycle
 */

pub mod executor;
pub mod instance;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use executor::{reap_one, ReapOutcome, UnixProcess};
pub use instance::ProcessInstance;
pub use traits::ProcessHandle;
pub use types::{ExitOutcome, InstanceState, InstanceStatus, SignalFailure, StopSignal};
