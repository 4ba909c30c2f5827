/*!
 * Process Traits
 * OS process handle abstraction
 */

use super::types::{ExitOutcome, SignalFailure, StopSignal};
use crate::core::types::Pid;

/// Capability over one launched OS process.
///
/// Implementations must keep `is_alive` non-blocking, let `wait` block until
/// the process has exited, and tolerate `signal(StopSignal::Kill)` on a
/// process that is already on its way out.
pub trait ProcessHandle: Send + Sync {
    /// OS-level process ID
    fn pid(&self) -> Pid;

    /// Probe liveness without blocking (null signal)
    fn is_alive(&self) -> bool;

    /// Deliver a termination signal
    fn signal(&self, signal: StopSignal) -> Result<(), SignalFailure>;

    /// Block until the process exits and report how it went
    fn wait(&self) -> ExitOutcome;
}
