/*!
 * Process Instance
 * One supervised OS process with its termination state machine
 */

use super::executor::UnixProcess;
use super::traits::ProcessHandle;
use super::types::{ExitOutcome, InstanceState, InstanceStatus, SignalFailure, StopSignal};
use crate::core::errors::{SupervisorError, SupervisorResult};
use crate::core::types::{Environment, InstanceId, InstanceKey, Pid};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Background wait for process exit, started at most once per process
type ExitWait = Shared<BoxFuture<'static, ExitOutcome>>;

/// A supervised process and its supervision metadata.
///
/// Stop and restart are serialized by `lifecycle`; the handle itself sits
/// behind a short read/write lock so status probes never wait on a stop.
pub struct ProcessInstance {
    name: String,
    path: PathBuf,
    env: Environment,
    restartable: AtomicBool,
    process: RwLock<Arc<dyn ProcessHandle>>,
    lifecycle: Mutex<Option<ExitWait>>,
}

impl ProcessInstance {
    /// Launch `path` and wrap it as an instance
    pub fn start(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        env: Environment,
        restartable: bool,
    ) -> SupervisorResult<Self> {
        let name = name.into();
        let path = path.into();
        let process = launch(&name, &path, &env)?;

        Ok(Self {
            name,
            path,
            env,
            restartable: AtomicBool::new(restartable),
            process: RwLock::new(process),
            lifecycle: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    pub fn pid(&self) -> Pid {
        self.process.read().pid()
    }

    pub fn is_restartable(&self) -> bool {
        self.restartable.load(Ordering::SeqCst)
    }

    /// Liveness is always probed, never cached
    pub fn is_alive(&self) -> bool {
        self.process.read().is_alive()
    }

    fn handle(&self) -> Arc<dyn ProcessHandle> {
        Arc::clone(&*self.process.read())
    }

    /// Terminate the process: SIGINT, then wait up to `timeout`.
    ///
    /// On timeout the process is left running unless `force` is set, in which
    /// case it is killed and the existing exit-wait is awaited so the child is
    /// always reaped. The instance stops being restartable before anything
    /// else happens.
    pub async fn stop(&self, timeout: Duration, force: bool) -> SupervisorResult<ExitOutcome> {
        let mut exit_wait = self.lifecycle.lock().await;

        self.restartable.store(false, Ordering::SeqCst);

        let process = self.handle();
        let pid = process.pid();
        if !process.is_alive() {
            debug!(name = %self.name, pid, "Instance already terminated");
            return Ok(ExitOutcome::NotRunning);
        }

        let wait = exit_wait
            .get_or_insert_with(|| spawn_exit_wait(Arc::clone(&process)))
            .clone();

        process
            .signal(StopSignal::Interrupt)
            .map_err(|e| signal_error(pid, StopSignal::Interrupt, e))?;

        match tokio::time::timeout(timeout, wait.clone()).await {
            Ok(outcome) => {
                info!(name = %self.name, pid, %outcome, "Instance stopped");
                Ok(outcome)
            }
            Err(_) if !force => Err(SupervisorError::TerminationTimeout {
                pid,
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(_) => {
                warn!(name = %self.name, pid, "Graceful stop timed out, sending SIGKILL");
                match process.signal(StopSignal::Kill) {
                    // Exited between the timeout and the kill; the wait still resolves
                    Ok(()) | Err(SignalFailure::Gone) => {}
                    Err(e) => return Err(signal_error(pid, StopSignal::Kill, e)),
                }
                let outcome = wait.await;
                info!(name = %self.name, pid, %outcome, "Instance killed");
                Ok(outcome)
            }
        }
    }

    /// Replace the process with a fresh launch of the same executable and
    /// environment
    pub async fn restart(&self) -> SupervisorResult<Pid> {
        let mut exit_wait = self.lifecycle.lock().await;
        self.relaunch(&mut exit_wait)
    }

    /// Relaunch after `reaped_pid` died, provided the instance still owns
    /// that PID and has not been stopped in the meantime
    pub(crate) async fn restart_reaped(
        &self,
        id: InstanceId,
        reaped_pid: Pid,
    ) -> SupervisorResult<Pid> {
        let mut exit_wait = self.lifecycle.lock().await;

        if self.pid() != reaped_pid {
            return Err(SupervisorError::UnknownInstance(InstanceKey::Pid(reaped_pid)));
        }
        if !self.is_restartable() {
            return Err(SupervisorError::NotRestartable(id));
        }

        self.relaunch(&mut exit_wait)
    }

    fn relaunch(&self, exit_wait: &mut Option<ExitWait>) -> SupervisorResult<Pid> {
        let process = launch(&self.name, &self.path, &self.env)?;
        let pid = process.pid();

        *self.process.write() = process;
        *exit_wait = None;

        Ok(pid)
    }

    /// Snapshot for reporting; takes no instance lock
    pub fn status(&self) -> InstanceStatus {
        let process = self.handle();
        let state = if process.is_alive() {
            InstanceState::Running
        } else {
            InstanceState::Terminated
        };

        InstanceStatus {
            name: self.name.clone(),
            state,
            pid: process.pid(),
            restartable: self.is_restartable(),
            env: self.env.clone(),
        }
    }
}

impl std::fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("pid", &self.pid())
            .field("restartable", &self.is_restartable())
            .finish()
    }
}

fn launch(name: &str, path: &Path, env: &[String]) -> SupervisorResult<Arc<dyn ProcessHandle>> {
    UnixProcess::spawn(path, env)
        .map(|process| Arc::new(process) as Arc<dyn ProcessHandle>)
        .map_err(|e| SupervisorError::Launch {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn spawn_exit_wait(process: Arc<dyn ProcessHandle>) -> ExitWait {
    let pid = process.pid();
    tokio::task::spawn_blocking(move || process.wait())
        .map(move |joined| {
            joined.unwrap_or_else(|e| {
                warn!(pid, error = %e, "Exit-wait task failed");
                ExitOutcome::ReapedElsewhere
            })
        })
        .boxed()
        .shared()
}

fn signal_error(pid: Pid, signal: StopSignal, failure: SignalFailure) -> SupervisorError {
    SupervisorError::SignalDelivery {
        pid,
        signal: signal.to_string(),
        reason: failure.to_string(),
    }
}
