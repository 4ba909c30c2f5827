/*!
 * Termination Coordinator
 *
 * Single background loop that multiplexes three event sources:
 * - termination requests (explicit, or SIGINT/SIGTERM)
 * - child-death notifications (SIGCHLD, or an explicit trigger)
 * - a periodic sweep, because the kernel merges SIGCHLD deliveries
 *
 * Handlers never run concurrently with each other. Child deaths are reaped
 * one per event and handed to the registry for restart; shutdown stops the
 * command intake, force-stops every instance and acknowledges completion
 * exactly once.
 */

use super::registry::InstanceRegistry;
use crate::process::{reap_one, ReapOutcome};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Fallback sweep period for merged SIGCHLD notifications
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(20);

/// Control messages for the coordinator task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorCommand {
    /// Begin the service shutdown sequence
    Shutdown,
    /// Reap one exited child now, as if SIGCHLD had arrived
    Reap,
}

/// Builder for the coordinator task
pub struct CoordinatorBuilder {
    registry: Arc<InstanceRegistry>,
    sweep_interval: Duration,
    os_signals: bool,
    intake_shutdown: Option<BoxFuture<'static, ()>>,
    intake_exit: Option<BoxFuture<'static, ()>>,
    drain_timeout: Duration,
}

impl CoordinatorBuilder {
    fn new(registry: Arc<InstanceRegistry>) -> Self {
        let drain_timeout = registry.config().service_termination_timeout();
        Self {
            registry,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            os_signals: false,
            intake_shutdown: None,
            intake_exit: None,
            drain_timeout,
        }
    }

    /// Period of the fallback reap sweep
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Listen for SIGINT/SIGTERM (shutdown) and SIGCHLD (reap)
    pub fn with_os_signals(mut self) -> Self {
        self.os_signals = true;
        self
    }

    /// Future that stops the command layer and resolves once it has drained
    pub fn with_intake_shutdown<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.intake_shutdown = Some(Box::pin(shutdown));
        self
    }

    /// Future that resolves if the command layer stops on its own; the
    /// service then shuts down as if termination had been requested
    pub fn with_intake_exit<F>(mut self, exited: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.intake_exit = Some(Box::pin(exited));
        self
    }

    /// Upper bound for the intake shutdown future
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Spawn the coordinator loop on the current runtime
    pub fn spawn(self) -> std::io::Result<CoordinatorHandle> {
        let signals = if self.os_signals {
            OsSignals::install()?
        } else {
            OsSignals::default()
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        let coordinator = TerminationCoordinator {
            registry: self.registry,
            sweep_interval: self.sweep_interval,
            intake_shutdown: self.intake_shutdown,
            drain_timeout: self.drain_timeout,
        };

        let handle = tokio::spawn(coordinator.run(
            command_rx,
            signals,
            self.intake_exit,
            done_tx,
        ));

        info!(
            sweep_interval_secs = self.sweep_interval.as_secs_f64(),
            os_signals = self.os_signals,
            "Termination coordinator spawned"
        );

        Ok(CoordinatorHandle {
            command_tx,
            done_rx: Some(done_rx),
            handle: Some(handle),
        })
    }
}

/// OS signal streams feeding the loop
#[derive(Default)]
struct OsSignals {
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
    child: Option<Signal>,
}

impl OsSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: Some(signal(SignalKind::interrupt())?),
            terminate: Some(signal(SignalKind::terminate())?),
            child: Some(signal(SignalKind::child())?),
        })
    }
}

/// Pending forever when the stream is not installed
async fn recv_signal(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending().await,
    }
}

async fn intake_exited(exit: &mut Option<BoxFuture<'static, ()>>) {
    match exit {
        Some(exit) => exit.await,
        None => std::future::pending().await,
    }
}

/// The coordinator loop state
pub struct TerminationCoordinator {
    registry: Arc<InstanceRegistry>,
    sweep_interval: Duration,
    intake_shutdown: Option<BoxFuture<'static, ()>>,
    drain_timeout: Duration,
}

impl TerminationCoordinator {
    pub fn builder(registry: Arc<InstanceRegistry>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(registry)
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
        signals: OsSignals,
        mut intake_exit: Option<BoxFuture<'static, ()>>,
        done_tx: oneshot::Sender<()>,
    ) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        sweep.tick().await;

        let OsSignals {
            mut interrupt,
            mut terminate,
            mut child,
        } = signals;

        loop {
            tokio::select! {
                _ = recv_signal(&mut interrupt) => {
                    info!("SIGINT received");
                    break;
                }

                _ = recv_signal(&mut terminate) => {
                    info!("SIGTERM received");
                    break;
                }

                _ = recv_signal(&mut child) => {
                    reap_and_restart(&self.registry).await;
                }

                _ = intake_exited(&mut intake_exit) => {
                    error!("Command layer stopped unexpectedly, shutting down");
                    break;
                }

                _ = sweep.tick() => {
                    debug!("Periodic reap sweep");
                    reap_and_restart(&self.registry).await;
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(CoordinatorCommand::Reap) => reap_and_restart(&self.registry).await,
                        Some(CoordinatorCommand::Shutdown) => {
                            info!("Shutdown requested");
                            break;
                        }
                        // Every handle is gone; nobody can ask for shutdown any more
                        None => {
                            warn!("Coordinator command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.terminate_gracefully().await;

        if done_tx.send(()).is_err() {
            debug!("Nobody is waiting for the termination acknowledgment");
        }
    }

    /// Stop intake, stop every instance, then return
    async fn terminate_gracefully(&mut self) {
        if let Some(intake) = self.intake_shutdown.take() {
            if tokio::time::timeout(self.drain_timeout, intake).await.is_err() {
                error!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "Command layer did not drain in time"
                );
            }
        }

        self.registry.stop_all_instances().await;
        info!("Service termination complete");
    }
}

/// Reap at most one exited child and try to restart its instance.
///
/// Missing children and restart failures are logged; they never stop the loop.
pub async fn reap_and_restart(registry: &InstanceRegistry) {
    match reap_one() {
        ReapOutcome::Reaped { pid, outcome } => {
            info!(pid, %outcome, "Reaped terminated child");
            match registry.restart_after_termination(pid).await {
                Ok(id) => info!(id, old_pid = pid, "The instance has been restarted"),
                Err(e) => warn!(old_pid = pid, error = %e, "Can't restart the instance"),
            }
        }
        ReapOutcome::NothingToReap => debug!("No exited child to reap"),
        ReapOutcome::NoChildren => debug!("No child processes"),
        ReapOutcome::Failed(reason) => error!(error = %reason, "waitpid failed"),
    }
}

/// Handle to the coordinator background task
pub struct CoordinatorHandle {
    command_tx: mpsc::UnboundedSender<CoordinatorCommand>,
    done_rx: Option<oneshot::Receiver<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Ask the coordinator to run the shutdown sequence
    pub fn request_shutdown(&self) {
        let _ = self.command_tx.send(CoordinatorCommand::Shutdown);
    }

    /// Reap one child now
    pub fn trigger_reap(&self) {
        let _ = self.command_tx.send(CoordinatorCommand::Reap);
    }

    /// Wait for the termination acknowledgment; resolves once
    pub async fn completed(&mut self) {
        if let Some(done_rx) = self.done_rx.take() {
            if done_rx.await.is_err() {
                warn!("Coordinator exited without acknowledging termination");
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Coordinator task failed");
            }
        }
    }
}
