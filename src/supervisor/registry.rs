/*!
 * Instance Registry
 * Owns every supervised instance and the global termination barrier
 *
 * Lock order: `termination_barrier` before `members`. The membership lock is
 * never held across an await, and in particular is released before any
 * per-instance stop begins, because a completed stop removes its entry
 * through the same lock.
 */

use crate::core::config::Config;
use crate::core::errors::{SupervisorError, SupervisorResult};
use crate::core::types::{split_env_entry, Environment, InstanceId, InstanceKey, Pid};
use crate::process::{ExitOutcome, InstanceStatus, ProcessInstance};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// File extension of instance executables under the instances directory
const INSTANCE_EXTENSION: &str = "lua";

/// Instance map plus the id counter it is allocated under
#[derive(Default)]
struct Members {
    instances: HashMap<InstanceId, Arc<ProcessInstance>>,
    last_id: InstanceId,
}

/// The supervisor's registry of instances
pub struct InstanceRegistry {
    /// Read by instance-level mutations, written only by `stop_all_instances`
    termination_barrier: tokio::sync::RwLock<()>,
    members: RwLock<Members>,
    config: Arc<Config>,
}

impl InstanceRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        info!(
            instances_dir = %config.instances_dir.display(),
            termination_timeout_ms = config.termination_timeout.as_millis() as u64,
            "Instance registry initialized"
        );
        Self {
            termination_barrier: tokio::sync::RwLock::new(()),
            members: RwLock::new(Members::default()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn add_instance(&self, instance: Arc<ProcessInstance>) -> InstanceId {
        let mut members = self.members.write();
        members.last_id += 1;
        let id = members.last_id;
        members.instances.insert(id, instance);
        id
    }

    fn delete_instance(&self, id: InstanceId) {
        self.members.write().instances.remove(&id);
    }

    fn get_instance(&self, id: InstanceId) -> Option<Arc<ProcessInstance>> {
        self.members.read().instances.get(&id).cloned()
    }

    /// Linear scan; deaths are rare compared to other traffic
    fn get_instance_by_pid(&self, pid: Pid) -> Option<(InstanceId, Arc<ProcessInstance>)> {
        self.members
            .read()
            .instances
            .iter()
            .find(|(_, inst)| inst.pid() == pid)
            .map(|(id, inst)| (*id, Arc::clone(inst)))
    }

    /// Resolve `<instances_dir>/<name>.lua` and check it can be executed
    fn resolve_executable(&self, name: &str) -> SupervisorResult<PathBuf> {
        let path = self
            .config
            .instances_dir
            .join(format!("{}.{}", name, INSTANCE_EXTENSION));

        let executable = std::fs::metadata(&path)
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
        if !executable {
            return Err(SupervisorError::UnknownInstance(InstanceKey::Name(
                name.to_string(),
            )));
        }
        Ok(path)
    }

    /// Launch a new instance and return its identifier
    pub async fn start_instance(
        &self,
        name: &str,
        env: Environment,
        restartable: bool,
    ) -> SupervisorResult<InstanceId> {
        let _barrier = self.termination_barrier.read().await;

        if name.is_empty() {
            return Err(SupervisorError::InvalidArgument(
                "The instance name is empty".into(),
            ));
        }
        if name.contains('/') {
            return Err(SupervisorError::InvalidArgument(format!(
                "The instance name \"{}\" contains a path separator",
                name
            )));
        }
        if let Some(bad) = env.iter().find(|entry| split_env_entry(entry).is_none()) {
            return Err(SupervisorError::InvalidArgument(format!(
                "Environment entry \"{}\" is not KEY=VALUE",
                bad
            )));
        }

        let path = self.resolve_executable(name)?;
        let instance = ProcessInstance::start(name, path, env, restartable).map_err(|e| {
            error!(name, error = %e, "Failed to start instance");
            e
        })?;
        let pid = instance.pid();
        let id = self.add_instance(Arc::new(instance));

        info!(id, name, pid, restartable, "Instance started");
        Ok(id)
    }

    /// Stop an instance; it leaves the registry only if the stop succeeds
    pub async fn stop_instance(&self, id: InstanceId, force: bool) -> SupervisorResult<ExitOutcome> {
        let _barrier = self.termination_barrier.read().await;

        let instance = self
            .get_instance(id)
            .ok_or(SupervisorError::UnknownInstance(InstanceKey::Id(id)))?;

        let outcome = instance
            .stop(self.config.termination_timeout, force)
            .await
            .map_err(|e| {
                warn!(id, pid = instance.pid(), error = %e, "Failed to stop instance");
                e
            })?;

        self.delete_instance(id);
        info!(id, %outcome, "Instance removed");
        Ok(outcome)
    }

    /// Relaunch the instance whose process `pid` has died.
    ///
    /// Returns the identifier, which is preserved across the restart.
    pub async fn restart_after_termination(&self, pid: Pid) -> SupervisorResult<InstanceId> {
        let _barrier = self.termination_barrier.read().await;

        let (id, instance) = self
            .get_instance_by_pid(pid)
            .ok_or(SupervisorError::UnknownInstance(InstanceKey::Pid(pid)))?;

        if instance.is_alive() {
            return Err(SupervisorError::AlreadyAlive { id, pid });
        }
        if !instance.is_restartable() {
            return Err(SupervisorError::NotRestartable(id));
        }

        let new_pid = instance.restart_reaped(id, pid).await.map_err(|e| {
            error!(id, old_pid = pid, error = %e, "Failed to restart instance");
            e
        })?;

        info!(id, old_pid = pid, pid = new_pid, "Instance restarted");
        Ok(id)
    }

    /// Force-stop every instance and wait for all of them.
    ///
    /// Holds the barrier for writing throughout, so no start, stop or restart
    /// can begin until this returns. Individual failures are logged only.
    pub async fn stop_all_instances(&self) {
        let _barrier = self.termination_barrier.write().await;

        let snapshot: Vec<(InstanceId, Arc<ProcessInstance>)> = {
            let members = self.members.read();
            members
                .instances
                .iter()
                .map(|(id, inst)| (*id, Arc::clone(inst)))
                .collect()
        };

        info!(count = snapshot.len(), "Stopping all instances");

        let timeout = self.config.termination_timeout;
        join_all(snapshot.into_iter().map(|(id, instance)| async move {
            if let Err(e) = instance.stop(timeout, true).await {
                error!(id, pid = instance.pid(), error = %e, "Failed to stop instance");
            }
            self.delete_instance(id);
        }))
        .await;

        info!("All instances stopped");
    }

    pub fn get_instance_status(&self, id: InstanceId) -> SupervisorResult<InstanceStatus> {
        self.get_instance(id)
            .map(|inst| inst.status())
            .ok_or(SupervisorError::UnknownInstance(InstanceKey::Id(id)))
    }

    /// Status of every registered instance, keyed by the decimal identifier
    pub fn list_instances(&self) -> HashMap<String, InstanceStatus> {
        let snapshot: Vec<(InstanceId, Arc<ProcessInstance>)> = {
            let members = self.members.read();
            members
                .instances
                .iter()
                .map(|(id, inst)| (*id, Arc::clone(inst)))
                .collect()
        };

        snapshot
            .into_iter()
            .map(|(id, inst)| (id.to_string(), inst.status()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
