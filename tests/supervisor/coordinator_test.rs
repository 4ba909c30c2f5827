/*!
 * Termination coordinator tests
 *
 * These reap with waitpid(-1), so they run in their own test binary and
 * one at a time.
 */

use crate::common::*;
use pretty_assertions::assert_eq;
use proc_supervisor::{InstanceRegistry, InstanceState, Pid, TerminationCoordinator};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Poll until instance `id` runs under a PID other than `old_pid`
async fn wait_for_restart(
    registry: &Arc<InstanceRegistry>,
    id: u64,
    old_pid: Pid,
    mut nudge: impl FnMut(),
) -> Pid {
    for _ in 0..100 {
        nudge();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = registry.get_instance_status(id).unwrap();
        if status.pid != old_pid && status.state == InstanceState::Running {
            return status.pid;
        }
    }
    panic!("instance {} was not restarted", id);
}

#[tokio::test]
#[serial]
async fn test_reap_trigger_restarts_killed_instance() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx
        .registry
        .start_instance("svc", vec!["X=1".into()], true)
        .await
        .unwrap();
    let old_pid = fx.registry.get_instance_status(id).unwrap().pid;

    let mut coordinator = TerminationCoordinator::builder(fx.registry.clone())
        .spawn()
        .unwrap();

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(old_pid),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();

    let new_pid = wait_for_restart(&fx.registry, id, old_pid, || coordinator.trigger_reap()).await;
    assert!(pid_alive(new_pid));
    assert_eq!(
        fx.registry.get_instance_status(id).unwrap().env,
        vec!["X=1".to_string()]
    );

    coordinator.request_shutdown();
    coordinator.completed().await;
    assert!(fx.registry.is_empty());
    assert!(!pid_alive(new_pid));
}

#[tokio::test]
#[serial]
async fn test_periodic_sweep_restarts_without_trigger() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    let old_pid = fx.registry.get_instance_status(id).unwrap().pid;

    let mut coordinator = TerminationCoordinator::builder(fx.registry.clone())
        .with_sweep_interval(Duration::from_millis(50))
        .spawn()
        .unwrap();

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(old_pid),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();

    wait_for_restart(&fx.registry, id, old_pid, || {}).await;

    coordinator.request_shutdown();
    coordinator.completed().await;
    assert!(fx.registry.is_empty());
}

#[tokio::test]
#[serial]
async fn test_shutdown_stops_intake_then_every_instance() {
    let fx = fixture(&["svc", "stubborn"], Duration::from_millis(200));
    fx.registry.start_instance("svc", vec![], true).await.unwrap();
    fx.registry
        .start_instance("stubborn", vec![IGNORE_SIGINT.into()], true)
        .await
        .unwrap();
    let pids: Vec<Pid> = fx
        .registry
        .list_instances()
        .values()
        .map(|status| status.pid)
        .collect();
    settle().await;

    let registry = fx.registry.clone();
    let (intake_tx, intake_rx) = oneshot::channel();
    let mut coordinator = TerminationCoordinator::builder(fx.registry.clone())
        .with_intake_shutdown(async move {
            // Instances are still registered while the intake drains
            let _ = intake_tx.send(registry.len());
        })
        .spawn()
        .unwrap();

    coordinator.request_shutdown();
    coordinator.completed().await;

    assert_eq!(intake_rx.await.unwrap(), 2);
    assert!(fx.registry.is_empty());
    for pid in pids {
        assert!(!pid_alive(pid));
    }
}

#[tokio::test]
#[serial]
async fn test_stopped_instance_is_not_restarted() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let keep = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    let doomed = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    settle().await;

    let mut coordinator = TerminationCoordinator::builder(fx.registry.clone())
        .spawn()
        .unwrap();

    fx.registry.stop_instance(doomed, true).await.unwrap();
    coordinator.trigger_reap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let listed = fx.registry.list_instances();
    assert_eq!(listed.len(), 1);
    assert!(listed.contains_key(&keep.to_string()));

    coordinator.request_shutdown();
    coordinator.completed().await;
}
