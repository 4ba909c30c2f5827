/*!
 * Instance registry tests
 */

use crate::common::*;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use proc_supervisor::{InstanceKey, InstanceState, SupervisorError};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
#[serial]
async fn test_start_reports_running_status() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx
        .registry
        .start_instance("svc", vec!["X=1".into(), "Y=two".into()], true)
        .await
        .unwrap();
    assert_eq!(id, 1);

    let status = fx.registry.get_instance_status(id).unwrap();
    assert_eq!(status.name, "svc");
    assert_eq!(status.state, InstanceState::Running);
    assert!(status.pid > 0);
    assert!(status.restartable);
    assert_eq!(status.env, vec!["X=1".to_string(), "Y=two".to_string()]);

    let listed = fx.registry.list_instances();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed["1"], status);

    fx.registry.stop_all_instances().await;
}

#[tokio::test]
#[serial]
async fn test_unknown_executable_is_rejected() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    assert_eq!(
        fx.registry.start_instance("other", vec![], true).await,
        Err(SupervisorError::UnknownInstance(InstanceKey::Name(
            "other".into()
        )))
    );
    assert!(fx.registry.is_empty());
}

#[tokio::test]
#[serial]
async fn test_concurrent_starts_get_distinct_ids() {
    let fx = fixture(&["svc"], Duration::from_secs(2));

    let results = join_all((0..4).map(|_| fx.registry.start_instance("svc", vec![], true))).await;
    let mut ids: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    fx.registry.stop_all_instances().await;

    // Identifiers are never reused
    let next = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    assert_eq!(next, 5);
    fx.registry.stop_all_instances().await;
}

#[tokio::test]
#[serial]
async fn test_stop_removes_instance() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    let pid = fx.registry.get_instance_status(id).unwrap().pid;
    settle().await;

    fx.registry.stop_instance(id, false).await.unwrap();
    assert!(!pid_alive(pid));
    assert_eq!(
        fx.registry.get_instance_status(id),
        Err(SupervisorError::UnknownInstance(InstanceKey::Id(id)))
    );
    assert_eq!(
        fx.registry.stop_instance(id, true).await,
        Err(SupervisorError::UnknownInstance(InstanceKey::Id(id)))
    );
}

#[tokio::test]
#[serial]
async fn test_failed_stop_keeps_instance_registered() {
    let fx = fixture(&["stubborn"], Duration::from_millis(200));
    let id = fx
        .registry
        .start_instance("stubborn", vec![IGNORE_SIGINT.into()], true)
        .await
        .unwrap();
    settle().await;

    let result = fx.registry.stop_instance(id, false).await;
    assert!(matches!(
        result,
        Err(SupervisorError::TerminationTimeout { timeout_ms: 200, .. })
    ));

    let status = fx.registry.get_instance_status(id).unwrap();
    assert_eq!(status.state, InstanceState::Running);
    assert!(!status.restartable);

    fx.registry.stop_instance(id, true).await.unwrap();
    assert!(fx.registry.is_empty());
}

#[tokio::test]
#[serial]
async fn test_restart_after_out_of_band_kill() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx
        .registry
        .start_instance("svc", vec!["X=1".into()], true)
        .await
        .unwrap();
    let old_pid = fx.registry.get_instance_status(id).unwrap().pid;

    kill_and_reap(old_pid);

    assert_eq!(fx.registry.restart_after_termination(old_pid).await, Ok(id));

    let status = fx.registry.get_instance_status(id).unwrap();
    assert_ne!(status.pid, old_pid);
    assert_eq!(status.state, InstanceState::Running);
    assert_eq!(status.env, vec!["X=1".to_string()]);
    assert!(status.restartable);

    // The old PID no longer belongs to any instance
    assert_eq!(
        fx.registry.restart_after_termination(old_pid).await,
        Err(SupervisorError::UnknownInstance(InstanceKey::Pid(old_pid)))
    );

    fx.registry.stop_all_instances().await;
}

#[tokio::test]
#[serial]
async fn test_restart_refused_for_live_process() {
    let fx = fixture(&["svc"], Duration::from_secs(2));
    let id = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    let pid = fx.registry.get_instance_status(id).unwrap().pid;

    assert_eq!(
        fx.registry.restart_after_termination(pid).await,
        Err(SupervisorError::AlreadyAlive { id, pid })
    );

    fx.registry.stop_all_instances().await;
}

#[tokio::test]
#[serial]
async fn test_restart_refused_when_not_restartable() {
    let fx = fixture(&["once"], Duration::from_secs(2));
    let id = fx.registry.start_instance("once", vec![], false).await.unwrap();
    let pid = fx.registry.get_instance_status(id).unwrap().pid;

    kill_and_reap(pid);

    assert_eq!(
        fx.registry.restart_after_termination(pid).await,
        Err(SupervisorError::NotRestartable(id))
    );
    assert_eq!(
        fx.registry.get_instance_status(id).unwrap().state,
        InstanceState::Terminated
    );

    // Stopping a dead instance still succeeds and removes it
    fx.registry.stop_instance(id, false).await.unwrap();
    assert!(fx.registry.is_empty());
}

#[tokio::test]
#[serial]
async fn test_death_after_failed_stop_is_not_restarted() {
    let fx = fixture(&["stubborn"], Duration::from_millis(200));
    let id = fx
        .registry
        .start_instance("stubborn", vec![IGNORE_SIGINT.into()], true)
        .await
        .unwrap();
    let pid = fx.registry.get_instance_status(id).unwrap().pid;
    settle().await;

    assert!(matches!(
        fx.registry.stop_instance(id, false).await,
        Err(SupervisorError::TerminationTimeout { .. })
    ));

    // Still registered, then dies behind the supervisor's back
    kill_and_await_exit(pid).await;

    assert_eq!(
        fx.registry.restart_after_termination(pid).await,
        Err(SupervisorError::NotRestartable(id))
    );
    let status = fx.registry.get_instance_status(id).unwrap();
    assert_eq!(status.pid, pid);
    assert_eq!(status.state, InstanceState::Terminated);

    fx.registry.stop_instance(id, true).await.unwrap();
    assert!(fx.registry.is_empty());
}

#[tokio::test]
#[serial]
async fn test_stop_all_empties_registry() {
    let fx = fixture(&["svc", "stubborn"], Duration::from_millis(200));
    fx.registry.start_instance("svc", vec![], true).await.unwrap();
    fx.registry
        .start_instance("stubborn", vec![IGNORE_SIGINT.into()], true)
        .await
        .unwrap();
    let pids: Vec<i32> = fx
        .registry
        .list_instances()
        .values()
        .map(|status| status.pid)
        .collect();
    settle().await;

    fx.registry.stop_all_instances().await;

    assert!(fx.registry.is_empty());
    assert!(fx.registry.list_instances().is_empty());
    for pid in pids {
        assert!(!pid_alive(pid));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_start_waits_for_stop_all() {
    let fx = fixture(&["svc", "stubborn"], Duration::from_millis(300));
    fx.registry
        .start_instance("stubborn", vec![IGNORE_SIGINT.into()], true)
        .await
        .unwrap();
    settle().await;

    let began = Instant::now();
    let stopped = Arc::new(AtomicBool::new(false));
    let stop_all = {
        let registry = fx.registry.clone();
        let stopped = Arc::clone(&stopped);
        tokio::spawn(async move {
            registry.stop_all_instances().await;
            stopped.store(true, Ordering::SeqCst);
        })
    };

    // Let the shutdown take the barrier; the stubborn instance holds it
    // for the whole grace period
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopped.load(Ordering::SeqCst));

    let id = fx.registry.start_instance("svc", vec![], true).await.unwrap();
    assert!(began.elapsed() >= Duration::from_millis(300));
    assert_eq!(id, 2);

    // The stubborn instance was removed before the start could insert
    let listed = fx.registry.list_instances();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed["2"].name, "svc");

    stop_all.await.unwrap();
    fx.registry.stop_all_instances().await;
}
