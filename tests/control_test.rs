//! Tests for the cooperative run/pause/stop control state and its registry.

use skipper_lib::control::{ControlRegistry, ControlState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_should_stop_false_when_gate_open() {
    let control = ControlState::new();
    control.reset();
    assert!(!control.should_stop().await);
}

#[tokio::test]
async fn test_should_stop_true_after_stop() {
    let control = ControlState::new();
    control.reset();
    control.stop();
    assert!(control.should_stop().await);
}

#[tokio::test]
async fn test_pause_blocks_checkpoint_until_resume() {
    let control = Arc::new(ControlState::new());
    control.reset();
    control.pause();
    assert!(control.is_paused());

    let waiter = {
        let control = control.clone();
        tokio::spawn(async move { control.should_stop().await })
    };

    // The checkpoint must be suspended while the gate is closed
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    control.resume();
    let stop = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("checkpoint did not wake after resume")
        .unwrap();
    assert!(!stop);
}

#[tokio::test]
async fn test_stop_wakes_paused_checkpoint() {
    let control = Arc::new(ControlState::new());
    control.reset();
    control.pause();

    let waiter = {
        let control = control.clone();
        tokio::spawn(async move { control.should_stop().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    // stop() must reopen the gate so the paused worker observes the stop
    control.stop();
    let stop = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("stop left the checkpoint blocked")
        .unwrap();
    assert!(stop);
}

#[tokio::test]
async fn test_finish_clears_all_state() {
    let control = ControlState::new();
    control.reset();
    control.pause();
    control.stop();

    control.finish();
    assert!(!control.is_running());
    assert!(!control.is_paused());
    // a later checkpoint sees no stale stop
    assert!(!control.should_stop().await);
}

#[tokio::test]
async fn test_finish_is_idempotent() {
    let control = ControlState::new();
    control.reset();
    control.finish();
    control.finish();
    assert!(!control.is_running());
    assert!(!control.is_paused());
}

#[tokio::test]
async fn test_reset_clears_stale_stop_and_pause() {
    let control = ControlState::new();
    control.reset();
    control.stop();
    control.pause();

    control.reset();
    assert!(control.is_running());
    assert!(!control.is_paused());
    assert!(!control.should_stop().await);
}

#[tokio::test]
async fn test_stop_pause_resume_interleaving() {
    let control = Arc::new(ControlState::new());
    control.reset();

    // worker loops on checkpoints until it observes the stop
    let worker = {
        let control = control.clone();
        tokio::spawn(async move {
            let mut checkpoints = 0u32;
            while !control.should_stop().await {
                checkpoints += 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            checkpoints
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    control.pause();
    tokio::time::sleep(Duration::from_millis(50)).await;
    control.resume();
    tokio::time::sleep(Duration::from_millis(50)).await;
    control.pause();
    // stop while paused: the worker must still terminate
    control.stop();

    let checkpoints = tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker never observed the stop")
        .unwrap();
    assert!(checkpoints > 0);
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn test_registry_resolves_active_task_by_default() {
    let registry = ControlRegistry::new();
    assert!(registry.resolve(None).is_none());

    let (task_id, control) = registry.register();
    assert!(control.is_running());

    let by_default = registry.resolve(None).unwrap();
    let by_id = registry.resolve(Some(&task_id)).unwrap();
    assert!(Arc::ptr_eq(&by_default, &by_id));
}

#[test]
fn test_registry_tasks_do_not_share_state() {
    let registry = ControlRegistry::new();
    let (first_id, first) = registry.register();
    let (_second_id, second) = registry.register();

    first.pause();
    assert!(first.is_paused());
    assert!(!second.is_paused());

    // the later task is the active one
    let active = registry.resolve(None).unwrap();
    assert!(Arc::ptr_eq(&active, &second));

    // the earlier task is still addressable by id
    assert!(registry.resolve(Some(&first_id)).unwrap().is_paused());
}

#[test]
fn test_registry_finish_releases_task() {
    let registry = ControlRegistry::new();
    let (task_id, control) = registry.register();
    control.pause();

    registry.finish(&task_id);
    assert!(!control.is_running());
    assert!(!control.is_paused());
    assert!(registry.resolve(Some(&task_id)).is_none());
    assert!(registry.resolve(None).is_none());

    // releasing an unknown id is a no-op
    registry.finish(&task_id);
}

#[test]
fn test_registry_finish_keeps_other_tasks() {
    let registry = ControlRegistry::new();
    let (first_id, _first) = registry.register();
    let (second_id, second) = registry.register();

    registry.finish(&first_id);
    assert!(registry.resolve(Some(&first_id)).is_none());
    let active = registry.resolve(None).unwrap();
    assert!(Arc::ptr_eq(&active, &second));
    assert!(registry.resolve(Some(&second_id)).is_some());
}
