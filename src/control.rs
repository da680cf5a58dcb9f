//! Cooperative run/pause/stop control for agent tasks.
//!
//! Each task gets its own `ControlState`; HTTP control handlers reach it
//! through the `ControlRegistry` keyed by task id, so concurrent tasks never
//! share flags.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Run/pause/stop flags for one task, polled cooperatively by the worker.
///
/// The pause gate is a `watch` channel of `bool` (`true` = open). A paused
/// worker suspends in [`ControlState::should_stop`] until the gate reopens;
/// `stop()` always reopens it so the worker can observe the stop instead of
/// blocking forever.
pub struct ControlState {
    stop_requested: AtomicBool,
    running: AtomicBool,
    gate: watch::Sender<bool>,
}

impl ControlState {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            gate,
        }
    }

    /// Clear any stale stop/pause state and mark the task running.
    /// Called once, before the worker starts.
    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.gate.send_replace(true);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Request a stop. Reopens the gate so a paused worker wakes up and sees
    /// the flag at its next checkpoint.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.gate.send_replace(true);
    }

    /// Close the gate. Workers block at their next checkpoint until
    /// `resume()` or `stop()`.
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Reopen the gate.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.gate.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The worker's cooperative checkpoint: suspends while the gate is
    /// closed, then returns whether a stop was requested.
    pub async fn should_stop(&self) -> bool {
        let mut rx = self.gate.subscribe();
        // wait_for only errors when the sender is dropped, and we own it
        let _ = rx.wait_for(|open| *open).await;
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Mark the task finished: not running, stop flag cleared, gate open.
    /// Idempotent; runs on every worker exit path.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        self.gate.send_replace(true);
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of in-flight task controls.
///
/// Control endpoints historically carried no task id, so the registry also
/// tracks the most recently started task and resolves id-less requests to it.
pub struct ControlRegistry {
    tasks: RwLock<HashMap<String, Arc<ControlState>>>,
    active: RwLock<Option<String>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    /// Create a fresh, reset control context under a new task id and mark it
    /// as the active task.
    pub fn register(&self) -> (String, Arc<ControlState>) {
        let task_id = Uuid::new_v4().to_string();
        let control = Arc::new(ControlState::new());
        control.reset();
        self.tasks.write().insert(task_id.clone(), control.clone());
        *self.active.write() = Some(task_id.clone());
        (task_id, control)
    }

    /// Look up a task's control, defaulting to the active task when no id is
    /// given.
    pub fn resolve(&self, task_id: Option<&str>) -> Option<Arc<ControlState>> {
        let tasks = self.tasks.read();
        match task_id {
            Some(id) => tasks.get(id).cloned(),
            None => self
                .active
                .read()
                .as_deref()
                .and_then(|id| tasks.get(id).cloned()),
        }
    }

    /// Run the task's `finish()` and drop it from the registry. Safe to call
    /// for ids that were already released.
    pub fn finish(&self, task_id: &str) {
        if let Some(control) = self.tasks.write().remove(task_id) {
            control.finish();
        }
        let mut active = self.active.write();
        if active.as_deref() == Some(task_id) {
            *active = None;
        }
    }
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::new()
    }
}
