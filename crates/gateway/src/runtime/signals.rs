//! Per-task workflow signals: cancellation and pause/resume.
//!
//! Each running workflow registers a signal set. The cancel token is
//! checked at every termination-predicate check and before each activity
//! dispatch; the pause flag is a watch channel the loop awaits at its gate.
//! Cancellation supersedes pause: a paused workflow still exits on cancel.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The workflow-side handle: owned by exactly one execution.
pub struct SignalHandle {
    pub cancel: CancellationToken,
    pub pause: watch::Receiver<bool>,
}

struct TaskSignals {
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
}

/// Tracks the signal set of every active workflow, keyed by task id.
#[derive(Default)]
pub struct SignalHub {
    inner: Mutex<HashMap<Uuid, TaskSignals>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register signals for a task, returning the workflow-side handle.
    /// Re-registering a task id replaces the previous signal set.
    pub fn register(&self, task_id: Uuid) -> SignalHandle {
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        self.inner.lock().insert(
            task_id,
            TaskSignals {
                cancel: cancel.clone(),
                pause: pause_tx,
            },
        );
        SignalHandle {
            cancel,
            pause: pause_rx,
        }
    }

    /// Signal cancellation. Returns true if the task had active signals.
    pub fn cancel(&self, task_id: &Uuid) -> bool {
        match self.inner.lock().get(task_id) {
            Some(signals) => {
                signals.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Flip the pause flag on. Returns false for unknown or already-paused
    /// tasks.
    pub fn pause(&self, task_id: &Uuid) -> bool {
        match self.inner.lock().get(task_id) {
            Some(signals) if !*signals.pause.borrow() => {
                signals.pause.send_replace(true);
                true
            }
            _ => false,
        }
    }

    /// Flip the pause flag off. Returns false for unknown or not-paused
    /// tasks.
    pub fn resume(&self, task_id: &Uuid) -> bool {
        match self.inner.lock().get(task_id) {
            Some(signals) if *signals.pause.borrow() => {
                signals.pause.send_replace(false);
                true
            }
            _ => false,
        }
    }

    pub fn is_registered(&self, task_id: &Uuid) -> bool {
        self.inner.lock().contains_key(task_id)
    }

    /// Drop a task's signals (called when its workflow exits).
    pub fn remove(&self, task_id: &Uuid) {
        self.inner.lock().remove(task_id);
    }
}
