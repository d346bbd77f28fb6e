//! Shutdown coordination and background task ownership.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for stopping periodic work.
///
/// Health probing, retry draining, and history sweeping all subscribe to a
/// broadcast channel; triggering it stops every loop after the cycle in
/// progress completes. Receivers created after a trigger never observe it,
/// so a stopped task owner can start a fresh task later.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger the signal and free every given slot for a later restart.
    /// In-progress cycles run to completion.
    pub fn stop(&self, slots: &[&TaskSlot]) {
        self.trigger();
        for slot in slots {
            slot.clear();
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot owning at most one live background task.
///
/// Spawning into an occupied slot is a no-op, so every "starting twice
/// never duplicates the task" guarantee funnels through here. Clearing
/// the slot only detaches the handle; stopping the task itself goes
/// through the [`Shutdown`] it was spawned with.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Spawn a task wired to `shutdown`, unless a live one already
    /// occupies the slot. Returns whether a task was spawned.
    pub fn spawn<F, Fut>(&self, shutdown: &Shutdown, f: F) -> bool
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!(task = self.name, "Background task already running");
            return false;
        }
        tracing::debug!(task = self.name, "Background task starting");
        *slot = Some(tokio::spawn(f(shutdown.subscribe())));
        true
    }

    /// Whether a live task currently occupies the slot.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Detach the current handle, freeing the slot for a later restart.
    pub fn clear(&self) {
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
