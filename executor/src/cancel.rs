//! Per-workflow cancellation signalling. The Cancellation Coordinator
//! (spec.md §4.7) holds a [`CancelRegistry`] and calls [`CancelRegistry::signal`]
//! with a `deployment.workflow_id`; the executor subscribes to the same
//! id for the lifetime of one `run` and polls `Receiver::is_cancelled` at
//! every suspension point (spec.md §5).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

/// A cheaply-clonable, process-wide registry mapping `workflow_id` to a
/// `watch` channel the executor subscribes to. Mirrors the teacher's
/// `gateway::task` combinators, which wrap a `Task` with a cancellation
/// check rather than threading a cancellation token through every layer.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    senders: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or reuses) the channel for `workflow_id` and returns a
    /// receiver the executor polls between steps.
    pub async fn subscribe(&self, workflow_id: &str) -> CancelHandle {
        let mut senders = self.senders.lock().await;
        let sender = senders
            .entry(workflow_id.to_string())
            .or_insert_with(|| watch::channel(false).0);
        CancelHandle {
            receiver: sender.subscribe(),
        }
    }

    /// Flips the signal for `workflow_id`. A no-op if nothing is
    /// currently subscribed -- the coordinator may race the executor
    /// registering itself, so `cancel` also leaves a tombstone sender
    /// behind for a subscriber arriving just after.
    pub async fn signal(&self, workflow_id: &str) {
        let mut senders = self.senders.lock().await;
        let sender = senders
            .entry(workflow_id.to_string())
            .or_insert_with(|| watch::channel(false).0);
        let _ = sender.send(true);
    }

    /// Drops the channel once a workflow has reached a terminal state, so
    /// the registry doesn't grow unboundedly over the life of the
    /// process.
    pub async fn forget(&self, workflow_id: &str) {
        self.senders.lock().await.remove(workflow_id);
    }
}

pub struct CancelHandle {
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_is_observed_by_a_handle_subscribed_earlier() {
        let registry = CancelRegistry::new();
        let handle = registry.subscribe("wf-1").await;
        assert!(!handle.is_cancelled());

        registry.signal("wf-1").await;
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn signal_before_subscribe_is_still_observed() {
        let registry = CancelRegistry::new();
        registry.signal("wf-2").await;
        let handle = registry.subscribe("wf-2").await;
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn distinct_workflows_do_not_cross_signal() {
        let registry = CancelRegistry::new();
        let a = registry.subscribe("wf-a").await;
        let b = registry.subscribe("wf-b").await;

        registry.signal("wf-a").await;
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
