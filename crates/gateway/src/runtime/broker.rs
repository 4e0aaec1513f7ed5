//! In-process message broker: topic-keyed broadcast fan-out.
//!
//! Delivery is at-least-once from the consumer's point of view (a
//! subscriber that also reads the log sees duplicates); consumers dedup by
//! `event_id`. Slow subscribers may lag and drop intermediate events —
//! chunk frames are best-effort by contract.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use ah_domain::event::TaskEvent;

const TOPIC_BUFFER: usize = 256;

/// The broker topic carrying a task's event stream.
pub fn task_topic(task_id: &Uuid) -> String {
    format!("task.{task_id}.events")
}

#[derive(Default)]
pub struct EventBroker {
    topics: RwLock<HashMap<String, broadcast::Sender<TaskEvent>>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic, creating it on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<TaskEvent> {
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .subscribe()
    }

    /// Publish to a topic. Dropped silently when nobody subscribed yet —
    /// history lives in the event log, not the broker.
    pub fn publish(&self, topic: &str, event: TaskEvent) {
        let topics = self.topics.read();
        if let Some(tx) = topics.get(topic) {
            let _ = tx.send(event);
        }
    }

    /// Tear down a topic once its task is terminal; pending subscribers
    /// observe channel close after draining.
    pub fn remove_topic(&self, topic: &str) {
        self.topics.write().remove(topic);
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }
}
