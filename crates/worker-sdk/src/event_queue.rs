//! In-process event queue between the Agent Loop and the event
//! WebSocket (§4.7, §9's "event emission as a channel" re-architecture
//! item). A failed send re-enqueues its event at the **front**, so
//! ordering within a burst survives a reconnect.

use std::collections::VecDeque;

use am_protocol::WorkerEvent;
use tokio::sync::{Mutex, Notify};

pub struct EventQueue {
    inner: Mutex<VecDeque<WorkerEvent>>,
    notify: Notify,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Publish an event (called from the Agent Loop).
    pub async fn push(&self, event: WorkerEvent) {
        self.inner.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// Re-enqueue at the front after a failed send.
    pub async fn push_front(&self, event: WorkerEvent) {
        self.inner.lock().await.push_front(event);
        self.notify.notify_one();
    }

    /// Wait for and remove the next event.
    pub async fn pop(&self) -> WorkerEvent {
        loop {
            if let Some(event) = self.inner.lock().await.pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_protocol::EventType;

    fn ev(universe_id: &str) -> WorkerEvent {
        WorkerEvent::new(EventType::UniverseCreated, "w1", universe_id)
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = EventQueue::new();
        q.push(ev("u1")).await;
        q.push(ev("u2")).await;
        assert_eq!(q.pop().await.universe_id, "u1");
        assert_eq!(q.pop().await.universe_id, "u2");
    }

    #[tokio::test]
    async fn push_front_reorders_ahead_of_queue() {
        let q = EventQueue::new();
        q.push(ev("u2")).await;
        q.push_front(ev("u1")).await;
        assert_eq!(q.pop().await.universe_id, "u1");
        assert_eq!(q.pop().await.universe_id, "u2");
    }
}
