//! In-memory queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{JobQueue, QueueError, QueueMessage};

#[derive(Debug, Clone)]
struct Entry {
    message: QueueMessage,
    visible_at: DateTime<Utc>,
}

/// FIFO queue per name with delayed visibility.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    queues: Mutex<HashMap<String, VecDeque<Entry>>>,
    next_id: AtomicI64,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message that is visible immediately.
    pub fn push(&self, queue: &str, payload: JsonValue) -> i64 {
        self.push_at(queue, payload, Utc::now())
    }

    fn push_at(&self, queue: &str, payload: JsonValue, visible_at: DateTime<Utc>) -> i64 {
        let msg_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = QueueMessage {
            msg_id: Some(msg_id),
            read_count: 0,
            enqueued_at: Some(Utc::now()),
            payload,
        };
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(Entry { message, visible_at });
        msg_id
    }

    /// Messages currently stored (visible or delayed).
    pub fn len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Payloads currently stored, in queue order.
    pub fn payloads(&self, queue: &str) -> Vec<JsonValue> {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .get(queue)
            .map(|q| q.iter().map(|e| e.message.payload.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn pop(&self, queue: &str) -> Result<Option<QueueMessage>, QueueError> {
        let now = Utc::now();
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))?;

        let Some(entries) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(pos) = entries.iter().position(|e| e.visible_at <= now) else {
            return Ok(None);
        };

        Ok(entries.remove(pos).map(|entry| {
            let mut message = entry.message;
            message.read_count += 1;
            message
        }))
    }

    async fn send(&self, queue: &str, payload: &JsonValue, delay: Duration) -> Result<(), QueueError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| QueueError::Backend(format!("delay out of range: {e}")))?;
        self.push_at(queue, payload.clone(), Utc::now() + delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pops_in_fifo_order_and_reports_empty() {
        let queue = InMemoryJobQueue::new();
        queue.push("q", json!({"n": 1}));
        queue.push("q", json!({"n": 2}));

        assert_eq!(queue.pop("q").await.unwrap().unwrap().payload, json!({"n": 1}));
        assert_eq!(queue.pop("q").await.unwrap().unwrap().payload, json!({"n": 2}));
        assert!(queue.pop("q").await.unwrap().is_none());
        assert!(queue.pop("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delayed_messages_are_invisible_until_due() {
        let queue = InMemoryJobQueue::new();
        queue.send("q", &json!({"late": true}), Duration::from_secs(30)).await.unwrap();
        queue.push("q", json!({"now": true}));

        let first = queue.pop("q").await.unwrap().unwrap();
        assert_eq!(first.payload, json!({"now": true}));
        assert_eq!(first.read_count, 1);

        assert!(queue.pop("q").await.unwrap().is_none());
        assert_eq!(queue.len("q"), 1);
    }
}
