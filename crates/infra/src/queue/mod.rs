//! Durable work queue boundary.
//!
//! Semantics expected from every backend:
//! - **At-least-once**: a message may be delivered more than once
//! - **Pop removes**: a popped message is gone from the queue (no lease, no visibility timeout)
//! - **Delayed send**: a message sent with a delay becomes poppable only after it
//! - **Empty is not an error**: `pop` returns `Ok(None)` on an empty queue

pub mod in_memory;
pub mod pgmq;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use in_memory::InMemoryJobQueue;
pub use pgmq::PgmqJobQueue;

/// Queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("queue call timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A message popped from the queue.
///
/// `payload` is kept exactly as delivered so it can be re-submitted verbatim
/// when it cannot be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub msg_id: Option<i64>,
    pub read_count: i32,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub payload: JsonValue,
}

/// Durable queue abstraction.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Remove and return the next visible message, or `None` when the queue is empty.
    async fn pop(&self, queue: &str) -> Result<Option<QueueMessage>, QueueError>;

    /// Enqueue `payload`, invisible to `pop` until `delay` has elapsed.
    async fn send(&self, queue: &str, payload: &JsonValue, delay: Duration) -> Result<(), QueueError>;
}
