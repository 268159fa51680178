//! Postgres message queue (pgmq extension) backend.
//!
//! Uses `pgmq.pop` (read-and-delete, no visibility timeout) and `pgmq.send`
//! with a delay in seconds. Payloads are stored as `jsonb`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{error, instrument, warn};

use super::{JobQueue, QueueError, QueueMessage};

#[derive(Debug, Clone)]
pub struct PgmqJobQueue {
    pool: Arc<PgPool>,
}

impl PgmqJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the queue if it does not exist yet (idempotent).
    pub async fn ensure_queue(&self, queue: &str) -> Result<(), QueueError> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue)
            .execute(&*self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Decode a `jsonb` body read as text. Text that is not JSON is kept as a
/// JSON string so the processor requeues it verbatim.
fn payload_from_text(text: Option<String>) -> JsonValue {
    match text {
        None => JsonValue::Null,
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            error!(error = %e, "popped message body is not valid JSON");
            JsonValue::String(raw)
        }),
    }
}

#[async_trait]
impl JobQueue for PgmqJobQueue {
    #[instrument(skip(self), err)]
    async fn pop(&self, queue: &str) -> Result<Option<QueueMessage>, QueueError> {
        // `message` is read as text: pgmq has already deleted the row, so a
        // body that fails to decode must still reach the requeue path.
        let row = sqlx::query(
            r#"
            SELECT msg_id, read_ct, enqueued_at, message::text AS message
            FROM pgmq.pop($1)
            "#,
        )
        .bind(queue)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let msg_id = row.try_get::<i64, _>("msg_id").ok();
        let read_count = row.try_get::<i32, _>("read_ct").unwrap_or_else(|e| {
            warn!(queue, ?msg_id, error = %e, "undecodable read_ct on popped message");
            0
        });
        let enqueued_at = row.try_get::<DateTime<Utc>, _>("enqueued_at").ok();
        let payload = match row.try_get::<Option<String>, _>("message") {
            Ok(text) => payload_from_text(text),
            Err(e) => {
                error!(queue, ?msg_id, error = %e, "popped message body could not be read");
                JsonValue::Null
            }
        };

        Ok(Some(QueueMessage {
            msg_id,
            read_count,
            enqueued_at,
            payload,
        }))
    }

    #[instrument(skip(self, payload), fields(delay_secs = delay.as_secs()), err)]
    async fn send(&self, queue: &str, payload: &JsonValue, delay: Duration) -> Result<(), QueueError> {
        let delay_secs = i32::try_from(delay.as_secs())
            .map_err(|_| QueueError::Backend(format!("delay {delay:?} out of range")))?;

        sqlx::query("SELECT pgmq.send($1, $2, $3)")
            .bind(queue)
            .bind(Json(payload))
            .bind(delay_secs)
            .execute(&*self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_jsonb_text_bodies() {
        assert_eq!(
            payload_from_text(Some(r#"{"textPrompt": "tee", "itemId": "1"}"#.to_string())),
            json!({"textPrompt": "tee", "itemId": "1"})
        );
        // A jsonb string holding serialized JSON stays a string.
        assert_eq!(
            payload_from_text(Some(r#""{\"itemId\":\"1\"}""#.to_string())),
            json!(r#"{"itemId":"1"}"#)
        );
        assert_eq!(payload_from_text(None), JsonValue::Null);
    }

    #[test]
    fn keeps_undecodable_bodies_as_raw_text() {
        assert_eq!(payload_from_text(Some("{truncated".to_string())), json!("{truncated"));
    }
}
