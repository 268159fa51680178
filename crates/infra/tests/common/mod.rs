#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use fitcheck_core::{ImageJobPayload, RateLimitWindow};
use fitcheck_infra::handler::{HandlerError, JobHandler, JobOutcome};
use fitcheck_infra::ledger::{InMemoryRateLimitStore, RateLimitStore, RateLimitStoreError};
use fitcheck_infra::queue::{InMemoryJobQueue, JobQueue, QueueError, QueueMessage};

pub const QUEUE: &str = "image_generation";
pub const API: &str = "openai_image_generation";

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub queue: String,
    pub payload: JsonValue,
    pub delay: Duration,
}

/// In-memory queue that records traffic and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    pub inner: InMemoryJobQueue,
    pops: AtomicUsize,
    sends: Mutex<Vec<SentMessage>>,
    fail_pops_after: Mutex<Option<usize>>,
    fail_sends: AtomicBool,
    hang_pops: AtomicBool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: JsonValue) {
        self.inner.push(QUEUE, payload);
    }

    pub fn pop_calls(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> Vec<SentMessage> {
        self.sends.lock().unwrap().clone()
    }

    pub fn fail_pops_after(&self, successful: usize) {
        *self.fail_pops_after.lock().unwrap() = Some(successful);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn hang_pops(&self) {
        self.hang_pops.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn pop(&self, queue: &str) -> Result<Option<QueueMessage>, QueueError> {
        let call = self.pops.fetch_add(1, Ordering::SeqCst);
        if self.hang_pops.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let fail_after = *self.fail_pops_after.lock().unwrap();
        if let Some(limit) = fail_after {
            if call >= limit {
                return Err(QueueError::Backend("connection refused".to_string()));
            }
        }
        self.inner.pop(queue).await
    }

    async fn send(&self, queue: &str, payload: &JsonValue, delay: Duration) -> Result<(), QueueError> {
        self.sends.lock().unwrap().push(SentMessage {
            queue: queue.to_string(),
            payload: payload.clone(),
            delay,
        });
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::Backend("queue unavailable".to_string()));
        }
        self.inner.send(queue, payload, delay).await
    }
}

/// Ledger whose reads or writes fail on demand.
#[derive(Debug, Default)]
pub struct FlakyLedger {
    pub inner: InMemoryRateLimitStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl RateLimitStore for FlakyLedger {
    async fn get(&self, api_name: &str) -> Result<Option<RateLimitWindow>, RateLimitStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RateLimitStoreError::Storage("read timeout".to_string()));
        }
        self.inner.get(api_name).await
    }

    async fn upsert(&self, window: &RateLimitWindow) -> Result<(), RateLimitStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RateLimitStoreError::Storage("write rejected".to_string()));
        }
        self.inner.upsert(window).await
    }
}

/// How a [`ScriptedHandler`] responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    Error,
    Panic,
}

/// Handler that records the item ids it sees, in call order.
#[derive(Debug)]
pub struct ScriptedHandler {
    script: Script,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, payload: &ImageJobPayload) -> Result<JobOutcome, HandlerError> {
        self.calls.lock().unwrap().push(payload.item_id.to_string());
        match self.script {
            Script::Succeed => Ok(JobOutcome::succeeded("Image generated and saved successfully.")),
            Script::Fail => Ok(JobOutcome::failed("Supabase Upload Failed.", "bucket missing")),
            Script::Error => Err(HandlerError::Generation("rate limited upstream".to_string())),
            Script::Panic => panic!("handler blew up"),
        }
    }
}

pub fn job(item_id: &str) -> JsonValue {
    serde_json::json!({ "textPrompt": format!("prompt for {item_id}"), "itemId": item_id })
}
