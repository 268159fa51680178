//! Rate-limited queue processor.
//!
//! ## Flow of one `run_once`
//!
//! 1. Read remaining capacity from the rate-limit ledger (error: abort the run)
//! 2. Zero capacity: return without touching the queue
//! 3. Pop up to `capacity` messages, sequentially, each pop bounded by a timeout
//! 4. Record the reservation in the ledger *before* dispatching anything
//!    (write failure: requeue the whole batch, dispatch nothing)
//! 5. Spawn one task per message, in pop order, and return immediately
//!
//! Handler tasks keep running after `run_once` returns. A background aggregator
//! waits for them and logs the batch totals; callers that need those totals can
//! await the [`BatchHandle`] in the returned [`RunReport`].
//!
//! Two processors (or two overlapping runs) share nothing but the ledger row,
//! which is read and written without compare-and-swap: the limit is cooperative.

mod dispatch;
mod stats;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use fitcheck_core::{ImageJobPayload, ItemId};

use crate::config::ProcessorConfig;
use crate::handler::JobHandler;
use crate::ledger::{RateLimitStore, RateLimitWindowManager};
use crate::queue::{JobQueue, QueueError, QueueMessage};

use dispatch::{DispatchContext, InFlight, aggregate, requeue, run_job};

pub use dispatch::{BatchHandle, BatchSummary, JobDisposition};
pub use stats::{ProcessorStats, StatsSnapshot};

/// A job launched by `run_once`, in launch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedJob {
    pub msg_id: Option<i64>,
    /// `None` when the payload could not be parsed (the raw message was requeued).
    pub item_id: Option<ItemId>,
}

/// Result of one `run_once` invocation.
#[derive(Debug)]
pub struct RunReport {
    pub success: bool,
    /// Messages drained and launched this run (parse failures included).
    pub processed: usize,
    pub message: String,
    pub dispatched: Vec<DispatchedJob>,
    /// Background aggregation of the launched batch, if anything was launched.
    pub batch: Option<BatchHandle>,
}

impl RunReport {
    fn idle(message: impl Into<String>) -> Self {
        Self {
            success: true,
            processed: 0,
            message: message.into(),
            dispatched: Vec::new(),
            batch: None,
        }
    }

    fn failed(message: impl Into<String>, batch: Option<BatchHandle>) -> Self {
        Self {
            success: false,
            processed: 0,
            message: message.into(),
            dispatched: Vec::new(),
            batch,
        }
    }
}

/// Bounded, rate-aware, at-least-once consumer of the image-generation queue.
pub struct QueueProcessor {
    config: ProcessorConfig,
    ledger: RateLimitWindowManager,
    ctx: Arc<DispatchContext>,
}

impl QueueProcessor {
    pub fn new(
        config: ProcessorConfig,
        ledger: Arc<dyn RateLimitStore>,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let ctx = Arc::new(DispatchContext {
            queue,
            handler,
            stats: Arc::new(ProcessorStats::new()),
            queue_name: config.queue_name.clone(),
            requeue_delay: config.requeue_delay,
        });

        Self {
            config,
            ledger: RateLimitWindowManager::new(ledger),
            ctx,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        self.ctx.stats.clone()
    }

    /// Drain and dispatch one rate-limited batch.
    ///
    /// Returns as soon as every job is launched; it does not wait for handlers.
    /// Never panics or returns an error: failures are contained per job or
    /// reported through `success: false`.
    pub async fn run_once(&self) -> RunReport {
        let report = self.run_batch().await;
        self.ctx.stats.record_run(report.success);
        report
    }

    async fn run_batch(&self) -> RunReport {
        let config = &self.config;

        let capacity = match self
            .ledger
            .current_capacity(&config.api_name, &config.policy())
            .await
        {
            Ok(capacity) => capacity,
            Err(e) => {
                error!(api_name = %config.api_name, error = %e, "error checking rate limits");
                return RunReport::failed("Failed to check rate limits", None);
            }
        };

        if capacity.is_exhausted() {
            debug!(api_name = %config.api_name, "rate limit reached");
            return RunReport::idle("Rate limit reached, waiting for window to reset");
        }

        let drained = self.drain(capacity.available).await;
        if drained.is_empty() {
            return RunReport::idle("No messages in queue to process");
        }

        let drained_count = u32::try_from(drained.len()).unwrap_or(u32::MAX);
        let reservation = self
            .ledger
            .reserve(
                &config.api_name,
                capacity.window_start,
                capacity.count_after(drained_count),
            )
            .await;

        if !reservation.success {
            warn!(count = drained.len(), "rate limit reservation failed; re-queueing batch");
            let batch = self.requeue_all(drained);
            return RunReport::failed("Error updating rate limit", Some(batch));
        }

        let processed = drained.len();
        let (dispatched, batch) = self.dispatch(drained);
        info!(
            processed,
            reserved = reservation.reserved_count,
            queue = %config.queue_name,
            "started processing batch"
        );

        RunReport {
            success: true,
            processed,
            message: format!("Started processing {processed} items from queue"),
            dispatched,
            batch: Some(batch),
        }
    }

    /// Pop up to `capacity` messages. Stops early on an empty queue, a pop
    /// error or a pop timeout, keeping whatever was already collected.
    ///
    /// `capacity` comes from configuration and may be huge; the buffer grows
    /// with what is actually popped.
    async fn drain(&self, capacity: u32) -> Vec<QueueMessage> {
        let queue_name = &self.config.queue_name;
        let limit = usize::try_from(capacity).unwrap_or(usize::MAX);
        let mut drained = Vec::new();

        while drained.len() < limit {
            let popped = tokio::time::timeout(self.config.pop_timeout, self.ctx.queue.pop(queue_name))
                .await
                .unwrap_or(Err(QueueError::Timeout(self.config.pop_timeout)));

            match popped {
                Ok(Some(message)) => drained.push(message),
                Ok(None) => break,
                Err(e) => {
                    error!(queue = %queue_name, error = %e, drained = drained.len(), "failed to pop from queue");
                    break;
                }
            }
        }

        drained
    }

    /// Launch one task per message in pop order.
    fn dispatch(&self, drained: Vec<QueueMessage>) -> (Vec<DispatchedJob>, BatchHandle) {
        let mut launched = Vec::with_capacity(drained.len());
        let mut in_flight = Vec::with_capacity(drained.len());

        for message in drained {
            match ImageJobPayload::from_json(&message.payload) {
                Ok(payload) => {
                    let item_id = payload.item_id.clone();
                    launched.push(DispatchedJob {
                        msg_id: message.msg_id,
                        item_id: Some(item_id.clone()),
                    });
                    let requeue_payload = payload.to_json();
                    in_flight.push(InFlight {
                        handle: tokio::spawn(run_job(self.ctx.clone(), payload)),
                        requeue_payload,
                        item_id: Some(item_id),
                    });
                }
                Err(e) => {
                    warn!(msg_id = ?message.msg_id, error = %e, "error parsing message");
                    self.ctx.stats.record_parse_failure();
                    self.ctx.stats.record_failure();
                    launched.push(DispatchedJob {
                        msg_id: message.msg_id,
                        item_id: None,
                    });
                    in_flight.push(self.spawn_requeue(message.payload, e.to_string()));
                }
            }
        }

        self.ctx.stats.record_dispatched(launched.len());
        let jobs = abort_handles(&in_flight);
        let batch = BatchHandle::spawn(aggregate(self.ctx.clone(), in_flight, launched.len()), jobs);
        (launched, batch)
    }

    /// Requeue every drained message verbatim (nothing is dispatched).
    fn requeue_all(&self, drained: Vec<QueueMessage>) -> BatchHandle {
        let in_flight: Vec<InFlight> = drained
            .into_iter()
            .map(|message| {
                self.spawn_requeue(message.payload, "rate limit reservation failed".to_string())
            })
            .collect();
        let jobs = abort_handles(&in_flight);
        BatchHandle::spawn(aggregate(self.ctx.clone(), in_flight, 0), jobs)
    }

    fn spawn_requeue(&self, raw: serde_json::Value, cause: String) -> InFlight {
        let ctx = self.ctx.clone();
        let payload = raw.clone();
        InFlight {
            handle: tokio::spawn(async move { requeue(&ctx, &payload, None, &cause).await }),
            requeue_payload: raw,
            item_id: None,
        }
    }
}

fn abort_handles(in_flight: &[InFlight]) -> Vec<tokio::task::AbortHandle> {
    in_flight.iter().map(|job| job.handle.abort_handle()).collect()
}
