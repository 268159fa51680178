//! Per-job dispatch, requeue and batch aggregation.
//!
//! Every drained message becomes exactly one spawned task. Failed jobs are
//! requeued with a fixed delay; a requeue that itself fails drops the job
//! (logged at error and counted in `requeue_dropped`).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use fitcheck_core::{ImageJobPayload, ItemId};

use super::stats::ProcessorStats;
use crate::handler::JobHandler;
use crate::queue::JobQueue;

/// Collaborators shared by all tasks of all batches.
pub(crate) struct DispatchContext {
    pub queue: Arc<dyn JobQueue>,
    pub handler: Arc<dyn JobHandler>,
    pub stats: Arc<ProcessorStats>,
    pub queue_name: String,
    pub requeue_delay: Duration,
}

/// Terminal state of one job for this delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    Succeeded,
    Requeued { reason: String },
    /// The requeue failed; the job is lost.
    Dropped { reason: String },
}

/// Counts for one settled batch. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub requeued: usize,
    pub dropped: usize,
}

impl BatchSummary {
    fn record(&mut self, disposition: &JobDisposition) {
        match disposition {
            JobDisposition::Succeeded => self.succeeded += 1,
            JobDisposition::Requeued { .. } => {
                self.failed += 1;
                self.requeued += 1;
            }
            JobDisposition::Dropped { .. } => {
                self.failed += 1;
                self.dropped += 1;
            }
        }
    }
}

/// Background aggregation of a launched batch.
///
/// Dropping the handle does not cancel anything; awaiting it is optional.
/// [`BatchHandle::settle`] bounds the wait and cancels jobs that are still
/// running once the grace period is over; the aggregator requeues those.
#[derive(Debug)]
pub struct BatchHandle {
    join: JoinHandle<BatchSummary>,
    jobs: Vec<AbortHandle>,
}

impl BatchHandle {
    pub(crate) fn spawn<F>(aggregation: F, jobs: Vec<AbortHandle>) -> Self
    where
        F: std::future::Future<Output = BatchSummary> + Send + 'static,
    {
        Self {
            join: tokio::spawn(aggregation),
            jobs,
        }
    }

    /// Wait until every job of the batch has settled.
    pub async fn wait(self) -> Option<BatchSummary> {
        summary_of(self.join.await)
    }

    /// Wait up to `grace` for the batch; then cancel unfinished jobs and wait
    /// for the aggregator to requeue them.
    pub async fn settle(mut self, grace: Duration) -> Option<BatchSummary> {
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(joined) => summary_of(joined),
            Err(_) => {
                let unfinished = self.jobs.iter().filter(|job| !job.is_finished()).count();
                warn!(unfinished, "batch did not settle in time; cancelling remaining jobs");
                for job in &self.jobs {
                    job.abort();
                }
                summary_of(self.join.await)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

fn summary_of(joined: Result<BatchSummary, JoinError>) -> Option<BatchSummary> {
    match joined {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!(error = %e, "batch aggregator failed");
            None
        }
    }
}

/// A launched task plus what to requeue should the task die without settling.
pub(crate) struct InFlight {
    pub handle: JoinHandle<JobDisposition>,
    pub requeue_payload: JsonValue,
    pub item_id: Option<ItemId>,
}

/// Run the handler for one parsed job and requeue it on failure.
pub(crate) async fn run_job(ctx: Arc<DispatchContext>, payload: ImageJobPayload) -> JobDisposition {
    let cause = match ctx.handler.handle(&payload).await {
        Ok(outcome) if outcome.success => {
            ctx.stats.record_success();
            debug!(item_id = %payload.item_id, message = %outcome.message, "job succeeded");
            return JobDisposition::Succeeded;
        }
        Ok(outcome) => outcome.describe(),
        Err(e) => e.to_string(),
    };

    ctx.stats.record_failure();
    warn!(item_id = %payload.item_id, error = %cause, "job failed");
    requeue(&ctx, &payload.to_json(), Some(&payload.item_id), &cause).await
}

/// Re-submit `payload` with the configured delay.
pub(crate) async fn requeue(
    ctx: &DispatchContext,
    payload: &JsonValue,
    item_id: Option<&ItemId>,
    cause: &str,
) -> JobDisposition {
    let item = item_id.map(ItemId::as_str).unwrap_or("<unparsed>");
    info!(item_id = item, queue = %ctx.queue_name, "re-queueing failed message");

    match ctx
        .queue
        .send(&ctx.queue_name, payload, ctx.requeue_delay)
        .await
    {
        Ok(()) => {
            ctx.stats.record_requeued();
            debug!(item_id = item, delay_secs = ctx.requeue_delay.as_secs(), "re-queued message");
            JobDisposition::Requeued {
                reason: cause.to_string(),
            }
        }
        Err(e) => {
            ctx.stats.record_requeue_dropped();
            error!(
                item_id = item,
                error = %e,
                original_error = %cause,
                "failed to re-queue message; job dropped"
            );
            JobDisposition::Dropped {
                reason: format!("{cause}; requeue failed: {e}"),
            }
        }
    }
}

/// Await every task of a batch (in launch order) and log the totals.
pub(crate) async fn aggregate(
    ctx: Arc<DispatchContext>,
    in_flight: Vec<InFlight>,
    dispatched: usize,
) -> BatchSummary {
    let mut summary = BatchSummary {
        dispatched,
        ..BatchSummary::default()
    };

    for job in in_flight {
        let disposition = match job.handle.await {
            Ok(disposition) => disposition,
            Err(e) => {
                ctx.stats.record_failure();
                let cause = if e.is_cancelled() {
                    "job cancelled before it settled".to_string()
                } else {
                    format!("job task panicked: {e}")
                };
                error!(item_id = ?job.item_id, error = %cause, "job task did not settle");
                requeue(&ctx, &job.requeue_payload, job.item_id.as_ref(), &cause).await
            }
        };
        summary.record(&disposition);
    }

    info!(
        dispatched = summary.dispatched,
        succeeded = summary.succeeded,
        failed = summary.failed,
        requeued = summary.requeued,
        dropped = summary.dropped,
        "batch settled"
    );
    summary
}
