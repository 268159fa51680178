//! Periodic driver for the queue processor.
//!
//! Calls [`QueueProcessor::run_once`] on a fixed interval until shutdown is
//! requested. Launched batches are not awaited between ticks: handler calls may
//! outlive the tick that started them. The loop keeps their handles, and on
//! shutdown waits up to `shutdown_grace` for them; jobs still running after
//! that are cancelled and requeued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::processor::{BatchHandle, QueueProcessor};

/// Handle to control and join a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    ///
    /// A `run_once` in progress finishes first. Returns once every launched
    /// batch has settled or been requeued.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "processor worker ended abnormally");
            }
        }
    }
}

#[derive(Debug)]
pub struct ProcessorWorker;

impl ProcessorWorker {
    /// Spawn the periodic loop on the current tokio runtime.
    pub fn spawn(name: &'static str, processor: Arc<QueueProcessor>, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(worker_loop(name, processor, interval, shutdown_rx));

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

async fn worker_loop(
    name: &'static str,
    processor: Arc<QueueProcessor>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!(worker = name, interval_ms = interval.as_millis() as u64, "processor worker started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pending: Vec<BatchHandle> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                pending.retain(|batch| !batch.is_finished());
                let mut report = processor.run_once().await;
                pending.extend(report.batch.take());
                if !report.success {
                    warn!(worker = name, message = %report.message, "queue processing run failed");
                } else {
                    debug!(
                        worker = name,
                        processed = report.processed,
                        message = %report.message,
                        "queue processing run finished"
                    );
                }
            }
        }
    }

    settle(name, pending, processor.config().shutdown_grace).await;
    info!(worker = name, "processor worker stopped");
}

/// Wait for outstanding batches, sharing one grace period between them.
async fn settle(name: &'static str, pending: Vec<BatchHandle>, grace: Duration) {
    let pending: Vec<_> = pending.into_iter().filter(|batch| !batch.is_finished()).collect();
    if pending.is_empty() {
        return;
    }

    info!(worker = name, batches = pending.len(), grace_ms = grace.as_millis() as u64, "waiting for in-flight jobs");
    let deadline = Instant::now().checked_add(grace);
    for batch in pending {
        let remaining = deadline.map_or(grace, |at| at.saturating_duration_since(Instant::now()));
        batch.settle(remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::handler::{HandlerError, JobHandler, JobOutcome};
    use crate::ledger::InMemoryRateLimitStore;
    use crate::queue::InMemoryJobQueue;
    use async_trait::async_trait;
    use fitcheck_core::ImageJobPayload;

    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        async fn handle(&self, _payload: &ImageJobPayload) -> Result<JobOutcome, HandlerError> {
            Ok(JobOutcome::succeeded("ok"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() {
        let processor = Arc::new(QueueProcessor::new(
            ProcessorConfig::default(),
            Arc::new(InMemoryRateLimitStore::new()),
            Arc::new(InMemoryJobQueue::new()),
            Arc::new(Noop),
        ));

        let handle = ProcessorWorker::spawn("test-worker", processor.clone(), Duration::from_secs(5));

        // First tick fires immediately, then one every 5s.
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        handle.shutdown().await;

        assert_eq!(processor.stats().snapshot().runs, 3);
    }

    /// Sleeps for `delay` before succeeding; `None` never returns.
    struct Slow {
        delay: Option<Duration>,
        completed: std::sync::atomic::AtomicUsize,
    }

    impl Slow {
        fn new(delay: Option<Duration>) -> Self {
            Self {
                delay,
                completed: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JobHandler for Slow {
        async fn handle(&self, _payload: &ImageJobPayload) -> Result<JobOutcome, HandlerError> {
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
            self.completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(JobOutcome::succeeded("ok"))
        }
    }

    fn one_job_queue() -> Arc<InMemoryJobQueue> {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.push(
            "image_generation",
            serde_json::json!({"textPrompt": "pleated skirt", "itemId": "sk-1"}),
        );
        queue
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_dispatched_jobs() {
        let queue = one_job_queue();
        let handler = Arc::new(Slow::new(Some(Duration::from_millis(500))));
        let processor = Arc::new(QueueProcessor::new(
            ProcessorConfig::default().with_shutdown_grace(Duration::from_secs(5)),
            Arc::new(InMemoryRateLimitStore::new()),
            queue.clone(),
            handler.clone(),
        ));

        let handle = ProcessorWorker::spawn("test-worker", processor.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(handler.completed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(processor.stats().snapshot().succeeded, 1);
        assert_eq!(queue.len("image_generation"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_requeues_jobs_still_running_after_grace() {
        let queue = one_job_queue();
        let handler = Arc::new(Slow::new(None));
        let processor = Arc::new(QueueProcessor::new(
            ProcessorConfig::default().with_shutdown_grace(Duration::from_secs(1)),
            Arc::new(InMemoryRateLimitStore::new()),
            queue.clone(),
            handler.clone(),
        ));

        let handle = ProcessorWorker::spawn("test-worker", processor.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(handler.completed.load(std::sync::atomic::Ordering::SeqCst), 0);
        let stats = processor.stats().snapshot();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.requeue_dropped, 0);
        assert_eq!(
            queue.payloads("image_generation"),
            vec![serde_json::json!({"textPrompt": "pleated skirt", "itemId": "sk-1"})]
        );
    }
}
