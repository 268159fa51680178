//! Infrastructure layer: rate-limit ledger, durable queue, job handlers and the
//! queue processor that ties them together.

pub mod config;
pub mod handler;
pub mod ledger;
pub mod processor;
pub mod queue;
pub mod worker;

pub use config::{ConfigError, ProcessorConfig};
pub use processor::{
    BatchHandle, BatchSummary, DispatchedJob, JobDisposition, ProcessorStats, QueueProcessor, RunReport,
    StatsSnapshot,
};
pub use worker::{ProcessorWorker, WorkerHandle};
