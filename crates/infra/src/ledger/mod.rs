//! Rate-limit ledger: persisted fixed-window counters keyed by API name.
//!
//! The ledger is a cooperative limiter shared by every processor instance. It
//! is read once and upserted once per `run_once`; concurrent processors are not
//! serialized against each other (last writer wins).

pub mod in_memory;
pub mod manager;
pub mod postgres;

use async_trait::async_trait;
use fitcheck_core::RateLimitWindow;

pub use in_memory::InMemoryRateLimitStore;
pub use manager::RateLimitWindowManager;
pub use postgres::PostgresRateLimitStore;

/// Rate-limit ledger store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Persistence for [`RateLimitWindow`] rows.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Load the row for `api_name`, if one was ever written.
    async fn get(&self, api_name: &str) -> Result<Option<RateLimitWindow>, RateLimitStoreError>;

    /// Insert or replace the row for `window.api_name`.
    async fn upsert(&self, window: &RateLimitWindow) -> Result<(), RateLimitStoreError>;
}
