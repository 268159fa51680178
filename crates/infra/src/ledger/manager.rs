//! Rate-limit window manager: reads capacity and records reservations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use fitcheck_core::{Capacity, RateLimitPolicy, RateLimitWindow, ReservationOutcome};

use super::{RateLimitStore, RateLimitStoreError};

/// Decides how many jobs may be dispatched and durably records that decision.
#[derive(Clone)]
pub struct RateLimitWindowManager {
    store: Arc<dyn RateLimitStore>,
}

impl std::fmt::Debug for RateLimitWindowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitWindowManager").finish_non_exhaustive()
    }
}

impl RateLimitWindowManager {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Remaining capacity for `api_name` in the current window.
    pub async fn current_capacity(
        &self,
        api_name: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Capacity, RateLimitStoreError> {
        self.current_capacity_at(api_name, policy, Utc::now()).await
    }

    pub async fn current_capacity_at(
        &self,
        api_name: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<Capacity, RateLimitStoreError> {
        let row = self.store.get(api_name).await?;
        let capacity = policy.capacity_at(row.as_ref(), now);
        debug!(
            api_name,
            available = capacity.available,
            used = capacity.used,
            window_reset = capacity.window_reset,
            "rate limit capacity"
        );
        Ok(capacity)
    }

    /// Record `new_count` requests in the window starting at `window_start`.
    ///
    /// A failed write is reported as `success: false`; the caller must not
    /// dispatch anything for this reservation.
    pub async fn reserve(
        &self,
        api_name: &str,
        window_start: DateTime<Utc>,
        new_count: u32,
    ) -> ReservationOutcome {
        let window = RateLimitWindow::new(api_name, window_start, new_count, Utc::now());
        let success = match self.store.upsert(&window).await {
            Ok(()) => true,
            Err(e) => {
                error!(api_name, new_count, error = %e, "failed to record rate limit reservation");
                false
            }
        };

        ReservationOutcome {
            reserved_count: new_count,
            new_window_start: window_start,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryRateLimitStore;
    use std::time::Duration;

    const API: &str = "openai_image_generation";

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy::new(5, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn reserve_then_read_reduces_capacity() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let manager = RateLimitWindowManager::new(store.clone());

        let cap = manager.current_capacity(API, &policy()).await.unwrap();
        assert_eq!(cap.available, 5);

        let outcome = manager.reserve(API, cap.window_start, cap.count_after(3)).await;
        assert!(outcome.success);
        assert_eq!(outcome.reserved_count, 3);

        let row = store.snapshot(API).unwrap();
        assert_eq!(row.request_count, 3);
        assert_eq!(row.window_start, cap.window_start);

        let cap = manager.current_capacity(API, &policy()).await.unwrap();
        assert_eq!(cap.available, 2);
        assert!(!cap.window_reset);
    }

    #[tokio::test]
    async fn expired_row_rolls_window_forward() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let start = Utc::now() - chrono::Duration::seconds(61);
        store.insert(RateLimitWindow::new(API, start, 5, start));

        let manager = RateLimitWindowManager::new(store);
        let now = Utc::now();
        let cap = manager.current_capacity_at(API, &policy(), now).await.unwrap();

        assert_eq!(cap.available, 5);
        assert_eq!(cap.window_start, now);
    }
}
