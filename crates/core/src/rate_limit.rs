//! Fixed-window rate limiting.
//!
//! A single [`RateLimitWindow`] row per external API records how many requests
//! were reserved since `window_start`. Capacity is derived from that row and a
//! [`RateLimitPolicy`]; the window rolls forward logically once it has expired,
//! the row itself is never deleted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limit of `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Whether a window that started at `window_start` is over at `now`.
    ///
    /// A window too long to represent never expires.
    pub fn is_expired(&self, window_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| window_start.checked_add_signed(window))
            .is_some_and(|window_end| now >= window_end)
    }

    /// Remaining capacity at `now` given the stored ledger row (if any).
    ///
    /// An exhausted window that has not expired yields zero capacity and keeps
    /// its original start; it is never reset early.
    pub fn capacity_at(&self, row: Option<&RateLimitWindow>, now: DateTime<Utc>) -> Capacity {
        match row {
            Some(row) if !self.is_expired(row.window_start, now) => {
                let used = row.request_count;
                Capacity {
                    available: self.limit.saturating_sub(used),
                    used,
                    window_start: row.window_start,
                    window_reset: false,
                }
            }
            _ => Capacity {
                available: self.limit,
                used: 0,
                window_start: now,
                window_reset: true,
            },
        }
    }
}

/// Ledger row for one external API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub api_name: String,
    pub window_start: DateTime<Utc>,
    pub request_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl RateLimitWindow {
    pub fn new(
        api_name: impl Into<String>,
        window_start: DateTime<Utc>,
        request_count: u32,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            api_name: api_name.into(),
            window_start,
            request_count,
            last_updated,
        }
    }
}

/// Capacity left in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    /// Requests that may still be dispatched in this window.
    pub available: u32,
    /// Requests already reserved in this window.
    pub used: u32,
    pub window_start: DateTime<Utc>,
    /// True when no row existed or the stored window had expired.
    pub window_reset: bool,
}

impl Capacity {
    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }

    /// The `request_count` to persist after dispatching `drained` more jobs.
    pub fn count_after(&self, drained: u32) -> u32 {
        self.used.saturating_add(drained)
    }
}

/// Result of recording a reservation in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservationOutcome {
    pub reserved_count: u32,
    pub new_window_start: DateTime<Utc>,
    pub success: bool,
}
