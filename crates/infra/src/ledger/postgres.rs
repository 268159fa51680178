//! Postgres-backed rate-limit ledger.
//!
//! Schema (see `migrations/0001_api_rate_limits.sql`):
//!
//! | column | type |
//! |---|---|
//! | `api_name` | `TEXT PRIMARY KEY` |
//! | `window_start` | `TIMESTAMPTZ` |
//! | `request_count` | `INTEGER >= 0` |
//! | `last_updated` | `TIMESTAMPTZ` |
//!
//! `upsert` is a plain `INSERT ... ON CONFLICT DO UPDATE`: no compare-and-swap,
//! so two processors racing on the same row both win and the later write sticks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use fitcheck_core::RateLimitWindow;

use super::{RateLimitStore, RateLimitStoreError};

#[derive(Debug, Clone)]
pub struct PostgresRateLimitStore {
    pool: Arc<PgPool>,
}

impl PostgresRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimitStore {
    #[instrument(skip(self), err)]
    async fn get(&self, api_name: &str) -> Result<Option<RateLimitWindow>, RateLimitStoreError> {
        let row = sqlx::query(
            r#"
            SELECT api_name, window_start, request_count, last_updated
            FROM api_rate_limits
            WHERE api_name = $1
            "#,
        )
        .bind(api_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| RateLimitStoreError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let read = |e: sqlx::Error| RateLimitStoreError::Corrupt(e.to_string());
        let request_count: i32 = row.try_get("request_count").map_err(read)?;
        let request_count = u32::try_from(request_count)
            .map_err(|_| RateLimitStoreError::Corrupt(format!("negative request_count {request_count}")))?;

        Ok(Some(RateLimitWindow {
            api_name: row.try_get("api_name").map_err(read)?,
            window_start: row.try_get::<DateTime<Utc>, _>("window_start").map_err(read)?,
            request_count,
            last_updated: row.try_get::<DateTime<Utc>, _>("last_updated").map_err(read)?,
        }))
    }

    #[instrument(
        skip(self, window),
        fields(api_name = %window.api_name, request_count = window.request_count),
        err
    )]
    async fn upsert(&self, window: &RateLimitWindow) -> Result<(), RateLimitStoreError> {
        let request_count = i32::try_from(window.request_count)
            .map_err(|_| RateLimitStoreError::Storage("request_count out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO api_rate_limits (api_name, window_start, request_count, last_updated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (api_name)
            DO UPDATE SET
                window_start = EXCLUDED.window_start,
                request_count = EXCLUDED.request_count,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&window.api_name)
        .bind(window.window_start)
        .bind(request_count)
        .bind(window.last_updated)
        .execute(&*self.pool)
        .await
        .map_err(|e| RateLimitStoreError::Storage(e.to_string()))?;

        Ok(())
    }
}
