//! Postgres-backed item repository (`clothing_items`).
//!
//! `clothing_items.id` is a `uuid` primary key. Item ids that do not parse as
//! a uuid cannot match any row and are treated like an update that matched
//! nothing.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{instrument, warn};
use uuid::Uuid;

use fitcheck_core::ItemId;

use super::HandlerError;
use super::image_generation::ItemRepository;

#[derive(Debug, Clone)]
pub struct PostgresItemRepository {
    pool: Arc<PgPool>,
}

impl PostgresItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn row_key(item_id: &ItemId) -> Option<Uuid> {
    Uuid::parse_str(item_id.as_str().trim()).ok()
}

#[async_trait]
impl ItemRepository for PostgresItemRepository {
    #[instrument(skip(self, image_url), fields(item_id = %item_id), err)]
    async fn set_image_url(&self, item_id: &ItemId, image_url: &str) -> Result<(), HandlerError> {
        let Some(key) = row_key(item_id) else {
            warn!(item_id = %item_id, "item id is not a uuid; no clothing item to update");
            return Ok(());
        };

        let result = sqlx::query("UPDATE clothing_items SET image_url = $1 WHERE id = $2")
            .bind(image_url)
            .bind(key)
            .execute(&*self.pool)
            .await
            .map_err(|e| HandlerError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            warn!(item_id = %item_id, "no clothing item matched image update");
        }
        Ok(())
    }
}
