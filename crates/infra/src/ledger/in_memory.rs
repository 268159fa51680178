//! In-memory ledger for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use fitcheck_core::RateLimitWindow;

use super::{RateLimitStore, RateLimitStoreError};

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    rows: RwLock<HashMap<String, RateLimitWindow>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly (e.g. to simulate another processor's reservation).
    pub fn insert(&self, window: RateLimitWindow) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.insert(window.api_name.clone(), window);
    }

    pub fn snapshot(&self, api_name: &str) -> Option<RateLimitWindow> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.get(api_name).cloned()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, api_name: &str) -> Result<Option<RateLimitWindow>, RateLimitStoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| RateLimitStoreError::Storage("ledger lock poisoned".to_string()))?;
        Ok(rows.get(api_name).cloned())
    }

    async fn upsert(&self, window: &RateLimitWindow) -> Result<(), RateLimitStoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| RateLimitStoreError::Storage("ledger lock poisoned".to_string()))?;
        rows.insert(window.api_name.clone(), window.clone());
        Ok(())
    }
}
