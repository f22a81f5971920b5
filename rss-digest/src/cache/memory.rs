use crate::types::{CacheStore, CachedResponse, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local store. Nothing survives a restart; meant for tests and
/// `--dry-run` style invocations.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self, fingerprint: &str) -> Result<Option<CachedResponse>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::new("memory cache lock poisoned"))?;
        Ok(entries.get(fingerprint).cloned())
    }

    async fn write(&self, fingerprint: &str, payload: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::new("memory cache lock poisoned"))?;
        entries
            .entry(fingerprint.to_string())
            .or_insert_with(|| CachedResponse {
                fingerprint: fingerprint.to_string(),
                payload: payload.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }
}
