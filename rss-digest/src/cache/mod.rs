//! Content-addressed memo of model responses.
//!
//! `ResponseCache` sits in front of a durable [`CacheStore`] and guarantees at
//! most one computation per fingerprint: across runs through the store, and
//! within a process through a single-flight map of `OnceCell`s. A second
//! caller that arrives while the first is still computing waits on the same
//! cell instead of issuing its own model call, and shares its outcome, error
//! included. The map only holds flights that are still pending; a settled
//! value is served from the store afterwards.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::fingerprint::Fingerprint;
use crate::types::{CacheStore, ModelError, StoreError};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The computation failed; nothing was written.
    #[error(transparent)]
    Compute(#[from] ModelError),

    /// The backing store failed. Fatal for the run.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's in-flight computation.
    pub in_flight_joins: u64,
    pub estimated_savings: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type Flight = Arc<OnceCell<Result<String, CacheError>>>;

pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    cells: Mutex<HashMap<Fingerprint, Flight>>,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    cost_per_call: f64,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_cost_per_call(store, 0.0)
    }

    pub fn with_cost_per_call(store: Arc<dyn CacheStore>, cost_per_call: f64) -> Self {
        Self {
            store,
            cells: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            cost_per_call,
        }
    }

    /// Returns the response stored under `fingerprint`, computing and
    /// persisting it first when absent.
    ///
    /// `compute` runs at most once per fingerprint while a result is pending
    /// or stored. Callers that joined a failing flight get its error without
    /// computing again; nothing is persisted and the next call starts over.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        compute: F,
    ) -> Result<String, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ModelError>>,
    {
        let flight = self.flight_for(fingerprint);

        let mut ran_init = false;
        let outcome = flight
            .get_or_init(|| {
                ran_init = true;
                self.load_or_compute(fingerprint, compute)
            })
            .await
            .clone();

        if ran_init {
            self.land(fingerprint, &flight);
        } else {
            // Someone else's flight settled while we waited
            self.joins.fetch_add(1, Ordering::Relaxed);
            if outcome.is_ok() {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            in_flight_joins: self.joins.load(Ordering::Relaxed),
            estimated_savings: hits as f64 * self.cost_per_call,
        }
    }

    /// Number of flights still pending.
    pub fn in_flight(&self) -> usize {
        self.lock_cells().len()
    }

    fn flight_for(&self, fingerprint: &Fingerprint) -> Flight {
        self.lock_cells()
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drops a settled flight. Waiters keep their own handle; later callers
    /// read the store or, after a failure, compute again.
    fn land(&self, fingerprint: &Fingerprint, flight: &Flight) {
        let mut cells = self.lock_cells();
        if cells.get(fingerprint).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            cells.remove(fingerprint);
        }
    }

    fn lock_cells(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, Flight>> {
        match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn load_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        compute: F,
    ) -> Result<String, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ModelError>>,
    {
        if let Some(entry) = self.store.read(fingerprint.as_str()).await? {
            debug!("Cache hit for {}", short(fingerprint));
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.payload);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}, computing", short(fingerprint));

        let value = compute().await.map_err(|e| {
            warn!("Computation for {} failed, not cached: {}", short(fingerprint), e);
            CacheError::Compute(e)
        })?;

        self.store.write(fingerprint.as_str(), &value).await?;
        Ok(value)
    }
}

fn short(fingerprint: &Fingerprint) -> &str {
    let s = fingerprint.as_str();
    &s[..s.len().min(12)]
}
