use crate::cache::ResponseCache;
use crate::config::DigestConfig;
use crate::types::ModelInvoker;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage needs for one run. Built once by the caller and
/// handed to each stage; no stage reaches for global state.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub date: NaiveDate,
    /// Reference instant for freshness. Fixed for the whole run.
    pub now: DateTime<Utc>,
    pub config: Arc<DigestConfig>,
    pub cache: Arc<ResponseCache>,
    pub model: Arc<dyn ModelInvoker>,
}

impl RunContext {
    pub fn new(
        config: Arc<DigestConfig>,
        cache: Arc<ResponseCache>,
        model: Arc<dyn ModelInvoker>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            date: now.date_naive(),
            now,
            config,
            cache,
            model,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }
}
