use crate::cache::CacheStats;
use crate::fetcher::FeedFailure;
use crate::types::{Article, ArticleId};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Categorize,
    Summarize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Categorize => f.write_str("categorize"),
            Stage::Summarize => f.write_str("summarize"),
        }
    }
}

/// An article that would have been eligible but was dropped by a failure.
#[derive(Debug, Clone, Serialize)]
pub struct Omission {
    pub article_id: ArticleId,
    pub title: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub fetched: usize,
    /// Outside the freshness window; never sent to a model.
    pub stale: usize,
    pub keyword_rejected: usize,
    pub irrelevant: usize,
    pub categorized: usize,
    /// Cut by the per-category limit.
    pub truncated: usize,
    pub summarized: usize,
    pub included: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: RunStats,
    pub omissions: Vec<Omission>,
    pub feed_failures: Vec<FeedFailure>,
    /// Error text when the overview fell back to the plain one.
    pub overview_fallback: Option<String>,
    pub cache: CacheStats,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stats: RunStats::default(),
            omissions: Vec::new(),
            feed_failures: Vec::new(),
            overview_fallback: None,
            cache: CacheStats::default(),
        }
    }

    pub fn omit(&mut self, article: &Article, stage: Stage, reason: impl Into<String>) {
        self.omissions.push(Omission {
            article_id: article.id.clone(),
            title: article.title.clone(),
            stage,
            reason: reason.into(),
        });
    }

    pub fn log_summary(&self) {
        let s = &self.stats;
        info!(
            run_id = %self.run_id,
            "Run finished: fetched={} stale={} keyword_rejected={} irrelevant={} categorized={} truncated={} summarized={} included={}",
            s.fetched, s.stale, s.keyword_rejected, s.irrelevant, s.categorized, s.truncated, s.summarized, s.included
        );
        info!(
            "Cache: {} hits, {} misses, {} joined in flight, {:.1}% hit rate, ~${:.2} saved",
            self.cache.hits,
            self.cache.misses,
            self.cache.in_flight_joins,
            self.cache.hit_rate() * 100.0,
            self.cache.estimated_savings
        );
        for omission in &self.omissions {
            warn!(
                "Omitted at {}: {} ({}): {}",
                omission.stage,
                omission.title,
                omission.article_id.short(),
                omission.reason
            );
        }
        for failure in &self.feed_failures {
            warn!("Feed failed: {} ({}): {}", failure.source, failure.url, failure.error);
        }
    }
}
