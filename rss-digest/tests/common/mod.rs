#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rss_digest::{article_id, Article, DigestConfig, MemoryCacheStore, MockModel, ResponseCache, RunContext};
use std::sync::Arc;

pub const CATEGORIZE_MODEL: &str = "cat-model";
pub const SUMMARY_MODEL: &str = "sum-model";
pub const OVERVIEW_MODEL: &str = "overview-model";

pub const TOOLS_ANSWER: &str = r#"{"category": "TOOLS_AND_FRAMEWORKS", "justification": "framework release"}"#;
pub const MODELS_ANSWER: &str = r#"{"category": "MODELS_AND_INFRASTRUCTURE", "justification": "new model"}"#;

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn test_config() -> DigestConfig {
    let mut config = DigestConfig::default();
    config.feeds.clear();
    config.models.categorization = CATEGORIZE_MODEL.to_string();
    config.models.summarization = SUMMARY_MODEL.to_string();
    config.models.overview = OVERVIEW_MODEL.to_string();
    config
}

pub fn article(title: &str, url: &str, body: &str, hours_old: i64) -> Article {
    Article::new(
        article_id(url),
        title,
        url,
        "Test Feed",
        now() - Duration::hours(hours_old),
        body,
    )
}

pub fn context(config: DigestConfig, cache: Arc<ResponseCache>, model: Arc<MockModel>) -> RunContext {
    RunContext::new(Arc::new(config), cache, model, now())
}

pub fn memory_cache() -> (Arc<MemoryCacheStore>, Arc<ResponseCache>) {
    let store = Arc::new(MemoryCacheStore::new());
    let cache = Arc::new(ResponseCache::new(store.clone()));
    (store, cache)
}

/// The three-article scenario: one with no keywords, one fresh tools
/// article and one stale models article.
pub fn scenario_articles() -> Vec<Article> {
    vec![
        article(
            "Local bakery opens",
            "https://town.example/news/bakery",
            "Fresh sourdough every morning on Main Street.",
            2,
        ),
        article(
            "LangChain 0.1.0 Released",
            "https://blog.langchain.dev/langchain-v0-1-0/",
            "The first stable release of the framework.",
            3,
        ),
        article(
            "New GPT model sets training records",
            "https://openai.com/blog/new-model",
            "A language model trained on new infrastructure.",
            48,
        ),
    ]
}

pub fn scenario_model() -> MockModel {
    MockModel::new()
        .respond(CATEGORIZE_MODEL, MODELS_ANSWER)
        .respond_when(CATEGORIZE_MODEL, "LangChain", TOOLS_ANSWER)
        .respond(SUMMARY_MODEL, "LangChain 0.1.0 is the first stable release.")
        .respond(OVERVIEW_MODEL, "Today's news centered on LangChain's first stable release.")
}
