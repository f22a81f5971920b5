mod common;

use async_trait::async_trait;
use common::*;
use rss_digest::assemble::EMPTY_OVERVIEW;
use rss_digest::report::Stage;
use rss_digest::types::{CacheStore, CachedResponse, Category, DigestError, ModelError, StoreError};
use rss_digest::{Categorizer, DigestPipeline, MockModel, Ranker, ResponseCache, Summarizer, Verdict};
use std::sync::Arc;

#[tokio::test]
async fn three_article_scenario_yields_one_tools_article() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(scenario_model());
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let outcome = pipeline.run_articles(scenario_articles()).await.unwrap();
    let digest = &outcome.digest;

    assert_eq!(digest.sections.len(), 1);
    let section = &digest.sections[0];
    assert_eq!(section.category, Category::ToolsAndFrameworks);
    assert_eq!(section.articles.len(), 1);
    assert_eq!(section.articles[0].title, "LangChain 0.1.0 Released");
    assert_eq!(
        section.articles[0].summary.as_deref(),
        Some("LangChain 0.1.0 is the first stable release.")
    );
    assert!(section.articles[0].importance.is_some());
    assert_eq!(digest.overview, "Today's news centered on LangChain's first stable release.");

    // One categorization, one summary, one overview
    assert_eq!(model.call_count(), 3);
    assert_eq!(model.calls_for(CATEGORIZE_MODEL), 1);
    assert_eq!(model.calls_for(SUMMARY_MODEL), 1);
    assert_eq!(model.calls_for(OVERVIEW_MODEL), 1);

    let stats = outcome.report.stats;
    assert_eq!(stats.fetched, 3);
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.keyword_rejected, 1);
    assert_eq!(stats.categorized, 1);
    assert_eq!(stats.included, 1);
    assert!(outcome.report.omissions.is_empty());
    assert!(outcome.report.overview_fallback.is_none());
}

#[tokio::test]
async fn second_run_is_served_from_the_store() {
    let (store, cache) = memory_cache();
    let model = Arc::new(scenario_model());

    let first = DigestPipeline::new(context(test_config(), cache, model.clone()))
        .run_articles(scenario_articles())
        .await
        .unwrap();
    assert_eq!(model.call_count(), 3);

    // A fresh cache over the same store stands in for the next process
    let cache = Arc::new(ResponseCache::new(store.clone()));
    let second = DigestPipeline::new(context(test_config(), cache, model.clone()))
        .run_articles(scenario_articles())
        .await
        .unwrap();

    assert_eq!(model.call_count(), 3);
    assert_eq!(second.digest, first.digest);
    assert_eq!(second.report.cache.hits, 3);
    assert_eq!(second.report.cache.misses, 0);
}

#[tokio::test]
async fn articles_without_keywords_never_reach_the_model() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(scenario_model());
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let articles = vec![
        article("Local bakery opens", "https://town.example/1", "Fresh bread.", 1),
        article("Marathon route announced", "https://town.example/2", "Roads close Sunday.", 2),
        article("", "https://town.example/3", "", 1),
    ];
    let outcome = pipeline.run_articles(articles).await.unwrap();

    assert_eq!(model.call_count(), 0);
    assert!(outcome.digest.is_empty());
    assert_eq!(outcome.digest.overview, EMPTY_OVERVIEW);
    assert_eq!(outcome.report.stats.keyword_rejected, 3);
}

#[tokio::test]
async fn invalid_category_is_dropped_and_reported() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(
        MockModel::new()
            .respond(CATEGORIZE_MODEL, r#"{"category": "SPORTS", "justification": "?"}"#)
            .respond(SUMMARY_MODEL, "unused")
            .respond(OVERVIEW_MODEL, "unused"),
    );
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let outcome = pipeline.run_articles(scenario_articles()).await.unwrap();

    assert!(outcome.digest.is_empty());
    assert_eq!(outcome.report.omissions.len(), 1);
    let omission = &outcome.report.omissions[0];
    assert_eq!(omission.stage, Stage::Categorize);
    assert_eq!(omission.title, "LangChain 0.1.0 Released");
    assert!(omission.reason.contains("SPORTS"));
    assert_eq!(model.calls_for(SUMMARY_MODEL), 0);
}

#[tokio::test]
async fn irrelevant_answer_drops_the_article() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(MockModel::new().respond(CATEGORIZE_MODEL, "IRRELEVANT"));
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let outcome = pipeline.run_articles(scenario_articles()).await.unwrap();

    assert!(outcome.digest.is_empty());
    assert_eq!(outcome.report.stats.irrelevant, 1);
    assert!(outcome.report.omissions.is_empty());
}

#[tokio::test]
async fn one_failed_summary_does_not_sink_the_batch() {
    let (store, cache) = memory_cache();
    let model = Arc::new(
        MockModel::new()
            .respond(CATEGORIZE_MODEL, TOOLS_ANSWER)
            .respond(SUMMARY_MODEL, "A useful summary.")
            .fail_when(SUMMARY_MODEL, "Broken", ModelError::Permanent("400 bad request".into()))
            .respond(OVERVIEW_MODEL, "Overview."),
    );
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let articles = vec![
        article("Agent SDK ships", "https://tools.example/good", "A new agent framework.", 1),
        article("Broken framework post", "https://tools.example/bad", "Another agent framework.", 2),
    ];
    let outcome = pipeline.run_articles(articles).await.unwrap();

    assert_eq!(outcome.digest.article_count(), 1);
    assert_eq!(outcome.digest.sections[0].articles[0].title, "Agent SDK ships");
    assert_eq!(outcome.report.omissions.len(), 1);
    assert_eq!(outcome.report.omissions[0].stage, Stage::Summarize);

    // Categorize x2, summarize x2, overview x1; the failed summary is not stored
    assert_eq!(model.call_count(), 5);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn overview_failure_falls_back_to_plain_text() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(
        MockModel::new()
            .respond(CATEGORIZE_MODEL, TOOLS_ANSWER)
            .respond(SUMMARY_MODEL, "Summary.")
            .fail_when(OVERVIEW_MODEL, "Articles", ModelError::Permanent("context too long".into())),
    );
    let pipeline = DigestPipeline::new(context(test_config(), cache, model));

    let outcome = pipeline.run_articles(scenario_articles()).await.unwrap();

    assert_eq!(outcome.digest.article_count(), 1);
    assert_eq!(
        outcome.digest.overview,
        "Today's digest covers 1 articles across Tools & Frameworks."
    );
    assert!(outcome.report.overview_fallback.is_some());
}

#[tokio::test]
async fn sections_are_truncated_and_ordered() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(
        MockModel::new()
            .respond(CATEGORIZE_MODEL, TOOLS_ANSWER)
            .respond_when(CATEGORIZE_MODEL, "funding", r#"{"category": "INDUSTRY_AND_MARKET"}"#)
            .respond(SUMMARY_MODEL, "Summary.")
            .respond(OVERVIEW_MODEL, "Overview."),
    );
    let mut config = test_config();
    config.max_per_category = 2;
    let pipeline = DigestPipeline::new(context(config, cache, model));

    let mut articles: Vec<_> = (1..=4)
        .map(|n| {
            article(
                &format!("Agent SDK release {}", n),
                &format!("https://tools.example/{}", n),
                "An agent framework update.",
                n,
            )
        })
        .collect();
    // Market article listed first; tools still comes first in the digest
    articles.insert(
        0,
        article("Startup closes funding round", "https://market.example/a", "Seed funding for a startup.", 1),
    );

    let outcome = pipeline.run_articles(articles).await.unwrap();
    let digest = &outcome.digest;

    let order: Vec<Category> = digest.sections.iter().map(|s| s.category).collect();
    assert_eq!(order, vec![Category::ToolsAndFrameworks, Category::IndustryAndMarket]);

    let tools: Vec<&str> = digest.sections[0].articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(tools, vec!["Agent SDK release 1", "Agent SDK release 2"]);
    assert_eq!(outcome.report.stats.truncated, 2);
    assert!(digest.sections.iter().all(|s| s.articles.len() <= 2));
}

#[tokio::test]
async fn taxonomy_version_is_part_of_the_cache_key() {
    let (store, cache) = memory_cache();
    let model = Arc::new(scenario_model());

    DigestPipeline::new(context(test_config(), cache.clone(), model.clone()))
        .run_articles(scenario_articles())
        .await
        .unwrap();

    let mut config = test_config();
    config.taxonomy.version = "2024-07".to_string();
    let cache = Arc::new(ResponseCache::new(store));
    DigestPipeline::new(context(config, cache, model.clone()))
        .run_articles(scenario_articles())
        .await
        .unwrap();

    assert_eq!(model.calls_for(CATEGORIZE_MODEL), 2);
    assert_eq!(model.calls_for(SUMMARY_MODEL), 1);
}

#[test]
fn ranking_is_idempotent() {
    let ranker = Ranker::new(chrono::Duration::hours(14), 3, 2.0);
    let articles: Vec<_> = [("a", 1), ("b", 1), ("c", 5), ("d", 2), ("e", 13)]
        .iter()
        .map(|(slug, hours)| {
            article(
                "Same title",
                &format!("https://tools.example/{}", slug),
                "agent framework",
                *hours,
            )
        })
        .collect();

    let first = ranker.rank(Category::ToolsAndFrameworks, articles.clone(), now());
    let mut reversed = articles;
    reversed.reverse();
    let second = ranker.rank(Category::ToolsAndFrameworks, reversed, now());

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    // Equal scores and timestamps fall back to article id order
    assert!(first[0].id < first[1].id);
}

struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn read(&self, _fingerprint: &str) -> Result<Option<CachedResponse>, StoreError> {
        Err(StoreError::new("disk full"))
    }

    async fn write(&self, _fingerprint: &str, _payload: &str) -> Result<(), StoreError> {
        Err(StoreError::new("disk full"))
    }
}

#[tokio::test]
async fn unavailable_store_aborts_the_run() {
    let cache = Arc::new(ResponseCache::new(Arc::new(UnavailableStore)));
    let model = Arc::new(scenario_model());
    let pipeline = DigestPipeline::new(context(test_config(), cache, model.clone()));

    let result = pipeline.run_articles(scenario_articles()).await;

    assert!(matches!(result, Err(DigestError::CacheStorage(_))));
    assert_eq!(model.call_count(), 0);
}

fn long_body(separator: &str, tail: &str) -> String {
    let words: Vec<String> = (0..800).map(|n| format!("agent{}", n)).collect();
    format!("agent framework {} {}", words.join(separator), tail)
}

#[tokio::test]
async fn whitespace_variants_of_a_long_body_share_one_summary() {
    let (store, cache) = memory_cache();
    let model = Arc::new(MockModel::new().respond(SUMMARY_MODEL, "One summary."));
    let summarizer = Summarizer::new(&context(test_config(), cache, model.clone()));

    let spaced = article("Agent SDK ships", "https://tools.example/a", &long_body(" ", ""), 1);
    let loose = article("Agent SDK ships", "https://tools.example/b", &long_body("  \n\t", ""), 1);

    assert_eq!(summarizer.summarize(&spaced).await.unwrap(), "One summary.");
    assert_eq!(summarizer.summarize(&loose).await.unwrap(), "One summary.");
    assert_eq!(model.call_count(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn content_past_the_categorize_limit_does_not_change_the_key() {
    let (_store, cache) = memory_cache();
    let model = Arc::new(MockModel::new().respond(CATEGORIZE_MODEL, TOOLS_ANSWER));
    let categorizer = Categorizer::new(&context(test_config(), cache, model.clone()));

    let first = article("Agent SDK ships", "https://tools.example/c", &long_body(" ", "first ending"), 1);
    let second = article("Agent SDK ships", "https://tools.example/d", &long_body("   ", "other ending"), 1);

    for candidate in [first, second] {
        assert!(matches!(
            categorizer.process(candidate).await.unwrap(),
            Verdict::Categorized(_)
        ));
    }
    assert_eq!(model.call_count(), 1);
}
