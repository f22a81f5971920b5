use crate::types::{Article, Category};
use crate::utils::text::contains_term;
use crate::utils::url::extract_domain;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use tracing::debug;

const TECHNICAL_TERMS: &[&str] = &[
    "architecture", "implementation", "performance", "benchmark",
    "optimization", "scalability", "infrastructure", "technical",
];

const ENTERPRISE_TERMS: &[&str] = &[
    "enterprise", "business", "production", "deployment", "integration",
    "workflow", "solution", "roi", "cost", "efficiency",
];

const LLM_TERMS: &[&str] = &[
    "llm", "language model", "rag", "retrieval", "augmented", "agent",
    "automation", "embedding", "vector", "semantic", "prompt",
];

const QUALITY_DOMAINS: &[&str] = &[
    "arxiv.org", "github.com", "paperswithcode.com", "huggingface.co",
    "microsoft.com", "google.com", "openai.com",
];

/// Orders one category's articles by importance and keeps the top ones.
/// Scoring is heuristic only; no model call is made here.
#[derive(Debug, Clone)]
pub struct Ranker {
    window: Duration,
    max_per_category: usize,
    recency_weight: f64,
}

impl Ranker {
    pub fn new(window: Duration, max_per_category: usize, recency_weight: f64) -> Self {
        Self {
            window,
            max_per_category,
            recency_weight,
        }
    }

    pub fn within_window(&self, article: &Article, now: DateTime<Utc>) -> bool {
        article.published_at >= now - self.window && article.published_at <= now + Duration::minutes(5)
    }

    /// 1.0 for an article published at `now`, falling linearly to 0.0 at
    /// the edge of the window.
    pub fn freshness(&self, article: &Article, now: DateTime<Utc>) -> f64 {
        let window_secs = self.window.num_seconds().max(1) as f64;
        let age_secs = (now - article.published_at).num_seconds().max(0) as f64;
        (1.0 - age_secs / window_secs).clamp(0.0, 1.0)
    }

    pub fn score(&self, article: &Article, now: DateTime<Utc>) -> f64 {
        heuristic_importance(article) as f64 + self.recency_weight * self.freshness(article, now)
    }

    /// Drops articles outside the window, scores the rest, and returns at
    /// most `max_per_category` ordered by score descending, then newest
    /// first, then article id.
    pub fn rank(&self, category: Category, articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        let total = articles.len();
        let mut scored: Vec<Article> = articles
            .into_iter()
            .filter(|article| self.within_window(article, now))
            .map(|mut article| {
                article.importance = Some(self.score(&article, now));
                article
            })
            .collect();

        scored.sort_by(compare_ranked);
        scored.truncate(self.max_per_category);

        debug!("Ranked {}: kept {} of {}", category, scored.len(), total);
        scored
    }
}

fn compare_ranked(a: &Article, b: &Article) -> Ordering {
    let score_a = a.importance.unwrap_or(0.0);
    let score_b = b.importance.unwrap_or(0.0);
    score_b
        .total_cmp(&score_a)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// 1..=10. Starts neutral at 5 and adds up to 2 points each for technical
/// depth, enterprise applicability and LLM relevance, 1 for a quality source,
/// and up to 2 for keyword density.
pub fn heuristic_importance(article: &Article) -> u32 {
    let text = format!("{} {}", article.title, article.body).to_lowercase();
    let hits = |terms: &[&str]| terms.iter().filter(|t| contains_term(&text, t)).count().min(2) as u32;

    let mut score = 5 + hits(TECHNICAL_TERMS) + hits(ENTERPRISE_TERMS) + hits(LLM_TERMS);

    let domain = extract_domain(&article.url).unwrap_or_default();
    if QUALITY_DOMAINS
        .iter()
        .any(|q| domain == *q || domain.ends_with(&format!(".{}", q)))
    {
        score += 1;
    }

    score += (article.keyword_matches / 2).min(2) as u32;
    score.clamp(1, 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::article_id;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn article(url: &str, hours_old: i64) -> Article {
        Article::new(
            article_id(url),
            "Plain title",
            url,
            "test",
            now() - Duration::hours(hours_old),
            "plain body",
        )
    }

    #[test]
    fn stale_articles_are_excluded() {
        let ranker = Ranker::new(Duration::hours(14), 5, 2.0);
        let ranked = ranker.rank(
            Category::ToolsAndFrameworks,
            vec![article("https://a.example/1", 2), article("https://a.example/2", 30)],
            now(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].url, "https://a.example/1");
        assert!(ranked[0].importance.is_some());
    }

    #[test]
    fn newer_article_wins_on_equal_heuristics() {
        let ranker = Ranker::new(Duration::hours(14), 5, 0.0);
        let ranked = ranker.rank(
            Category::ToolsAndFrameworks,
            vec![article("https://a.example/old", 6), article("https://a.example/new", 1)],
            now(),
        );
        assert_eq!(ranked[0].url, "https://a.example/new");
    }

    #[test]
    fn importance_rewards_depth_and_quality_sources() {
        let mut deep = article("https://github.com/org/repo", 1);
        deep.body = "Production deployment architecture and benchmark for an LLM agent".to_string();
        deep.keyword_matches = 6;
        // 5 + 2 + 2 + 2 + 1 + 2, clamped
        assert_eq!(heuristic_importance(&deep), 10);
        assert_eq!(heuristic_importance(&article("https://a.example/x", 1)), 5);
    }

    #[test]
    fn importance_ignores_terms_inside_other_words() {
        let mut plain = article("https://a.example/y", 1);
        plain.body = "Android storage prices on average; venture capital notes".to_string();
        assert_eq!(heuristic_importance(&plain), 5);
    }
}
