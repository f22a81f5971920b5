//! Two-phase relevance gate: a free keyword check, then a cached model call
//! that assigns exactly one category.

use crate::cache::CacheError;
use crate::config::TaxonomyConfig;
use crate::context::RunContext;
use crate::fingerprint::Fingerprint;
use crate::prompts;
use crate::types::{Article, Category, Classification, ModelError, ModelInvoker, StoreError};
use crate::utils::text::contains_term;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts taxonomy keywords in title + body and url patterns in the URL.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    url_patterns: Vec<String>,
}

impl KeywordFilter {
    pub fn new(taxonomy: &TaxonomyConfig) -> Self {
        let collect = |pick: fn(&crate::config::CategoryRule) -> &Vec<String>| {
            taxonomy
                .categories
                .iter()
                .flat_map(|rule| pick(rule).iter())
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
        };

        Self {
            keywords: collect(|rule| &rule.keywords),
            url_patterns: collect(|rule| &rule.url_patterns),
        }
    }

    pub fn matches(&self, article: &Article) -> usize {
        if article.title.trim().is_empty() && article.body.trim().is_empty() {
            return 0;
        }
        let text = format!("{} {}", article.title, article.body).to_lowercase();
        let url = article.url.to_lowercase();

        let keyword_hits = self.keywords.iter().filter(|k| contains_term(&text, k)).count();
        let url_hits = self.url_patterns.iter().filter(|p| url.contains(p.as_str())).count();
        keyword_hits + url_hits
    }
}

/// What the gate decided for one article.
#[derive(Debug)]
pub enum Verdict {
    /// `article.category` is set.
    Categorized(Article),
    KeywordRejected(Article),
    Irrelevant(Article),
    /// The model answered outside the configured categories.
    Invalid { article: Article, answer: String },
    /// The model call failed after retries; nothing was cached.
    Failed { article: Article, error: ModelError },
}

pub struct Categorizer {
    keywords: KeywordFilter,
    cache: Arc<crate::cache::ResponseCache>,
    model: Arc<dyn ModelInvoker>,
    model_id: String,
    taxonomy_version: String,
    categories: Vec<Category>,
    max_chars: usize,
}

impl Categorizer {
    pub fn new(ctx: &RunContext) -> Self {
        let config = &ctx.config;
        Self {
            keywords: KeywordFilter::new(&config.taxonomy),
            cache: ctx.cache.clone(),
            model: ctx.model.clone(),
            model_id: config.models.categorization.clone(),
            taxonomy_version: config.taxonomy.version.clone(),
            categories: config.category_order(),
            max_chars: config.categorize_max_chars,
        }
    }

    pub fn keyword_filter(&self) -> &KeywordFilter {
        &self.keywords
    }

    /// Runs both phases. Only a failing cache store is an error; every
    /// per-article outcome is a [`Verdict`].
    pub async fn process(&self, mut article: Article) -> Result<Verdict, StoreError> {
        article.keyword_matches = self.keywords.matches(&article);
        if article.keyword_matches == 0 {
            debug!("No keyword match, skipping model: {}", article.title);
            return Ok(Verdict::KeywordRejected(article));
        }

        let body = prompts::bounded_body(&article.body, self.max_chars);
        let fingerprint = Fingerprint::builder(prompts::CATEGORIZE_TEMPLATE, &self.model_id)
            .tag(&self.taxonomy_version)
            .content(&article.title)
            .content(&body)
            .finish();
        let prompt = prompts::categorize(&article.title, &body, &self.categories);

        let answer = self
            .cache
            .get_or_compute(&fingerprint, || self.model.invoke(&prompt, &self.model_id))
            .await;

        let answer = match answer {
            Ok(answer) => answer,
            Err(CacheError::Store(e)) => return Err(e),
            Err(CacheError::Compute(error)) => {
                warn!("Categorization failed for {}: {}", article.title, error);
                return Ok(Verdict::Failed { article, error });
            }
        };

        Ok(match prompts::parse_classification(&answer, &self.categories) {
            Classification::Category(category) => {
                debug!("{} -> {}", article.title, category);
                article.category = Some(category);
                Verdict::Categorized(article)
            }
            Classification::Irrelevant => {
                debug!("Model marked irrelevant: {}", article.title);
                Verdict::Irrelevant(article)
            }
            Classification::InvalidResponse(answer) => {
                warn!("Invalid category for {}: {:?}", article.title, answer);
                Verdict::Invalid { article, answer }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DigestConfig;
    use chrono::Utc;

    fn article(title: &str, body: &str, url: &str) -> Article {
        Article::new(
            crate::fingerprint::article_id(url),
            title,
            url,
            "test",
            Utc::now(),
            body,
        )
    }

    #[test]
    fn counts_keywords_and_url_patterns() {
        let filter = KeywordFilter::new(&DigestConfig::default().taxonomy);

        let bakery = article("Local bakery opens", "Fresh bread on Main Street.", "https://town.example/bakery");
        assert_eq!(filter.matches(&bakery), 0);

        let langchain = article(
            "LangChain 0.1.0 Released",
            "The framework ships a stable API.",
            "https://blog.langchain.dev/langchain-v0-1-0/",
        );
        // langchain, framework, api + url pattern langchain.dev
        assert_eq!(filter.matches(&langchain), 4);
    }

    #[test]
    fn keywords_inside_other_words_do_not_count() {
        let filter = KeywordFilter::new(&DigestConfig::default().taxonomy);
        let noise = article("Android storage update", "Raising capital downtown.", "https://town.example/n");
        assert_eq!(filter.matches(&noise), 0);
    }

    #[test]
    fn empty_article_never_matches() {
        let filter = KeywordFilter::new(&DigestConfig::default().taxonomy);
        assert_eq!(filter.matches(&article("  ", "", "https://github.com/x")), 0);
    }
}
