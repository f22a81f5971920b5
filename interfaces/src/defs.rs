use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, SinkError, StoreError};

/// A configured feed: display name plus the URL of its RSS/Atom document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Stable article identifier, derived only from the canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex chars, enough to tell articles apart in logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of digest categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    ToolsAndFrameworks,
    ModelsAndInfrastructure,
    EnterpriseUseCases,
    IndustryAndMarket,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ToolsAndFrameworks,
        Category::ModelsAndInfrastructure,
        Category::EnterpriseUseCases,
        Category::IndustryAndMarket,
    ];

    /// Wire name, as the model is asked to answer it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ToolsAndFrameworks => "TOOLS_AND_FRAMEWORKS",
            Category::ModelsAndInfrastructure => "MODELS_AND_INFRASTRUCTURE",
            Category::EnterpriseUseCases => "ENTERPRISE_USE_CASES",
            Category::IndustryAndMarket => "INDUSTRY_AND_MARKET",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::ToolsAndFrameworks => "Tools & Frameworks",
            Category::ModelsAndInfrastructure => "Models & Infrastructure",
            Category::EnterpriseUseCases => "Enterprise Use Cases",
            Category::IndustryAndMarket => "Industry & Market",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Category::ToolsAndFrameworks => "🛠️",
            Category::ModelsAndInfrastructure => "⚡",
            Category::EnterpriseUseCases => "📈",
            Category::IndustryAndMarket => "📚",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wire: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_uppercase() })
            .collect();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == wire)
            .ok_or_else(|| UnknownCategory(s.trim().to_string()))
    }
}

/// Outcome of asking the model where an article belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Category(Category),
    Irrelevant,
    /// The model answered something outside the closed set; carries the raw answer.
    InvalidResponse(String),
}

/// One article as it moves through a run. Stages fill in `category`,
/// `importance` and `summary` in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub body: String,
    pub keyword_matches: usize,
    pub category: Option<Category>,
    pub importance: Option<f64>,
    pub summary: Option<String>,
}

impl Article {
    pub fn new(
        id: ArticleId,
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            source: source.into(),
            published_at,
            body: body.into(),
            keyword_matches: 0,
            category: None,
            importance: None,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSection {
    pub category: Category,
    pub articles: Vec<Article>,
}

/// The assembled output of one run. Sections follow the configured category
/// order and are never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub date: NaiveDate,
    pub overview: String,
    pub sections: Vec<DigestSection>,
}

impl Digest {
    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.articles.len()).sum()
    }

    pub fn section(&self, category: Category) -> Option<&DigestSection> {
        self.sections.iter().find(|s| s.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Capability to run one prompt against one model.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str, model_id: &str) -> Result<String, ModelError>;
}

/// A cached model response as held by durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub fingerprint: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Durable key-value storage behind the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, fingerprint: &str) -> Result<Option<CachedResponse>, StoreError>;

    /// Persists `payload` under `fingerprint`. An existing entry is left untouched.
    async fn write(&self, fingerprint: &str, payload: &str) -> Result<(), StoreError>;
}

/// Consumer of a finished digest (file writer, mailer, ...).
#[async_trait]
pub trait DigestSink: Send + Sync {
    fn sink_name(&self) -> String;

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError>;
}
