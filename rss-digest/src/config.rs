//! Run configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file is
//! enough. Secrets are never read from the file, only the names of the
//! environment variables that hold them.

use crate::types::{Category, DigestError, FeedSource, FetchConfig, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub feeds: Vec<FeedSource>,
    /// Articles older than this many hours are never considered.
    pub time_window_hours: u32,
    pub max_per_category: usize,
    /// Upper bound on concurrent model calls within a stage.
    pub concurrency: usize,
    pub categorize_max_chars: usize,
    pub summary_max_chars: usize,
    pub recency_weight: f64,
    /// Estimated price of one model call, used for cache savings reporting.
    pub cost_per_call: f64,
    pub cache_path: PathBuf,
    pub models: ModelsConfig,
    pub llm: LlmConfig,
    pub fetch: FetchConfig,
    pub taxonomy: TaxonomyConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub categorization: String,
    pub summarization: String,
    pub overview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub url_patterns: Vec<String>,
}

/// Ordered category list. The order is the order of sections in the digest;
/// the version enters every categorization fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub version: String,
    pub categories: Vec<CategoryRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub markdown_dir: PathBuf,
    pub email: Option<EmailSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub subject: String,
}

impl DigestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: DigestConfig = toml::from_str(&raw)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.taxonomy.categories.is_empty() {
            return Err(DigestError::Config("taxonomy has no categories".to_string()));
        }
        let mut seen = HashSet::new();
        for rule in &self.taxonomy.categories {
            if !seen.insert(rule.category) {
                return Err(DigestError::Config(format!(
                    "category {} listed twice in taxonomy",
                    rule.category
                )));
            }
        }
        if self.taxonomy.version.trim().is_empty() {
            return Err(DigestError::Config("taxonomy version is empty".to_string()));
        }
        if self.max_per_category == 0 {
            return Err(DigestError::Config("max_per_category must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(DigestError::Config("concurrency must be at least 1".to_string()));
        }
        if self.time_window_hours == 0 {
            return Err(DigestError::Config("time_window_hours must be at least 1".to_string()));
        }
        for feed in &self.feeds {
            if !crate::utils::url::is_valid_feed_url(&feed.url) {
                return Err(DigestError::Config(format!("invalid feed url: {}", feed.url)));
            }
        }
        Ok(())
    }

    /// Categories in digest order.
    pub fn category_order(&self) -> Vec<Category> {
        self.taxonomy.categories.iter().map(|rule| rule.category).collect()
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.time_window_hours))
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            time_window_hours: 14,
            max_per_category: 5,
            concurrency: 4,
            categorize_max_chars: 500,
            summary_max_chars: 2000,
            recency_weight: 2.0,
            cost_per_call: 0.01,
            cache_path: PathBuf::from("cache/responses.db"),
            models: ModelsConfig::default(),
            llm: LlmConfig::default(),
            fetch: FetchConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            categorization: "gpt-3.5-turbo".to_string(),
            summarization: "gpt-3.5-turbo".to_string(),
            overview: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 30,
            temperature: 0.2,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            markdown_dir: PathBuf::from("digests"),
            email: None,
        }
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            subject: "Your Daily AI News Digest".to_string(),
        }
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        fn rule(category: Category, keywords: &[&str], url_patterns: &[&str]) -> CategoryRule {
            CategoryRule {
                category,
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
                url_patterns: url_patterns.iter().map(|s| s.to_string()).collect(),
            }
        }

        Self {
            version: "2024-06".to_string(),
            categories: vec![
                rule(
                    Category::ToolsAndFrameworks,
                    &[
                        "agent", "mcp", "framework", "sdk", "platform", "tool", "api",
                        "langchain", "autogen", "crewai", "bedrock", "workflow engine",
                    ],
                    &["langchain.dev", "mistral", "bedrock", "huggingface", "github"],
                ),
                rule(
                    Category::ModelsAndInfrastructure,
                    &[
                        "llm", "language model", "gpt", "transformer", "training",
                        "fine-tuning", "infrastructure", "scaling", "deployment",
                        "embedding", "vector", "inference", "optimization",
                    ],
                    &["openai", "huggingface", "anthropic", "arxiv", "microsoft", "aws"],
                ),
                rule(
                    Category::EnterpriseUseCases,
                    &[
                        "enterprise", "production", "deployment", "integration", "solution",
                        "business case", "case study", "roi", "customer", "automation",
                    ],
                    &["aws.amazon.com", "cloud.google.com", "case-study"],
                ),
                rule(
                    Category::IndustryAndMarket,
                    &[
                        "market", "startup", "funding", "ipo", "partnership", "acquisition",
                        "industry", "trend", "valuation", "launch",
                    ],
                    &["venturebeat", "techcrunch", "forbes", "businessinsider"],
                ),
            ],
        }
    }
}

fn default_feeds() -> Vec<FeedSource> {
    [
        ("Hugging Face Blog", "https://huggingface.co/blog/feed.xml"),
        ("TheSequence", "https://thesequence.substack.com/feed"),
        ("The Gradient", "https://thegradient.pub/rss/"),
        ("Google AI Blog", "https://blog.google/technology/ai/rss/"),
        ("Microsoft Research", "https://www.microsoft.com/en-us/research/blog/feed/"),
        ("OpenAI", "https://openai.com/blog/rss.xml"),
        ("AWS Machine Learning", "https://aws.amazon.com/blogs/machine-learning/feed/"),
        ("KDnuggets", "https://www.kdnuggets.com/feed"),
        ("LangChain Blog", "https://blog.langchain.dev/rss/"),
        ("VentureBeat AI", "https://venturebeat.com/ai/feed/"),
        ("TechCrunch AI", "https://techcrunch.com/category/artificial-intelligence/feed/"),
        ("NVIDIA Developer", "https://developer.nvidia.com/blog/feed/"),
        ("PyTorch Blog", "https://pytorch.org/blog/feed.xml"),
        ("AI News", "https://www.artificialintelligence-news.com/feed/"),
        ("The Register", "https://www.theregister.com/headlines.atom"),
    ]
    .into_iter()
    .map(|(name, url)| FeedSource::new(name, url))
    .collect()
}
