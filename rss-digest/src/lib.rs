pub mod types;
pub mod utils;
pub mod config;
pub mod fingerprint;
pub mod cache;
pub mod llm;
pub mod prompts;
pub mod parser;
pub mod fetcher;
pub mod context;
pub mod filter;
pub mod rank;
pub mod summarize;
pub mod assemble;
pub mod report;
pub mod pipeline;

pub use types::*;
pub use cache::{CacheError, CacheStats, MemoryCacheStore, ResponseCache, SqliteCacheStore};
pub use config::DigestConfig;
pub use context::RunContext;
pub use fetcher::{ArticleFetcher, FeedTransport, HttpTransport};
pub use fingerprint::{article_id, Fingerprint};
pub use filter::{Categorizer, KeywordFilter, Verdict};
pub use llm::{MockModel, OpenAiChatModel, RetryingModel};
pub use parser::FeedParser;
pub use pipeline::{DigestPipeline, RunOutcome};
pub use rank::Ranker;
pub use report::{RunReport, RunStats};
pub use summarize::Summarizer;
pub use assemble::DigestAssembler;
