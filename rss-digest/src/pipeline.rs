use crate::assemble::DigestAssembler;
use crate::context::RunContext;
use crate::fetcher::ArticleFetcher;
use crate::filter::{Categorizer, Verdict};
use crate::rank::Ranker;
use crate::report::{RunReport, Stage};
use crate::summarize::{SummaryOutcome, Summarizer};
use crate::types::{Article, Category, Digest, DigestError, FeedSource, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug)]
pub struct RunOutcome {
    pub digest: Digest,
    pub report: RunReport,
}

/// Runs the stages in order: freshness gate, keyword filter, categorize,
/// rank, summarize, assemble. Model-bound stages fan out up to the
/// configured concurrency and keep input order.
pub struct DigestPipeline {
    ctx: RunContext,
    fetcher: Option<ArticleFetcher>,
}

impl DigestPipeline {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx, fetcher: None }
    }

    pub fn with_fetcher(mut self, fetcher: ArticleFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(&self, sources: &[FeedSource]) -> Result<RunOutcome> {
        if sources.is_empty() {
            return Err(DigestError::Config("no feeds configured".to_string()));
        }
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| DigestError::Config("pipeline has no fetcher".to_string()))?;

        let batch = fetcher.fetch_all(sources).await;
        let mut outcome = self.run_articles(batch.articles).await?;
        outcome.report.feed_failures = batch.failures;
        Ok(outcome)
    }

    pub async fn run_articles(&self, articles: Vec<Article>) -> Result<RunOutcome> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let concurrency = config.concurrency.max(1);
        let mut report = RunReport::new(ctx.run_id);
        report.stats.fetched = articles.len();

        info!(run_id = %ctx.run_id, "Starting digest run for {} with {} articles", ctx.date, articles.len());

        // Stale articles must never reach a model
        let ranker = Ranker::new(config.window(), config.max_per_category, config.recency_weight);
        let (fresh, stale): (Vec<Article>, Vec<Article>) = articles
            .into_iter()
            .partition(|article| ranker.within_window(article, ctx.now));
        report.stats.stale = stale.len();
        debug!("{} fresh, {} stale", fresh.len(), stale.len());

        let categorizer = Categorizer::new(ctx);
        let verdicts: Vec<_> = stream::iter(fresh)
            .map(|article| categorizer.process(article))
            .buffered(concurrency)
            .collect()
            .await;

        let mut groups: HashMap<Category, Vec<Article>> = HashMap::new();
        for verdict in verdicts {
            match verdict? {
                Verdict::Categorized(article) => {
                    report.stats.categorized += 1;
                    if let Some(category) = article.category {
                        groups.entry(category).or_default().push(article);
                    }
                }
                Verdict::KeywordRejected(_) => report.stats.keyword_rejected += 1,
                Verdict::Irrelevant(_) => report.stats.irrelevant += 1,
                Verdict::Invalid { article, answer } => {
                    report.omit(&article, Stage::Categorize, format!("invalid category answer: {}", answer.trim()))
                }
                Verdict::Failed { article, error } => {
                    report.omit(&article, Stage::Categorize, error.to_string())
                }
            }
        }
        info!(
            "Categorized {} articles ({} keyword-rejected, {} irrelevant)",
            report.stats.categorized, report.stats.keyword_rejected, report.stats.irrelevant
        );

        let mut ranked: Vec<Article> = Vec::new();
        for category in config.category_order() {
            let Some(articles) = groups.remove(&category) else {
                continue;
            };
            let before = articles.len();
            let kept = ranker.rank(category, articles, ctx.now);
            report.stats.truncated += before - kept.len();
            ranked.extend(kept);
        }

        let summarizer = Summarizer::new(ctx);
        let outcomes: Vec<_> = stream::iter(ranked)
            .map(|article| summarizer.process(article))
            .buffered(concurrency)
            .collect()
            .await;

        let mut summarized: HashMap<Category, Vec<Article>> = HashMap::new();
        for outcome in outcomes {
            match outcome? {
                SummaryOutcome::Summarized(article) => {
                    report.stats.summarized += 1;
                    if let Some(category) = article.category {
                        summarized.entry(category).or_default().push(article);
                    }
                }
                SummaryOutcome::Failed { article, error } => {
                    report.omit(&article, Stage::Summarize, error.to_string())
                }
            }
        }
        info!("Summarized {} articles", report.stats.summarized);

        let assembly = DigestAssembler::new(ctx).assemble(ctx.date, summarized).await?;
        report.overview_fallback = assembly.overview_error.map(|e| e.to_string());
        report.stats.included = assembly.digest.article_count();
        report.cache = ctx.cache.stats();

        Ok(RunOutcome {
            digest: assembly.digest,
            report,
        })
    }
}
