use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use digest_delivery::{render_markdown, EmailConfig, MarkdownFileSink, SmtpSink};
use rss_digest::{
    ArticleFetcher, DigestConfig, DigestPipeline, HttpTransport, ModelInvoker, OpenAiChatModel,
    ResponseCache, RetryingModel, RunContext, SqliteCacheStore,
};
use rss_digest::types::DigestSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rss-digest", version, about = "Daily AI news digest from RSS feeds")]
struct Cli {
    /// TOML configuration file; built-in defaults are used when it is missing
    #[arg(long, global = true, default_value = "digest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, filter, summarize and deliver today's digest
    Run {
        /// Date printed on the digest (YYYY-MM-DD); defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Directory for the markdown file, overriding the configuration
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Also send the digest by email
        #[arg(long)]
        email: bool,

        /// Print the markdown digest to stdout
        #[arg(long)]
        print: bool,
    },
    /// Inspect or prune the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Feed diagnostics
    Feeds {
        #[command(subcommand)]
        action: FeedsAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Evict {
        #[arg(long)]
        older_than_days: u32,
    },
}

#[derive(Subcommand)]
enum FeedsAction {
    /// Fetch every configured feed once and report entry counts
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = DigestConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Command::Run {
            date,
            output_dir,
            email,
            print,
        } => run_digest(config, date, output_dir, email, print).await,
        Command::Cache { action } => cache_command(&config, action).await,
        Command::Feeds { action: FeedsAction::Check } => check_feeds(&config).await,
    }
}

async fn run_digest(
    config: DigestConfig,
    date: Option<NaiveDate>,
    output_dir: Option<PathBuf>,
    email: bool,
    print: bool,
) -> Result<()> {
    let config = Arc::new(config);

    let store = Arc::new(SqliteCacheStore::open(&config.cache_path).await?);
    let cache = Arc::new(ResponseCache::with_cost_per_call(store.clone(), config.cost_per_call));
    let client = OpenAiChatModel::from_env(&config.llm)?;
    let model: Arc<dyn ModelInvoker> = Arc::new(RetryingModel::from_config(Arc::new(client), &config.llm));

    let mut ctx = RunContext::new(config.clone(), cache, model, Utc::now());
    if let Some(date) = date {
        ctx = ctx.with_date(date);
    }

    let transport = Arc::new(HttpTransport::new(config.fetch.clone())?);
    let fetcher = ArticleFetcher::new(transport, config.concurrency);
    let pipeline = DigestPipeline::new(ctx).with_fetcher(fetcher);

    let outcome = match pipeline.run(&config.feeds).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Digest run aborted: {}", e);
            return Err(e.into());
        }
    };
    outcome.report.log_summary();
    store.close().await;

    let mut sinks: Vec<Box<dyn DigestSink>> = vec![Box::new(MarkdownFileSink::new(
        output_dir.unwrap_or_else(|| config.output.markdown_dir.clone()),
    ))];
    if email {
        let settings = config.output.email.clone().unwrap_or_default();
        let email_config = EmailConfig::from_env(&settings.smtp_server, settings.smtp_port, &settings.subject)?;
        sinks.push(Box::new(SmtpSink::new(email_config)));
    }

    let mut failed = 0;
    for sink in &sinks {
        match sink.deliver(&outcome.digest).await {
            Ok(()) => info!("Delivered via {}", sink.sink_name()),
            Err(e) => {
                error!("Delivery via {} failed: {}", sink.sink_name(), e);
                failed += 1;
            }
        }
    }

    if print {
        println!("{}", render_markdown(&outcome.digest));
    }

    if failed > 0 {
        anyhow::bail!("{} of {} deliveries failed", failed, sinks.len());
    }
    Ok(())
}

async fn cache_command(config: &DigestConfig, action: CacheAction) -> Result<()> {
    let store = SqliteCacheStore::open(&config.cache_path).await?;

    match action {
        CacheAction::Stats => {
            let entries = store.len().await?;
            println!("Cache: {}", store.db_path().display());
            println!("  entries: {}", entries);
            match store.oldest_entry().await? {
                Some(oldest) => println!("  oldest:  {}", oldest.to_rfc3339()),
                None => println!("  oldest:  -"),
            }
            println!(
                "  estimated value at ${:.3}/call: ${:.2}",
                config.cost_per_call,
                entries as f64 * config.cost_per_call
            );
        }
        CacheAction::Evict { older_than_days } => {
            let removed = store
                .evict_older_than(Duration::days(i64::from(older_than_days)), Utc::now())
                .await?;
            println!("Evicted {} entries older than {} days", removed, older_than_days);
        }
    }

    store.close().await;
    Ok(())
}

async fn check_feeds(config: &DigestConfig) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(config.fetch.clone())?);
    let fetcher = ArticleFetcher::new(transport, config.concurrency);
    let window_start = Utc::now() - config.window();

    let mut healthy = 0;
    for source in &config.feeds {
        match fetcher.fetch_source(source).await {
            Ok(articles) => {
                healthy += 1;
                let recent = articles.iter().filter(|a| a.published_at >= window_start).count();
                println!("✓ {}: {} entries ({} in window)", source.name, articles.len(), recent);
            }
            Err(e) => println!("✗ {}: {}", source.name, e),
        }
    }

    println!("{}/{} feeds reachable", healthy, config.feeds.len());
    Ok(())
}
