use crate::fingerprint::article_id;
use crate::parser::FeedParser;
use crate::types::{Article, DigestError, FeedSource, FetchConfig, FetchResult, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

/// Raw network access for feed documents.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpTransport {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HttpTransport {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<FetchResult> {
        let start_time = Instant::now();
        let fetch_time = Utc::now();

        debug!("Fetching feed: {}", url);
        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let failed = |error: String, http_status: Option<u16>| FetchResult {
            url: url.to_string(),
            success: false,
            error: Some(error),
            fetch_time,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            http_status,
            content: None,
        };

        let max_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        let mut last_error = None;
        let mut last_status = None;

        for attempt in 0..=self.config.max_retries {
            match self.send(url).await {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());

                    if !status.is_success() {
                        let message = format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        );
                        if !is_retryable_status(status) {
                            warn!("Not retrying {}: {}", url, message);
                            return Ok(failed(message, last_status));
                        }
                        last_error = Some(message);
                    } else if response.content_length().is_some_and(|len| len as usize > max_bytes) {
                        return Ok(failed(
                            DigestError::FeedTooLarge { size_mb: self.config.max_feed_size_mb }.to_string(),
                            last_status,
                        ));
                    } else {
                        match response.text().await {
                            Ok(content) if content.len() > max_bytes => {
                                return Ok(failed(
                                    DigestError::FeedTooLarge { size_mb: self.config.max_feed_size_mb }
                                        .to_string(),
                                    last_status,
                                ));
                            }
                            Ok(content) => {
                                debug!("Fetched feed: {} ({} bytes)", url, content.len());
                                return Ok(FetchResult {
                                    url: url.to_string(),
                                    success: true,
                                    error: None,
                                    fetch_time,
                                    response_time_ms: start_time.elapsed().as_millis() as u64,
                                    http_status: last_status,
                                    content: Some(content),
                                });
                            }
                            Err(e) => last_error = Some(e.to_string()),
                        }
                    }
                }
                Err(e) => last_error = Some(e.to_string()),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        let error_msg = last_error.unwrap_or_else(|| "Unknown error".to_string());
        error!("Failed to fetch feed after {} attempts: {}", self.config.max_retries + 1, url);
        Ok(failed(error_msg, last_status))
    }

    async fn send(&self, url: &str) -> Result<Response> {
        Ok(self.client.get(url).send().await?)
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        // Reserve the next slot for this host, then sleep outside the lock
        let wait = {
            let mut rate_limiter = self.rate_limiter.lock().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last) if *last + min_interval > now => *last + min_interval,
                _ => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<String> {
        let result = self.fetch_feed(url).await?;
        match (result.success, result.content) {
            (true, Some(content)) => Ok(content),
            _ => Err(DigestError::General(
                result.error.unwrap_or_else(|| "empty response".to_string()),
            )),
        }
    }
}

/// Rate limits and server-side failures may clear up; other statuses will not.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// A feed that could not be fetched or parsed. The run continues without it.
#[derive(Debug, Clone, Serialize)]
pub struct FeedFailure {
    pub source: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct FetchBatch {
    pub articles: Vec<Article>,
    pub failures: Vec<FeedFailure>,
}

/// Pulls every configured feed and normalizes entries into articles.
pub struct ArticleFetcher {
    transport: Arc<dyn FeedTransport>,
    concurrency: usize,
}

impl ArticleFetcher {
    pub fn new(transport: Arc<dyn FeedTransport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Articles from all sources, de-duplicated by id; the first occurrence in
    /// source order wins.
    pub async fn fetch_all(&self, sources: &[FeedSource]) -> FetchBatch {
        info!("Fetching {} feeds", sources.len());

        let results: Vec<(&FeedSource, Result<Vec<Article>>)> = stream::iter(sources)
            .map(|source| async move { (source, self.fetch_source(source).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut batch = FetchBatch::default();
        let mut seen = HashSet::new();

        for (source, result) in results {
            match result {
                Ok(articles) => {
                    for article in articles {
                        if seen.insert(article.id.clone()) {
                            batch.articles.push(article);
                        } else {
                            debug!("Dropping duplicate article {} ({})", article.id.short(), article.url);
                        }
                    }
                }
                Err(e) => {
                    warn!("Feed {} failed: {}", source.name, e);
                    batch.failures.push(FeedFailure {
                        source: source.name.clone(),
                        url: source.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Fetched {} articles ({} feeds failed)",
            batch.articles.len(),
            batch.failures.len()
        );
        batch
    }

    pub async fn fetch_source(&self, source: &FeedSource) -> Result<Vec<Article>> {
        let content = self.transport.fetch(&source.url).await?;
        if !FeedParser::is_valid_feed_content(&content) {
            return Err(DigestError::Parse(format!("{} is not an RSS/Atom document", source.url)));
        }

        let feed = FeedParser::new().parse_feed(&content)?;
        let source_name = if !source.name.trim().is_empty() {
            source.name.clone()
        } else {
            feed.title.clone().unwrap_or_else(|| source.url.clone())
        };

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| {
                Article::new(
                    article_id(&entry.url),
                    entry.title,
                    entry.url,
                    source_name.clone(),
                    entry.published_at,
                    entry.body,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticTransport(HashMap<String, String>);

    #[async_trait]
    impl FeedTransport for StaticTransport {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| DigestError::General(format!("HTTP 404: {}", url)))
        }
    }

    fn rss(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{}</title><link>{}</link>\
                     <pubDate>Mon, 08 Jan 2024 10:00:00 GMT</pubDate>\
                     <description>body</description></item>",
                    title, link
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Feed</title>{}</channel></rss>",
            items
        )
    }

    #[tokio::test]
    async fn isolates_failures_and_dedups_across_feeds() {
        let mut docs = HashMap::new();
        docs.insert(
            "https://a.example/feed".to_string(),
            rss(&[("Shared", "https://news.example/post?utm_source=a"), ("Only A", "https://a.example/1")]),
        );
        docs.insert(
            "https://b.example/feed".to_string(),
            rss(&[("Shared again", "https://news.example/post")]),
        );

        let fetcher = ArticleFetcher::new(Arc::new(StaticTransport(docs)), 2);
        let sources = vec![
            FeedSource::new("A", "https://a.example/feed"),
            FeedSource::new("Down", "https://down.example/feed"),
            FeedSource::new("B", "https://b.example/feed"),
        ];

        let batch = fetcher.fetch_all(&sources).await;

        assert_eq!(batch.articles.len(), 2);
        assert_eq!(batch.articles[0].title, "Shared");
        assert_eq!(batch.articles[0].source, "A");
        assert_eq!(batch.articles[1].title, "Only A");
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].source, "Down");
    }

    #[test]
    fn only_transient_statuses_are_retried() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::GONE));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn missing_feed_is_requested_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            }
        });

        let transport = HttpTransport::new(FetchConfig {
            max_retries: 3,
            min_host_interval_ms: 0,
            ..FetchConfig::default()
        })
        .unwrap();
        let result = transport
            .fetch_feed(&format!("http://{}/feed.xml", addr))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.http_status, Some(404));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
