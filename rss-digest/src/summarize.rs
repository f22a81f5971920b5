use crate::cache::{CacheError, ResponseCache};
use crate::context::RunContext;
use crate::fingerprint::Fingerprint;
use crate::prompts;
use crate::types::{Article, ModelError, ModelInvoker, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum SummaryOutcome {
    /// `article.summary` is set.
    Summarized(Article),
    Failed { article: Article, error: ModelError },
}

pub struct Summarizer {
    cache: Arc<ResponseCache>,
    model: Arc<dyn ModelInvoker>,
    model_id: String,
    max_chars: usize,
}

impl Summarizer {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            cache: ctx.cache.clone(),
            model: ctx.model.clone(),
            model_id: ctx.config.models.summarization.clone(),
            max_chars: ctx.config.summary_max_chars,
        }
    }

    /// Summary text for one article, from cache when possible. The body is
    /// bounded before both fingerprinting and prompting.
    pub async fn summarize(&self, article: &Article) -> Result<String, CacheError> {
        let body = prompts::bounded_body(&article.body, self.max_chars);
        let fingerprint = Fingerprint::builder(prompts::SUMMARIZE_TEMPLATE, &self.model_id)
            .tag(&article.source)
            .content(&article.title)
            .content(&body)
            .finish();
        let prompt = prompts::summarize(&article.title, &article.source, &body);

        self.cache
            .get_or_compute(&fingerprint, || async {
                let summary = self.model.invoke(&prompt, &self.model_id).await?;
                let summary = summary.trim();
                if summary.is_empty() {
                    return Err(ModelError::Permanent("empty summary".to_string()));
                }
                Ok(summary.to_string())
            })
            .await
    }

    pub async fn process(&self, mut article: Article) -> Result<SummaryOutcome, StoreError> {
        match self.summarize(&article).await {
            Ok(summary) => {
                debug!("Summarized {}", article.title);
                article.summary = Some(summary);
                Ok(SummaryOutcome::Summarized(article))
            }
            Err(CacheError::Store(e)) => Err(e),
            Err(CacheError::Compute(error)) => {
                warn!("Summary failed for {}, omitting: {}", article.title, error);
                Ok(SummaryOutcome::Failed { article, error })
            }
        }
    }
}
