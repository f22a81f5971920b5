use crate::cache::{CacheError, ResponseCache};
use crate::context::RunContext;
use crate::fingerprint::Fingerprint;
use crate::prompts;
use crate::types::{Article, Category, Digest, DigestSection, ModelError, ModelInvoker, StoreError};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const EMPTY_OVERVIEW: &str = "No articles made it into today's digest.";

#[derive(Debug)]
pub struct Assembly {
    pub digest: Digest,
    /// Set when the overview call failed and a plain overview was used.
    pub overview_error: Option<ModelError>,
}

pub struct DigestAssembler {
    cache: Arc<ResponseCache>,
    model: Arc<dyn ModelInvoker>,
    model_id: String,
    order: Vec<Category>,
}

impl DigestAssembler {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            cache: ctx.cache.clone(),
            model: ctx.model.clone(),
            model_id: ctx.config.models.overview.clone(),
            order: ctx.config.category_order(),
        }
    }

    /// Lays sections out in configured order, skipping empty and unconfigured
    /// categories, then asks for one overview over everything included.
    pub async fn assemble(
        &self,
        date: NaiveDate,
        mut groups: HashMap<Category, Vec<Article>>,
    ) -> Result<Assembly, StoreError> {
        let sections: Vec<DigestSection> = self
            .order
            .iter()
            .filter_map(|category| {
                groups
                    .remove(category)
                    .filter(|articles| !articles.is_empty())
                    .map(|articles| DigestSection {
                        category: *category,
                        articles,
                    })
            })
            .collect();

        let mut digest = Digest {
            date,
            overview: EMPTY_OVERVIEW.to_string(),
            sections,
        };
        if digest.is_empty() {
            info!("Digest for {} is empty", date);
            return Ok(Assembly {
                digest,
                overview_error: None,
            });
        }

        let overview_error = match self.overview(&digest).await {
            Ok(overview) => {
                digest.overview = overview;
                None
            }
            Err(CacheError::Store(e)) => return Err(e),
            Err(CacheError::Compute(error)) => {
                warn!("Overview failed, using plain overview: {}", error);
                digest.overview = fallback_overview(&digest);
                Some(error)
            }
        };

        info!(
            "Assembled digest for {}: {} articles in {} sections",
            date,
            digest.article_count(),
            digest.sections.len()
        );
        Ok(Assembly {
            digest,
            overview_error,
        })
    }

    async fn overview(&self, digest: &Digest) -> Result<String, CacheError> {
        let mut keys: Vec<String> = digest
            .sections
            .iter()
            .flat_map(|section| {
                section
                    .articles
                    .iter()
                    .map(move |article| format!("{}|{}", article.title, section.category))
            })
            .collect();
        keys.sort();

        let fingerprint = keys
            .iter()
            .fold(
                Fingerprint::builder(prompts::OVERVIEW_TEMPLATE, &self.model_id)
                    .tag(&digest.date.to_string()),
                |builder, key| builder.content(key),
            )
            .finish();

        let lines: Vec<String> = digest
            .sections
            .iter()
            .flat_map(|section| {
                section
                    .articles
                    .iter()
                    .map(move |article| prompts::overview_line(article, section.category))
            })
            .collect();
        let prompt = prompts::overview(&lines);

        self.cache
            .get_or_compute(&fingerprint, || async {
                let overview = self.model.invoke(&prompt, &self.model_id).await?;
                let overview = overview.trim();
                if overview.is_empty() {
                    return Err(ModelError::Permanent("empty overview".to_string()));
                }
                Ok(overview.to_string())
            })
            .await
    }
}

fn fallback_overview(digest: &Digest) -> String {
    let labels: Vec<&str> = digest.sections.iter().map(|s| s.category.label()).collect();
    format!(
        "Today's digest covers {} articles across {}.",
        digest.article_count(),
        labels.join(", ")
    )
}
