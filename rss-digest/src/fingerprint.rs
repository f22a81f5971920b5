//! Deterministic keys for model requests and articles.
//!
//! A fingerprint covers exactly what decides the model's answer: the prompt
//! template id, the model id and the request content. Content is normalized
//! first (trimmed, lowercased, whitespace collapsed) so cosmetic differences
//! between two fetches of the same article hash identically.

use crate::types::ArticleId;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

const TRACKING_PARAMS: &[&str] = &["ref", "fbclid", "gclid", "mc_cid", "mc_eid"];

/// Lowercase hex SHA-256 identifying one model request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn builder(template_id: &str, model_id: &str) -> FingerprintBuilder {
        FingerprintBuilder::new(template_id, model_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    fn new(template_id: &str, model_id: &str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.field(template_id);
        builder.field(model_id);
        builder
    }

    /// Adds an identifier verbatim (versions, dates, category names).
    pub fn tag(mut self, value: &str) -> Self {
        self.field(value);
        self
    }

    /// Adds free text after normalization.
    pub fn content(mut self, text: &str) -> Self {
        let normalized = normalize(text);
        self.field(&normalized);
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.hasher.finalize()))
    }

    // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
    fn field(&mut self, value: &str) {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
    }
}

/// Trim, lowercase and collapse whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of an article URL. Falls back to the trimmed input when it
/// does not parse.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    // Url::parse already lowercases scheme and host
    url.to_string()
}

/// Article id: SHA-256 of the canonical URL and nothing else.
pub fn article_id(raw_url: &str) -> ArticleId {
    let canonical = canonical_url(raw_url);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    ArticleId::from_hex(hex::encode(hasher.finalize()))
}
