use crate::types::{DigestError, ParsedEntry, ParsedFeed, Result};
use crate::utils::text::strip_html;
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

/// Turns RSS/Atom documents into plain-text entries. Remembers GUIDs and URLs
/// across calls so an entry repeated within one feed is kept once.
#[derive(Default)]
pub struct FeedParser {
    seen_guids: HashSet<String>,
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_feed(&mut self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let total = feed.entries.len();
        let entries: Vec<ParsedEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        debug!("Parsed {} of {} entries", entries.len(), total);
        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let title = entry
            .title
            .map(|t| strip_html(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No Title".to_string());

        let url = entry.links.first()?.href.trim().to_string();
        if url.is_empty() {
            return None;
        }

        // Undated entries can't be placed in the freshness window
        let Some(published_at) = entry.published.or(entry.updated) else {
            debug!("Skipping undated entry: {}", title);
            return None;
        };

        let guid = (!entry.id.is_empty()).then(|| entry.id.clone());
        if let Some(ref guid) = guid {
            if !self.seen_guids.insert(guid.clone()) {
                debug!("Skipping duplicate entry with GUID: {}", guid);
                return None;
            }
        }
        if !self.seen_urls.insert(url.clone()) {
            debug!("Skipping duplicate entry with URL: {}", url);
            return None;
        }

        let raw_body = entry
            .content
            .and_then(|c| c.body)
            .filter(|b| !b.trim().is_empty())
            .or_else(|| entry.summary.map(|s| s.content))
            .unwrap_or_default();

        Some(ParsedEntry {
            guid,
            url,
            title,
            body: strip_html(&raw_body),
            published_at: published_at.with_timezone(&Utc),
        })
    }

    /// Cheap sniff before handing a body to the XML parser.
    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();
        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}
