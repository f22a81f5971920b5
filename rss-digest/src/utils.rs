/// Text processing utilities
pub mod text {
    use scraper::{Html, Node};

    /// Truncate to at most `max_chars` characters, preferring a sentence or word
    /// boundary in the last fifth of the allowance.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        let text = text.trim();
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let cut = text
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        let truncated = &text[..cut];
        let floor = truncated.len() * 4 / 5;

        if let Some(last_sentence) = truncated.rfind(". ").filter(|idx| *idx >= floor) {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ').filter(|idx| *idx >= floor) {
            format!("{}...", truncated[..last_space].trim_end())
        } else {
            format!("{}...", truncated)
        }
    }

    /// Collapse whitespace runs to single spaces, keeping case.
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    const BLOCK_TAGS: &[&str] = &[
        "p", "br", "div", "li", "ul", "ol", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5",
        "h6", "blockquote", "pre", "section", "article", "figure", "figcaption",
    ];

    /// Plain text of an HTML fragment: entities decoded, block elements
    /// separated by a space, whitespace collapsed.
    pub fn strip_html(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let mut out = String::with_capacity(html.len());

        for node in fragment.root_element().descendants() {
            match node.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) if BLOCK_TAGS.contains(&element.name()) => out.push(' '),
                _ => {}
            }
        }

        collapse_whitespace(&out)
    }

    /// Whole-word test that tolerates a trailing plural "s". Both sides are
    /// expected lowercase.
    pub fn contains_term(haystack_lower: &str, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return false;
        }
        let is_word = |c: char| c.is_alphanumeric();

        haystack_lower.match_indices(needle_lower).any(|(start, _)| {
            let before = haystack_lower[..start].chars().next_back();
            let after = &haystack_lower[start + needle_lower.len()..];
            let after = match after.strip_prefix('s') {
                Some(rest) if !rest.chars().next().is_some_and(is_word) => rest,
                _ => after,
            };
            !before.is_some_and(is_word) && !after.chars().next().is_some_and(is_word)
        })
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.domain().map(|d| d.to_lowercase()))
    }

    /// Validate RSS feed URL format
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => url.scheme() == "http" || url.scheme() == "https",
            Err(_) => false,
        }
    }
}
