//! Prompt templates. Each template has a stable id that is part of every
//! fingerprint built from it; changing a template's wording means bumping
//! its id.

use crate::types::{Article, Category, Classification};
use crate::utils::text::{collapse_whitespace, smart_truncate};
use serde::Deserialize;

pub const CATEGORIZE_TEMPLATE: &str = "categorize.v1";
pub const SUMMARIZE_TEMPLATE: &str = "summarize.v1";
pub const OVERVIEW_TEMPLATE: &str = "overview.v1";

const IRRELEVANT_TOKENS: &[&str] = &["IRRELEVANT", "NOT_RELEVANT", "NONE", "OTHER"];

pub fn categorize(title: &str, body: &str, categories: &[Category]) -> String {
    let choices: String = categories
        .iter()
        .map(|c| format!("- {}\n", c.as_str()))
        .collect();

    format!(
        "You are a categorization agent. Classify the article into exactly one of the \
following categories, or answer IRRELEVANT if it is not about AI:\n\
{choices}\n\
Title: {title}\n\
Summary: {body}\n\n\
Respond with:\n\
{{\n  \"category\": \"...\",\n  \"justification\": \"...\"\n}}"
    )
}

pub fn summarize(title: &str, source: &str, body: &str) -> String {
    format!(
        "Summarize the following article in 2-3 sentences for a professional newsletter. \
Emphasize what's new, why it matters, and who should care.\n\n\
Title: {title}\n\
Source: {source}\n\
Full Text: {body}\n\n\
2-3 Sentence Summary:"
    )
}

/// One line per included article, in digest order.
pub fn overview_line(article: &Article, category: Category) -> String {
    format!(
        "- [{}] {} ({}): {}",
        category.label(),
        article.title,
        article.source,
        article.summary.as_deref().unwrap_or("")
    )
}

pub fn overview(lines: &[String]) -> String {
    format!(
        "Analyze the following list of article titles and summaries. Generate a 3-5 sentence \
newsletter introduction summarizing the biggest trends or common themes for the day.\n\n\
Articles:\n{}\n\n\
Newsletter Introduction:",
        lines.join("\n")
    )
}

/// Body text bounded for a prompt. The same bounded text feeds the
/// fingerprint, so trailing content past the limit never causes a miss.
/// Whitespace is collapsed before the cut so spacing cannot move it.
pub fn bounded_body(body: &str, max_chars: usize) -> String {
    smart_truncate(&collapse_whitespace(body), max_chars)
}

#[derive(Debug, Deserialize)]
struct CategoryAnswer {
    category: String,
}

/// Reads a categorization answer. Accepts the requested JSON object (also
/// inside a code fence or surrounding prose) or a bare category token.
/// Categories outside `allowed` are reported, never coerced.
pub fn parse_classification(raw: &str, allowed: &[Category]) -> Classification {
    let token = match json_category(raw) {
        Some(token) => token,
        None => bare_token(raw),
    };

    let wire = token
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .to_ascii_uppercase()
        .replace(['-', ' '], "_");

    if wire.is_empty() {
        return Classification::InvalidResponse(raw.trim().to_string());
    }
    if IRRELEVANT_TOKENS.contains(&wire.as_str()) {
        return Classification::Irrelevant;
    }

    match wire.parse::<Category>() {
        Ok(category) if allowed.contains(&category) => Classification::Category(category),
        _ => Classification::InvalidResponse(raw.trim().to_string()),
    }
}

fn json_category(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<CategoryAnswer>(&raw[start..=end])
        .ok()
        .map(|answer| answer.category)
}

fn bare_token(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("```"))
        .unwrap_or("")
        .trim_start_matches("Category:")
        .trim_start_matches("category:")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Category; 4] = Category::ALL;

    #[test]
    fn parses_json_answer() {
        let raw = r#"{"category": "TOOLS_AND_FRAMEWORKS", "justification": "new SDK"}"#;
        assert_eq!(
            parse_classification(raw, &ALL),
            Classification::Category(Category::ToolsAndFrameworks)
        );
    }

    #[test]
    fn parses_fenced_json_and_bare_tokens() {
        let fenced = "```json\n{\"category\": \"industry_and_market\", \"justification\": \"funding\"}\n```";
        assert_eq!(
            parse_classification(fenced, &ALL),
            Classification::Category(Category::IndustryAndMarket)
        );
        assert_eq!(
            parse_classification("MODELS_AND_INFRASTRUCTURE", &ALL),
            Classification::Category(Category::ModelsAndInfrastructure)
        );
        assert_eq!(parse_classification("Irrelevant.", &ALL), Classification::Irrelevant);
    }

    #[test]
    fn unknown_or_disallowed_category_is_invalid() {
        assert!(matches!(
            parse_classification(r#"{"category": "SPORTS"}"#, &ALL),
            Classification::InvalidResponse(_)
        ));
        assert!(matches!(
            parse_classification("ENTERPRISE_USE_CASES", &[Category::ToolsAndFrameworks]),
            Classification::InvalidResponse(_)
        ));
        assert!(matches!(parse_classification("   ", &ALL), Classification::InvalidResponse(_)));
    }

    #[test]
    fn categorize_prompt_lists_only_configured_categories() {
        let prompt = categorize("t", "b", &[Category::IndustryAndMarket]);
        assert!(prompt.contains("INDUSTRY_AND_MARKET"));
        assert!(!prompt.contains("TOOLS_AND_FRAMEWORKS"));
    }

    #[test]
    fn bounded_body_ignores_spacing() {
        let words: Vec<String> = (0..300).map(|n| format!("word{}", n)).collect();
        let single = words.join(" ");
        let double = words.join("  \n ");

        let bounded = bounded_body(&single, 500);
        assert_eq!(bounded, bounded_body(&double, 500));
        assert!(bounded.chars().count() <= 503);
    }
}
