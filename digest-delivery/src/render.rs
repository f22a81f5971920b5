use interfaces::defs::{Article, Digest};
use std::fmt::Write;

const TITLE: &str = "AI News Digest";

pub fn title_line(digest: &Digest) -> String {
    format!("{}: {}", TITLE, digest.date.format("%B %-d, %Y"))
}

fn byline(article: &Article) -> String {
    format!(
        "{} · {}",
        article.source,
        article.published_at.format("%b %-d, %H:%M UTC")
    )
}

pub fn render_markdown(digest: &Digest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title_line(digest));
    let _ = writeln!(out, "{}\n", digest.overview.trim());

    for section in &digest.sections {
        let _ = writeln!(out, "## {} {}\n", section.category.emoji(), section.category.label());
        for article in &section.articles {
            let _ = writeln!(out, "### [{}]({})\n", article.title, article.url);
            let _ = writeln!(out, "*{}*\n", byline(article));
            if let Some(summary) = article.summary.as_deref() {
                let _ = writeln!(out, "{}\n", summary.trim());
            }
        }
    }

    out.trim_end().to_string() + "\n"
}

pub fn render_html(digest: &Digest) -> String {
    let mut out = String::new();
    let title = escape_html(&title_line(digest));
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n"
    );
    let _ = writeln!(out, "<h1>{}</h1>", title);
    let _ = writeln!(out, "<p>{}</p>", escape_html(digest.overview.trim()));

    for section in &digest.sections {
        let _ = writeln!(
            out,
            "<h2>{} {}</h2>",
            section.category.emoji(),
            escape_html(section.category.label())
        );
        for article in &section.articles {
            let _ = writeln!(
                out,
                "<h3><a href=\"{}\">{}</a></h3>",
                escape_html(&article.url),
                escape_html(&article.title)
            );
            let _ = writeln!(out, "<p><em>{}</em></p>", escape_html(&byline(article)));
            if let Some(summary) = article.summary.as_deref() {
                let _ = writeln!(out, "<p>{}</p>", escape_html(summary.trim()));
            }
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
