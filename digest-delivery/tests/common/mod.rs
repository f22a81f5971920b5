use chrono::{NaiveDate, TimeZone, Utc};
use interfaces::defs::{Article, ArticleId, Category, Digest, DigestSection};

pub fn article(title: &str, url: &str, summary: &str) -> Article {
    let mut article = Article::new(
        ArticleId::from_hex(format!("{:0>64}", title.len())),
        title,
        url,
        "LangChain Blog",
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap(),
        "body",
    );
    article.category = Some(Category::ToolsAndFrameworks);
    article.summary = Some(summary.to_string());
    article
}

pub fn sample_digest() -> Digest {
    Digest {
        date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        overview: "Agent frameworks <and> tooling dominated the day.".to_string(),
        sections: vec![
            DigestSection {
                category: Category::ToolsAndFrameworks,
                articles: vec![article(
                    "LangChain 0.1.0 Released",
                    "https://blog.langchain.dev/langchain-v0-1-0/",
                    "The first stable release of LangChain & friends.",
                )],
            },
            DigestSection {
                category: Category::IndustryAndMarket,
                articles: vec![article(
                    "Startup raises Series A",
                    "https://techcrunch.com/a?x=1&y=2",
                    "Funding for agent infrastructure.",
                )],
            },
        ],
    }
}
