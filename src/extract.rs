//! Structured article extraction.
//!
//! [`ContentExtractor`] turns raw HTML into [`ExtractedContent`]. The bundled
//! [`HtmlExtractor`] reads the usual metadata (`og:*`, `article:*`, `author`,
//! `description`, `keywords`, `<html lang>`) and collects the body from
//! paragraph elements.
//!
//! Two post-processing steps are applied to every extracted article:
//! [`correct_title`] and [`remove_newlines`].

use crate::errors::Failure;
use crate::html::title_text;
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const SUMMARY_SENTENCES: usize = 3;
const TITLE_SEPARATORS: [&str; 3] = [" - ", " | ", " – "];
const AUTHOR_META: &str = r#"meta[name="author"], meta[property="article:author"]"#;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub title: String,
    pub body: String,
    pub summary: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub images: Vec<String>,
    pub keywords: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Result<ExtractedContent, Failure>;
}

#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

impl ContentExtractor for HtmlExtractor {
    fn extract(&self, html: &str) -> Result<ExtractedContent, Failure> {
        let document = Html::parse_document(html);

        let title = meta_content(&document, r#"meta[property="og:title"]"#)
            .or_else(|| first_text(&document, "h1"))
            .or_else(|| first_text(&document, "title"))
            .unwrap_or_default();

        let body = paragraphs(&document, "article p")
            .filter(|b| !b.is_empty())
            .or_else(|| paragraphs(&document, "p"))
            .unwrap_or_default();

        let description = meta_content(&document, r#"meta[name="description"]"#)
            .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#));

        let authors = all_meta_content(&document, AUTHOR_META)
            .into_iter()
            .chain(all_text(&document, r#"[rel="author"], .byline [itemprop="name"]"#))
            .unique()
            .collect();

        let images = all_meta_content(&document, r#"meta[property="og:image"]"#)
            .into_iter()
            .chain(all_attr(&document, "article img", "src"))
            .unique()
            .collect();

        let keywords = meta_content(&document, r#"meta[name="keywords"]"#)
            .map(|k| {
                k.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let publish_date = meta_content(&document, r#"meta[property="article:published_time"]"#)
            .or_else(|| meta_content(&document, r#"meta[itemprop="datePublished"]"#))
            .or_else(|| all_attr(&document, "time[datetime]", "datetime").into_iter().next())
            .and_then(|raw| parse_date(&raw));

        let language = all_attr(&document, "html[lang]", "lang")
            .into_iter()
            .next()
            .or_else(|| meta_content(&document, r#"meta[http-equiv="content-language"]"#))
            .map(|l| l.to_lowercase());

        if title.is_empty() && body.is_empty() {
            return Err(Failure::Extraction("no title and no text found".into()));
        }

        Ok(ExtractedContent {
            summary: summarize(&body),
            title,
            body,
            description,
            authors,
            images,
            keywords,
            publish_date,
            language,
        })
    }
}

/// Recover a truncated title (ending in an ellipsis) from the `<title>` tag,
/// dropping the site name after the last separator.
pub fn correct_title(title: &str, html: &str) -> String {
    let trimmed = title.trim();
    if !(trimmed.ends_with('…') || trimmed.ends_with("...")) {
        return title.to_string();
    }
    let Some(full) = title_text(html) else {
        return title.to_string();
    };
    match TITLE_SEPARATORS.iter().find_map(|sep| full.rfind(sep)) {
        Some(index) => full[..index].to_string(),
        None => full,
    }
}

/// Collapse runs of newlines into a single space.
pub fn remove_newlines(text: &str) -> String {
    static NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").unwrap());
    NEWLINES.replace_all(text, " ").trim().to_string()
}

fn summarize(body: &str) -> String {
    static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+(\s|$)").unwrap());
    let sentences: Vec<&str> = SENTENCE
        .find_iter(body)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .take(SUMMARY_SENTENCES)
        .collect();
    if sentences.is_empty() {
        body.lines().next().unwrap_or_default().trim().to_string()
    } else {
        sentences.join(" ")
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc())
        })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().join(" ")
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    all_meta_content(document, css).into_iter().next()
}

fn all_meta_content(document: &Html, css: &str) -> Vec<String> {
    all_attr(document, css, "content")
}

fn all_attr(document: &Html, css: &str, attr: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn all_text(document: &Html, css: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    all_text(document, css).into_iter().next()
}

fn paragraphs(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    let text = document
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .join("\n\n");
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const ARTICLE: &str = r#"
        <html lang="en-US"><head>
          <title>Bears build a wall along the border - Arctic Fox News</title>
          <meta property="og:title" content="Bears build a wall…">
          <meta name="description" content="Polar bears are at it again.">
          <meta name="author" content="Jane Roe">
          <meta name="keywords" content="bears, walls ,  ">
          <meta property="og:image" content="https://img.example/bear.jpg">
          <meta property="article:published_time" content="2019-03-01T10:00:00+01:00">
        </head><body>
          <p>Outside text.</p>
          <article>
            <h1>Bears build a wall</h1>
            <p>First sentence here. Second
            sentence here!</p>
            <p>Third sentence? Fourth one.</p>
          </article>
        </body></html>
    "#;

    #[test]
    fn test_extracts_metadata_and_body() {
        let content = HtmlExtractor.extract(ARTICLE).unwrap();
        assert_eq!(content.title, "Bears build a wall…");
        assert!(content.body.starts_with("First sentence here."));
        assert!(!content.body.contains("Outside text"));
        assert_eq!(content.summary, "First sentence here. Second sentence here! Third sentence?");
        assert_eq!(content.description.as_deref(), Some("Polar bears are at it again."));
        assert_eq!(content.authors, vec!["Jane Roe"]);
        assert_eq!(content.images, vec!["https://img.example/bear.jpg"]);
        assert_eq!(content.keywords, vec!["bears", "walls"]);
        assert_eq!(content.language.as_deref(), Some("en-us"));
        let date = content.publish_date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2019, 3, 1));
    }

    #[test]
    fn test_empty_page_is_extraction_failure() {
        let err = HtmlExtractor.extract("<html><body><div></div></body></html>").unwrap_err();
        assert!(matches!(err, Failure::Extraction(_)));
    }

    #[test]
    fn test_correct_title_recovers_from_title_tag() {
        assert_eq!(
            correct_title("Bears build a wall…", ARTICLE),
            "Bears build a wall along the border"
        );
        assert_eq!(correct_title("A complete title", ARTICLE), "A complete title");
    }

    #[test]
    fn test_correct_title_separator_order() {
        let html = "<title>Left | Middle - Right</title>";
        // " - " is looked up first, from the right
        assert_eq!(correct_title("Left...", html), "Left | Middle");
        let html = "<title>No separators here</title>";
        assert_eq!(correct_title("No sep…", html), "No separators here");
    }

    #[test]
    fn test_remove_newlines() {
        assert_eq!(remove_newlines("a\n\nb\r\nc\n"), "a b c");
    }

    #[test]
    fn test_parse_date_fallback() {
        let d = parse_date("2020-05-17 some trailing text").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2020, 5, 17));
        assert!(parse_date("yesterday").is_none());
    }
}
