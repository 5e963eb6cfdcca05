//! CSS selection helpers.
//!
//! Pages are parsed and dropped inside each call so no `scraper::Html` value
//! is ever held across an `.await`.

use crate::errors::Failure;
use itertools::Itertools;
use scraper::{Html, Selector};
use url::Url;

pub fn parse_selector(selector: &str) -> Result<Selector, Failure> {
    Selector::parse(selector)
        .map_err(|e| Failure::Extraction(format!("bad selector `{selector}`: {e}")))
}

/// Values of `attr` for every element matching `selector`, in document order
/// and without duplicates. `href`/`src` values are resolved against `base`.
pub fn select_all(
    page: &str,
    base: Option<&Url>,
    selector: &str,
    attr: &str,
) -> Result<Vec<String>, Failure> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(page);
    let values = document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .filter_map(|value| resolve(base, value))
        .unique()
        .collect();
    Ok(values)
}

/// Value of `attr` on the first element matching `selector`.
pub fn select_one(
    page: &str,
    base: Option<&Url>,
    selector: &str,
    attr: &str,
) -> Result<Option<String>, Failure> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(page);
    let value = document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .and_then(|value| resolve(base, value));
    Ok(value)
}

/// Text of the `<title>` tag, trimmed.
pub fn title_text(page: &str) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let document = Html::parse_document(page);
    document
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn resolve(base: Option<&Url>, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') {
        return None;
    }
    let Some(base) = base else {
        return Some(value.to_string());
    };
    let joined = base.join(value).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}
