//! Data models flowing through the pipeline.
//!
//! - [`LinkCandidate`] / [`LinkOrigin`]: a discovered link and where it came from
//! - [`LinkBatch`]: the unit sent from a producer to the dispatcher (one per wave)
//! - [`ScraperState`]: the checkpoint persisted per named scraper
//! - [`Article`]: a resolved, extracted article candidate
//! - [`ErrorRecord`]: a failure routed to the error sink

use crate::errors::{ErrorKind, Failure};
use crate::extract::ExtractedContent;
use crate::utils::{maintain_netloc, maintain_path};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Page that linked to a candidate, and the polarity of the scraper that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOrigin {
    pub origin: String,
    pub fake: bool,
}

/// A link waiting to be classified and resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub url: String,
    pub origin: String,
    pub fake: bool,
}

/// Checkpoint payload. Feed scrapers store their current page and remaining
/// budget, aggregator channels store how many posts they contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckpointData {
    Page { url: String, page: u32 },
    Posts { posts: usize },
}

/// Checkpoint of a single named scraper. `is_over` is true iff there is no
/// further page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperState {
    pub is_over: bool,
    pub data: CheckpointData,
}

/// Checkpoint rows keyed by scraper name.
pub type Checkpoint = BTreeMap<String, ScraperState>;

/// Links, crawl-side errors and checkpoint rows produced by one wave.
#[derive(Debug, Default, Clone)]
pub struct LinkBatch {
    pub links: BTreeMap<String, LinkOrigin>,
    pub errors: Vec<ErrorRecord>,
    pub checkpoint: Checkpoint,
}

impl LinkBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_link(&mut self, url: impl Into<String>, origin: impl Into<String>, fake: bool) {
        self.links.insert(
            url.into(),
            LinkOrigin {
                origin: origin.into(),
                fake,
            },
        );
    }

    pub fn append_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
    }

    pub fn append_state(&mut self, name: impl Into<String>, state: ScraperState) {
        self.checkpoint.insert(name.into(), state);
    }

    /// Fold another batch into this one. Later links and states win.
    pub fn merge(&mut self, other: LinkBatch) {
        self.links.extend(other.links);
        self.errors.extend(other.errors);
        self.checkpoint.extend(other.checkpoint);
    }

    pub fn candidates(&self) -> impl Iterator<Item = LinkCandidate> + '_ {
        self.links.iter().map(|(url, o)| LinkCandidate {
            url: url.clone(),
            origin: o.origin.clone(),
            fake: o.fake,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.errors.is_empty() && self.checkpoint.is_empty()
    }
}

/// A resolved article candidate.
///
/// `url` is the canonical URL; it differs from `visited_url` only when the
/// link was resolved through an archive mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub visited_url: String,
    pub scraped_from: String,
    pub fake: bool,
    pub title: String,
    pub text: String,
    pub summary: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub images: Vec<String>,
    pub keywords: Vec<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub lang: Option<String>,
}

impl Article {
    pub fn from_content(
        content: ExtractedContent,
        visited_url: &str,
        candidate: &LinkCandidate,
    ) -> Self {
        Self {
            url: visited_url.to_string(),
            visited_url: visited_url.to_string(),
            scraped_from: candidate.origin.clone(),
            fake: candidate.fake,
            title: content.title,
            text: content.body,
            summary: content.summary,
            description: content.description,
            authors: content.authors,
            images: content.images,
            keywords: content.keywords,
            publish_date: content.publish_date,
            lang: content.language,
        }
    }

    pub fn archived(&self) -> bool {
        self.url != self.visited_url
    }

    pub fn set_actual_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn path(&self) -> String {
        maintain_path(&self.url)
    }

    pub fn netloc(&self) -> String {
        maintain_netloc(&self.url)
    }
}

/// A failure ready for the error sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub url: String,
    pub source: Option<String>,
    pub fake: bool,
    pub info: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ErrorRecord {
    pub fn from_failure(failure: &Failure, url: &str, source: Option<&str>, fake: bool) -> Self {
        Self {
            kind: failure.kind(),
            url: url.to_string(),
            source: source.map(str::to_string),
            fake,
            info: Some(failure.to_string()),
            timestamp: Local::now(),
        }
    }

    pub fn for_candidate(failure: &Failure, candidate: &LinkCandidate) -> Self {
        Self::from_failure(failure, &candidate.url, Some(&candidate.origin), candidate.fake)
    }

    pub fn for_article(failure: &Failure, article: &Article) -> Self {
        Self::from_failure(
            failure,
            &article.visited_url,
            Some(&article.scraped_from),
            article.fake,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scraper_state_serialization_shapes() {
        let page = ScraperState {
            is_over: true,
            data: CheckpointData::Page {
                url: "https://feed.example/page/2".into(),
                page: 0,
            },
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "is_over": true,
                "data": {"url": "https://feed.example/page/2", "page": 0}
            })
        );

        let posts: ScraperState =
            serde_json::from_str(r#"{"is_over": true, "data": {"posts": 12}}"#).unwrap();
        assert_eq!(posts.data, CheckpointData::Posts { posts: 12 });
    }

    #[test]
    fn test_batch_merge_keeps_last_link_and_state() {
        let mut a = LinkBatch::new();
        a.append_link("https://x.com/1", "https://feed/a", true);
        a.append_state(
            "feed",
            ScraperState {
                is_over: false,
                data: CheckpointData::Page { url: "p1".into(), page: 1 },
            },
        );

        let mut b = LinkBatch::new();
        b.append_link("https://x.com/1", "https://feed/b", true);
        b.append_link("https://x.com/2", "https://feed/b", false);
        b.append_state(
            "feed",
            ScraperState {
                is_over: true,
                data: CheckpointData::Page { url: "p2".into(), page: 0 },
            },
        );

        a.merge(b);
        assert_eq!(a.links.len(), 2);
        assert_eq!(a.links["https://x.com/1"].origin, "https://feed/b");
        assert!(a.checkpoint["feed"].is_over);
        assert_eq!(a.candidates().count(), 2);
    }

    #[test]
    fn test_error_record_from_failure() {
        let failure = Failure::Timeout("https://slow.example/a".into());
        let candidate = LinkCandidate {
            url: "https://slow.example/a".into(),
            origin: "https://feed.example/1".into(),
            fake: true,
        };
        let record = ErrorRecord::for_candidate(&failure, &candidate);
        assert_eq!(record.kind, ErrorKind::Timeout);
        assert_eq!(record.source.as_deref(), Some("https://feed.example/1"));
        assert!(record.fake);
        assert!(record.info.unwrap().contains("too much time"));
    }
}
