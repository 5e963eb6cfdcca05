//! Link resolution: fetch a link and turn it into an [`Article`].
//!
//! The strategy is picked from the URL alone:
//!
//! - `archive.*` mirrors are fetched, then the original URL is read from the
//!   mirror's header form
//! - `web.archive.*` mirrors carry the original URL in their own path, which
//!   is extracted before anything is fetched
//! - everything else is fetched directly and keeps its URL

use crate::errors::Failure;
use crate::extract::{ContentExtractor, correct_title, remove_newlines};
use crate::fetch::PageFetcher;
use crate::html::select_one;
use crate::models::{Article, LinkCandidate};
use crate::utils::maintain_path;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

static ARCHIVE_IS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://archive[.]").unwrap());
static WEB_ARCHIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://web[.]archive[.]").unwrap());
static EMBEDDED_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(https?://[^\s]+)").unwrap());

const ARCHIVE_IS_ORIGINAL: &str = "#HEADER > table input";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    Direct,
    ArchiveIs,
    WebArchive,
}

impl ResolveStrategy {
    pub fn for_url(url: &str) -> Self {
        let url = url.trim();
        if WEB_ARCHIVE.is_match(url) {
            ResolveStrategy::WebArchive
        } else if ARCHIVE_IS.is_match(url) {
            ResolveStrategy::ArchiveIs
        } else {
            ResolveStrategy::Direct
        }
    }
}

/// Original URL embedded in a web-archive link's path.
pub fn embedded_url(mirror: &str) -> Option<String> {
    let path = maintain_path(mirror);
    EMBEDDED_URL.find(&path).map(|m| m.as_str().to_string())
}

#[derive(Clone)]
pub struct ArticleResolver {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    timeout: Duration,
}

impl ArticleResolver {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and extract the article behind `candidate`.
    ///
    /// Archive mirror links come back with `url` set to the original page
    /// and `visited_url` to the mirror.
    ///
    /// # Errors
    ///
    /// Any fetch or extraction [`Failure`], or `ActualUrlNotFound` when a
    /// mirror does not reveal its original.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url))]
    pub async fn resolve(&self, candidate: &LinkCandidate) -> Result<Article, Failure> {
        match ResolveStrategy::for_url(&candidate.url) {
            ResolveStrategy::Direct => self.direct(candidate).await.map(|(article, _)| article),
            ResolveStrategy::ArchiveIs => {
                let (article, page) = self.direct(candidate).await?;
                let original = select_one(&page, None, ARCHIVE_IS_ORIGINAL, "value")
                    .ok()
                    .flatten()
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Failure::ActualUrlNotFound(candidate.url.clone()))?;
                debug!(%original, "Archive mirror resolved");
                Ok(article.set_actual_url(original))
            }
            ResolveStrategy::WebArchive => {
                let original = embedded_url(&candidate.url)
                    .ok_or_else(|| Failure::ActualUrlNotFound(candidate.url.clone()))?;
                let (article, _) = self.direct(candidate).await?;
                debug!(%original, "Web archive link resolved");
                Ok(article.set_actual_url(original))
            }
        }
    }

    /// Fetch and extract, returning the raw page along with the article.
    async fn direct(&self, candidate: &LinkCandidate) -> Result<(Article, String), Failure> {
        url::Url::parse(candidate.url.trim())
            .map_err(|e| Failure::InvalidUrl(format!("{}: {e}", candidate.url)))?;
        let page = self.fetcher.fetch(&candidate.url, Some(self.timeout)).await?;
        let mut content = self.extractor.extract(&page)?;
        content.title = correct_title(&content.title, &page);
        content.body = remove_newlines(&content.body);
        content.summary = remove_newlines(&content.summary);
        Ok((Article::from_content(content, &candidate.url, candidate), page))
    }
}
