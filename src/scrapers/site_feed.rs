//! Paginated HTML feed scraper.
//!
//! A [`SiteFeed`] points at one page of a feed. Each call to
//! [`SiteFeed::fetch_links`]:
//!
//! 1. fetches the feed page and selects the article entries and the `next` link
//! 2. fetches every article page, in order, and selects the outbound links
//! 3. returns a [`FeedResult`] with the links, the successor scraper and the
//!    checkpoint row for the page just visited
//!
//! The successor carries `stop_after - 1`. A scraper whose budget is already
//! zero never has a successor, even when a `next` link is present.

use crate::errors::Failure;
use crate::fetch::PageFetcher;
use crate::html::{select_all, select_one};
use crate::models::{CheckpointData, ErrorRecord, LinkBatch, ScraperState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// CSS selectors for the three slots a feed needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    /// Link to the next feed page.
    pub next: String,
    /// Article entries listed on a feed page.
    pub entries: String,
    /// Outbound links inside an article page.
    pub links: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteFeed {
    pub name: String,
    pub url: String,
    pub sel: Selectors,
    pub stop_after: u32,
    pub fake_news: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoverError {
    #[error("scraper {0} is exhausted")]
    Exhausted(String),

    #[error("checkpoint of {0} does not describe a feed page")]
    WrongShape(String),
}

/// Outcome of one feed page.
#[derive(Debug)]
pub struct FeedResult {
    pub batch: LinkBatch,
    pub successor: Option<SiteFeed>,
    pub state: ScraperState,
}

impl SiteFeed {
    #[cfg(test)]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        sel: Selectors,
        stop_after: u32,
        fake_news: bool,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sel,
            stop_after,
            fake_news,
        }
    }

    /// Resume from a checkpoint, replacing the configured url and budget.
    pub fn recover_state(&mut self, state: &ScraperState) -> Result<(), RecoverError> {
        if state.is_over {
            return Err(RecoverError::Exhausted(self.name.clone()));
        }
        match &state.data {
            CheckpointData::Page { url, page } => {
                self.url = url.clone();
                self.stop_after = *page;
                Ok(())
            }
            CheckpointData::Posts { .. } => Err(RecoverError::WrongShape(self.name.clone())),
        }
    }

    pub fn to_state(&self, over: bool) -> ScraperState {
        ScraperState {
            is_over: over,
            data: CheckpointData::Page {
                url: self.url.clone(),
                page: self.stop_after,
            },
        }
    }

    fn next_page(&self, next_url: String) -> Option<SiteFeed> {
        if self.stop_after == 0 {
            return None;
        }
        Some(SiteFeed {
            url: next_url,
            stop_after: self.stop_after - 1,
            ..self.clone()
        })
    }

    /// Scrape the current page and every article it lists.
    ///
    /// # Returns
    ///
    /// A [`FeedResult`] holding the outbound links found in the articles, an
    /// error record per article page that failed, the scraper for the next
    /// page (none once the budget is spent or no next link exists) and this
    /// page's checkpoint state.
    ///
    /// # Errors
    ///
    /// Only a failure to fetch or parse the feed page itself.
    #[instrument(
        level = "info",
        skip_all,
        fields(name = %self.name, url = %self.url, stop_after = self.stop_after)
    )]
    pub async fn fetch_links(&self, fetcher: &dyn PageFetcher) -> Result<FeedResult, Failure> {
        let base = Url::parse(&self.url)
            .map_err(|e| Failure::InvalidUrl(format!("{}: {e}", self.url)))?;
        let page = fetcher.fetch(&self.url, None).await?;
        let entries = select_all(&page, Some(&base), &self.sel.entries, "href")?;
        let next = select_one(&page, Some(&base), &self.sel.next, "href")?;
        debug!(entries = entries.len(), next = ?next, "Parsed feed page");

        let mut batch = LinkBatch::new();
        for article_url in &entries {
            match self.article_links(fetcher, article_url).await {
                Ok(links) => {
                    for link in links {
                        batch.append_link(link, article_url.as_str(), self.fake_news);
                    }
                }
                Err(failure) => {
                    warn!(url = %article_url, error = %failure, "Article page skipped");
                    batch.append_error(ErrorRecord::from_failure(
                        &failure,
                        article_url,
                        Some(&self.url),
                        self.fake_news,
                    ));
                }
            }
        }

        let successor = next.and_then(|n| self.next_page(n));
        let state = self.to_state(successor.is_none());
        info!(
            links = batch.links.len(),
            errors = batch.errors.len(),
            has_successor = successor.is_some(),
            "Feed page scraped"
        );
        Ok(FeedResult {
            batch,
            successor,
            state,
        })
    }

    async fn article_links(
        &self,
        fetcher: &dyn PageFetcher,
        article_url: &str,
    ) -> Result<Vec<String>, Failure> {
        let base = Url::parse(article_url)
            .map_err(|e| Failure::InvalidUrl(format!("{article_url}: {e}")))?;
        let page = fetcher.fetch(article_url, None).await?;
        select_all(&page, Some(&base), &self.sel.links, "href")
    }
}
