//! Social aggregator producer.
//!
//! Reads the top posts of each configured channel from a Reddit-style JSON
//! listing (`/r/{channel}/top.json`) and emits one [`LinkBatch`] per channel.
//! Every link inherits the channel's fake flag and the channel page as origin.
//!
//! The aggregator keeps no state: each channel ends with a terminal
//! checkpoint `{is_over: true, data: {posts: n}}`.

use crate::errors::Failure;
use crate::fetch::PageFetcher;
use crate::models::{CheckpointData, ErrorRecord, LinkBatch, ScraperState};
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const MAX_PAGE_SIZE: usize = 100;

fn default_base_url() -> String {
    "https://www.reddit.com".into()
}

fn default_num_posts() -> usize {
    1000
}

fn default_time_filter() -> String {
    "year".into()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AggregatorSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_num_posts")]
    pub num_posts: usize,
    #[serde(default = "default_time_filter")]
    pub time_filter: String,
    /// Channel name -> fake flag.
    #[serde(default)]
    pub channels: BTreeMap<String, bool>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            num_posts: default_num_posts(),
            time_filter: default_time_filter(),
            channels: BTreeMap::new(),
        }
    }
}

impl AggregatorSettings {
    pub fn channel_origin(&self, channel: &str) -> String {
        format!("{}/r/{channel}/", self.base_url.trim_end_matches('/'))
    }

    fn listing_url(&self, channel: &str, limit: usize, after: Option<&str>) -> String {
        let mut url = format!(
            "{}top.json?t={}&limit={limit}",
            self.channel_origin(channel),
            urlencoding::encode(&self.time_filter)
        );
        if let Some(after) = after {
            url.push_str("&after=");
            url.push_str(&urlencoding::encode(after));
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    is_self: bool,
}

impl Post {
    fn external_url(&self, base_url: &str) -> Option<&str> {
        let url = self.url.as_deref()?.trim();
        let absolute_permalink = format!("{}{}", base_url.trim_end_matches('/'), self.permalink);
        if self.is_self || url.is_empty() || url == self.permalink || url == absolute_permalink {
            None
        } else {
            Some(url)
        }
    }
}

/// Collect one channel. A listing failure ends the channel early and is
/// reported alongside the links gathered so far.
#[instrument(level = "info", skip(settings, fetcher))]
async fn collect_channel(
    settings: &AggregatorSettings,
    fetcher: &dyn PageFetcher,
    channel: &str,
    fake: bool,
) -> LinkBatch {
    let origin = settings.channel_origin(channel);
    let mut batch = LinkBatch::new();
    let mut seen = 0usize;
    let mut posts = 0usize;
    let mut after: Option<String> = None;

    while seen < settings.num_posts {
        let limit = (settings.num_posts - seen).min(MAX_PAGE_SIZE);
        let url = settings.listing_url(channel, limit, after.as_deref());
        let listing = match fetch_listing(fetcher, &url).await {
            Ok(listing) => listing,
            Err(failure) => {
                warn!(%url, error = %failure, "Listing unavailable");
                batch.append_error(ErrorRecord::from_failure(&failure, &url, Some(&origin), fake));
                break;
            }
        };

        let page_len = listing.data.children.len();
        for child in listing.data.children.iter().take(settings.num_posts - seen) {
            seen += 1;
            if let Some(link) = child.data.external_url(&settings.base_url) {
                batch.append_link(link, origin.as_str(), fake);
                posts += 1;
            }
        }

        after = listing.data.after;
        if page_len == 0 || after.is_none() {
            break;
        }
    }

    info!(posts, seen, "Channel collected");
    batch.append_state(
        channel,
        ScraperState {
            is_over: true,
            data: CheckpointData::Posts { posts },
        },
    );
    batch
}

async fn fetch_listing(fetcher: &dyn PageFetcher, url: &str) -> Result<Listing, Failure> {
    let body = fetcher.fetch(url, None).await?;
    serde_json::from_str(&body).map_err(|e| Failure::Extraction(format!("{url}: {e}")))
}

/// Send one batch per configured channel, in channel-name order.
///
/// # Arguments
///
/// * `settings` - Listing origin, post budget and channel polarities
/// * `fetcher` - Page source for the JSON listings
/// * `tx` - Link channel to the dispatcher
///
/// Every batch ends with a terminal `{ is_over: true, data: { posts } }`
/// state for its channel, also when the listing failed part way.
#[instrument(level = "info", skip_all, fields(channels = settings.channels.len()))]
pub async fn collect_links_aggregator(
    settings: &AggregatorSettings,
    fetcher: &dyn PageFetcher,
    tx: mpsc::Sender<LinkBatch>,
) {
    for (channel, fake) in &settings.channels {
        let batch = collect_channel(settings, fetcher, channel, *fake).await;
        if tx.send(batch).await.is_err() {
            warn!("Link receiver dropped, stopping aggregator");
            return;
        }
    }
}
