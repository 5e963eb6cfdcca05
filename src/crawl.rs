//! Wave-based link collection.
//!
//! All live feed scrapers are driven concurrently, one page each, and the
//! wave waits for every one of them before the successors start. Each wave
//! is sent as a single [`LinkBatch`] so a slow dispatcher throttles crawling
//! at wave granularity.

use crate::fetch::PageFetcher;
use crate::models::{ErrorRecord, LinkBatch};
use crate::scrapers::SiteFeed;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Walk every feed until no successor is left.
///
/// Each wave calls [`SiteFeed::fetch_links`] on every live feed at once and
/// waits for all of them before merging their links, errors and checkpoint
/// states into one [`LinkBatch`]. The send blocks while the channel is full,
/// so a slow dispatcher holds back the next wave.
///
/// # Arguments
///
/// * `feeds` - Feeds of the first wave, already recovered from the backup
/// * `fetcher` - Page source shared by every feed
/// * `tx` - Link channel to the dispatcher
///
/// # Returns
///
/// The number of waves sent. The walk stops early if the receiver is gone.
#[instrument(level = "info", skip_all, fields(feeds = feeds.len()))]
pub async fn collect_links(
    feeds: Vec<SiteFeed>,
    fetcher: &dyn PageFetcher,
    tx: mpsc::Sender<LinkBatch>,
) -> usize {
    let mut live = feeds;
    let mut waves = 0;

    while !live.is_empty() {
        waves += 1;
        let names: Vec<&str> = live.iter().map(|f| f.name.as_str()).collect();
        info!(wave = waves, scrapers = ?names, "Starting wave");

        let results = join_all(live.iter().map(|feed| feed.fetch_links(fetcher))).await;

        let mut batch = LinkBatch::new();
        let mut next_wave = Vec::new();
        for (feed, result) in live.iter().zip(results) {
            match result {
                Ok(result) => {
                    batch.merge(result.batch);
                    batch.append_state(feed.name.as_str(), result.state);
                    next_wave.extend(result.successor);
                }
                Err(failure) => {
                    warn!(name = %feed.name, url = %feed.url, error = %failure, "Feed page failed");
                    batch.append_error(ErrorRecord::from_failure(
                        &failure,
                        &feed.url,
                        None,
                        feed.fake_news,
                    ));
                }
            }
        }

        info!(
            wave = waves,
            links = batch.links.len(),
            errors = batch.errors.len(),
            next = next_wave.len(),
            "Wave collected"
        );
        if tx.send(batch).await.is_err() {
            warn!("Link receiver dropped, stopping crawl");
            break;
        }
        live = next_wave;
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Failure;
    use crate::fetch::testing::StaticFetcher;
    use crate::models::{CheckpointData, ScraperState};
    use crate::scrapers::site_feed::tests::{article_page, feed_page, selectors};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_two_page_feed_end_to_end() {
        let fetcher = StaticFetcher::new()
            .page("https://feed.example/page/1", feed_page(&["/story/1"], Some("/page/2")))
            .page("https://feed.example/page/2", feed_page(&["/story/2"], Some("/page/3")))
            .page("https://feed.example/story/1", article_page(&["https://src.example/one"]))
            .page("https://feed.example/story/2", article_page(&["https://src.example/two"]));
        let feed = SiteFeed::new("feed", "https://feed.example/page/1", selectors(), 1, true);

        let (tx, mut rx) = mpsc::channel(4);
        let waves = collect_links(vec![feed], &fetcher, tx).await;
        assert_eq!(waves, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.links.len(), 1);
        assert_eq!(
            first.checkpoint["feed"],
            ScraperState {
                is_over: false,
                data: CheckpointData::Page {
                    url: "https://feed.example/page/1".into(),
                    page: 1
                }
            }
        );

        let second = rx.recv().await.unwrap();
        assert!(second.links.contains_key("https://src.example/two"));
        assert_eq!(
            second.checkpoint["feed"],
            ScraperState {
                is_over: true,
                data: CheckpointData::Page {
                    url: "https://feed.example/page/2".into(),
                    page: 0
                }
            }
        );
        assert!(rx.recv().await.is_none());
        assert_eq!(fetcher.call_count("https://feed.example/page/3"), 0);
    }

    #[tokio::test]
    async fn test_failed_feed_drops_out_without_state() {
        let fetcher = StaticFetcher::new()
            .page("https://good.example/1", feed_page(&[], None))
            .failing("https://bad.example/1", Failure::Network("https://bad.example/1".into()));
        let feeds = vec![
            SiteFeed::new("good", "https://good.example/1", selectors(), 3, false),
            SiteFeed::new("bad", "https://bad.example/1", selectors(), 3, true),
        ];

        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(collect_links(feeds, &fetcher, tx).await, 1);

        let batch = rx.recv().await.unwrap();
        assert!(batch.checkpoint.contains_key("good"));
        assert!(!batch.checkpoint.contains_key("bad"));
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].url, "https://bad.example/1");
        assert!(batch.errors[0].fake);
    }

    #[tokio::test]
    async fn test_wave_barrier_runs_feeds_of_different_lengths() {
        let fetcher = StaticFetcher::new()
            .page("https://a.example/1", feed_page(&[], Some("/2")))
            .page("https://a.example/2", feed_page(&[], Some("/3")))
            .page("https://a.example/3", feed_page(&[], None))
            .page("https://b.example/1", feed_page(&[], None));
        let feeds = vec![
            SiteFeed::new("a", "https://a.example/1", selectors(), 10, false),
            SiteFeed::new("b", "https://b.example/1", selectors(), 10, false),
        ];

        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(collect_links(feeds, &fetcher, tx).await, 3);

        let names: Vec<Vec<String>> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|b| b.checkpoint.into_keys().collect())
        .collect();
        assert_eq!(names, vec![vec!["a", "b"], vec!["a"], vec!["a"]]);
    }

    #[tokio::test]
    async fn test_full_channel_blocks_the_next_wave() {
        let mut fetcher = StaticFetcher::new();
        for i in 1..=5 {
            fetcher = fetcher.page(
                &format!("https://feed.example/{i}"),
                feed_page(&[], Some(&format!("/{}", i + 1))),
            );
        }
        let fetcher = Arc::new(fetcher);
        let feed = SiteFeed::new("feed", "https://feed.example/1", selectors(), 4, false);

        let (tx, mut rx) = mpsc::channel(1);
        let crawler = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { collect_links(vec![feed], fetcher.as_ref(), tx).await })
        };

        // wave 1 is taken, wave 2 fills the channel, wave 3 waits on send
        let first = rx.recv().await.unwrap();
        assert!(!first.checkpoint["feed"].is_over);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!crawler.is_finished());
        assert_eq!(fetcher.calls().len(), 3);

        drop(rx);
        assert_eq!(crawler.await.unwrap(), 3);
    }
}
