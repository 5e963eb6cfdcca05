//! Link producers.
//!
//! Two kinds of scrapers feed the dispatcher with [`LinkBatch`]es:
//!
//! | Scraper | Module | Stateful | Notes |
//! |---------|--------|----------|-------|
//! | Paginated HTML feed | [`site_feed`] | yes | walks `next` links page by page, resumable |
//! | Social aggregator | [`aggregator`] | no | one terminal batch per channel |
//!
//! Feed scrapers are immutable values: a successful [`SiteFeed::fetch_links`]
//! returns the scraper for the next page (if any) instead of mutating itself.
//!
//! [`LinkBatch`]: crate::models::LinkBatch
//! [`SiteFeed::fetch_links`]: site_feed::SiteFeed::fetch_links

pub mod aggregator;
pub mod site_feed;

pub use site_feed::{RecoverError, SiteFeed};
