//! # newsharvest
//!
//! A resumable news-link harvester. It walks paginated news feeds (or the top
//! posts of aggregator channels), follows the links found inside each
//! article, keeps only links whose source reliability matches the polarity of
//! the feed that found them, resolves archive mirrors back to their original
//! URL, extracts the article and stores it.
//!
//! ## Usage
//!
//! ```sh
//! newsharvest -c harvest.yaml                  # crawl HTML feeds
//! newsharvest -c harvest.yaml --mode aggregate # aggregator channels
//! newsharvest -c harvest.yaml --mode restore   # replay stored failures
//! ```
//!
//! ## Architecture
//!
//! 1. **Producing**: feed scrapers run in waves, one page per feed per wave
//! 2. **Dispatching**: each wave is classified, resolved with at most two
//!    requests per host, deduplicated and filtered
//! 3. **Storing**: articles and errors are written to SQLite; feed positions
//!    are checkpointed to a JSON backup after every wave
//!
//! A run always exits cleanly: configuration failures are logged and reported
//! as a zero-length run.

use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod backup;
mod classifier;
mod cli;
mod config;
mod crawl;
mod dispatch;
mod errors;
mod extract;
mod fetch;
mod html;
mod models;
mod pipeline;
mod reliability;
mod resolver;
mod restore;
mod scrapers;
mod storage;
mod utils;

use cli::Cli;
use config::AppConfig;
use errors::AppResult;

#[tokio::main]
async fn main() {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    info!(config = %args.config.display(), mode = ?args.mode, "newsharvest starting up");

    let elapsed = match start(args).await {
        Ok(elapsed) => elapsed,
        Err(e) => {
            error!(error = %e, "Run aborted");
            Duration::ZERO
        }
    };
    info!("job executed in {:.2} seconds", elapsed.as_secs_f64());
}

async fn start(args: Cli) -> AppResult<Duration> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(backup) = args.backup {
        config.backup = Some(backup);
    }
    pipeline::run(config, args.mode).await
}
