//! Wiring of one run.
//!
//! ```text
//!  producer ──links──▶ dispatcher ──articles──▶ store_articles
//!                          │                        │
//!                          └──────errors──────▶ store_errors
//! ```
//!
//! The producer runs on the current task. Once it returns, its sender is
//! dropped and each consumer finishes after draining its channel, in
//! pipeline order.

use crate::backup::BackupManager;
use crate::classifier::LinkClassifier;
use crate::cli::Mode;
use crate::config::AppConfig;
use crate::crawl::collect_links;
use crate::dispatch::{ArticleRules, Dispatcher, Sinks};
use crate::errors::AppResult;
use crate::extract::{ContentExtractor, HtmlExtractor};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::models::Checkpoint;
use crate::reliability::ReliabilityIndex;
use crate::resolver::ArticleResolver;
use crate::restore::{cleanup_errors, restore_errors};
use crate::scrapers::aggregator::collect_links_aggregator;
use crate::storage::{self, SqliteStorage, Storage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Collaborators a run is built from.
pub struct Services {
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub storage: Arc<dyn Storage>,
    pub index: ReliabilityIndex,
}

impl Services {
    /// Real network fetcher, HTML extractor and SQLite storage from `config`.
    pub fn from_config(config: &AppConfig, mode: Mode) -> AppResult<Self> {
        let index = match &config.registry {
            Some(path) => ReliabilityIndex::load(path, config.lookup)?,
            None => {
                warn!("No source registry configured, only archive mirrors are labelled");
                ReliabilityIndex::from_registry(std::iter::empty(), config.lookup)
            }
        };
        let storage = SqliteStorage::new(&config.database)?;
        let fetcher = HttpFetcher::new(config.dispatch.timeout(mode))?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(HtmlExtractor),
            storage: Arc::new(storage),
            index,
        })
    }
}

/// Load config-derived services and run. Returns the producer's elapsed time.
pub async fn run(config: AppConfig, mode: Mode) -> AppResult<Duration> {
    config.validate(mode)?;
    let services = Services::from_config(&config, mode)?;
    run_with(config, mode, services).await
}

/// Run one job with the given collaborators.
///
/// # Arguments
///
/// * `config` - Validated run configuration
/// * `mode` - Which producer feeds the dispatcher
/// * `services` - Fetcher, extractor, storage and reliability index
///
/// # Returns
///
/// The producer's elapsed time. Consumers are drained before returning.
#[instrument(level = "info", skip_all, fields(?mode))]
pub async fn run_with(config: AppConfig, mode: Mode, services: Services) -> AppResult<Duration> {
    let checkpoint = match &config.backup {
        Some(path) => BackupManager::load(path).await?,
        None => Checkpoint::new(),
    };
    let backup = BackupManager::new(config.backup.clone(), checkpoint.clone());

    let resolver = ArticleResolver::new(
        services.fetcher.clone(),
        services.extractor.clone(),
        config.dispatch.timeout(mode),
    );
    let dispatcher = Dispatcher::new(
        LinkClassifier::new(services.index),
        resolver,
        ArticleRules::from_settings(&config.rules)?,
        backup,
        config.dispatch.limit_per_host,
        config.dispatch.dedup_scope,
    )
    .with_max_in_flight(config.dispatch.max_in_flight);

    let capacity = config.dispatch.channel_capacity;
    let (links_tx, links_rx) = mpsc::channel(capacity);
    let (articles_tx, articles_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);

    let errors_consumer = {
        let storage = services.storage.clone();
        tokio::spawn(async move { storage::store_errors(storage.as_ref(), errors_rx).await })
    };
    let articles_consumer = {
        let storage = services.storage.clone();
        let errors = errors_tx.clone();
        tokio::spawn(async move {
            storage::store_articles(storage.as_ref(), articles_rx, errors).await
        })
    };
    let dispatch = tokio::spawn(dispatcher.run(
        links_rx,
        Sinks {
            articles: articles_tx,
            errors: errors_tx,
        },
    ));

    let t0 = Instant::now();
    match mode {
        Mode::Crawl => {
            let feeds = config.feeds(&checkpoint);
            if feeds.is_empty() {
                info!("Every feed is exhausted, nothing to crawl");
            }
            let waves = collect_links(feeds, services.fetcher.as_ref(), links_tx).await;
            info!(waves, "Crawl finished");
        }
        Mode::Aggregate => {
            collect_links_aggregator(&config.aggregator, services.fetcher.as_ref(), links_tx).await;
        }
        Mode::Restore => {
            let links = restore_errors(services.storage.as_ref(), links_tx).await?;
            info!(links, "Replay queued");
        }
    }
    let elapsed = t0.elapsed();

    let stats = dispatch.await?;
    let stored = articles_consumer.await?;
    let errors = errors_consumer.await?;
    info!(
        accepted = stats.accepted,
        stored,
        errors,
        elapsed_secs = elapsed.as_secs_f64(),
        "Pipeline drained"
    );

    if mode == Mode::Restore {
        cleanup_errors(services.storage.as_ref()).await;
    }
    Ok(elapsed)
}
