//! Run configuration.
//!
//! Loaded from a YAML file (JSON is valid YAML too):
//!
//! ```yaml
//! backup: state/backup.json
//! database: harvest.sqlite
//! registry: sources.yaml
//! lookup: domain
//! dispatch:
//!   limit_per_host: 2
//!   timeout_secs: 60
//!   restore_timeout_secs: 300
//!   channel_capacity: 8
//!   dedup_scope: run
//! rules:
//!   min_title_len: 10
//!   url_blacklist: ["/video/"]
//! sources:
//!   - type: html
//!     name: arctic
//!     url: https://arctic.example/news
//!     sel: { next: "a.next", entries: "h2 > a", links: "article a" }
//!     stop_after: 20
//!     fake_news: true
//! aggregator:
//!   num_posts: 500
//!   channels: { conspiracy: true, news: false }
//! ```

use crate::cli::Mode;
use crate::dispatch::{ArticleRules, DedupScope, RuleSettings};
use crate::errors::{AppError, AppResult};
use crate::html::parse_selector;
use crate::models::Checkpoint;
use crate::reliability::LookupMode;
use crate::scrapers::aggregator::AggregatorSettings;
use crate::scrapers::{RecoverError, SiteFeed};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

fn default_database() -> PathBuf {
    PathBuf::from("newsharvest.sqlite")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub limit_per_host: usize,
    pub timeout_secs: u64,
    pub restore_timeout_secs: u64,
    pub channel_capacity: usize,
    pub dedup_scope: DedupScope,
    pub max_in_flight: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            limit_per_host: 2,
            timeout_secs: 60,
            restore_timeout_secs: 300,
            channel_capacity: 8,
            dedup_scope: DedupScope::Run,
            max_in_flight: 64,
        }
    }
}

impl DispatchSettings {
    pub fn timeout(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Restore => Duration::from_secs(self.restore_timeout_secs),
            Mode::Crawl | Mode::Aggregate => Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Html(SiteFeed),
}

impl SourceConfig {
    pub fn feed(&self) -> &SiteFeed {
        match self {
            SourceConfig::Html(feed) => feed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backup: Option<PathBuf>,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub registry: Option<PathBuf>,
    #[serde(default)]
    pub lookup: LookupMode,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub rules: RuleSettings,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
}

impl AppConfig {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        info!(
            sources = config.sources.len(),
            channels = config.aggregator.channels.len(),
            "Loaded config"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Check everything that would otherwise fail half-way through a run.
    pub fn validate(&self, mode: Mode) -> AppResult<()> {
        ArticleRules::from_settings(&self.rules)?;

        let mut names = HashSet::new();
        for feed in self.sources.iter().map(SourceConfig::feed) {
            if !names.insert(feed.name.as_str()) {
                return Err(AppError::Config(format!("duplicate source name {}", feed.name)));
            }
            for selector in [&feed.sel.next, &feed.sel.entries, &feed.sel.links] {
                parse_selector(selector).map_err(|_| AppError::InvalidSelector {
                    source_name: feed.name.clone(),
                    selector: selector.clone(),
                })?;
            }
        }

        if self.dispatch.channel_capacity == 0 {
            return Err(AppError::Config("dispatch.channel_capacity must be positive".into()));
        }

        match mode {
            Mode::Crawl if self.sources.is_empty() => Err(AppError::NoSources),
            Mode::Aggregate if self.aggregator.channels.is_empty() => Err(AppError::NoSources),
            _ => Ok(()),
        }
    }

    /// Configured feeds, resumed from `checkpoint` where possible. Exhausted
    /// feeds are left out.
    pub fn feeds(&self, checkpoint: &Checkpoint) -> Vec<SiteFeed> {
        let mut feeds = Vec::new();
        for configured in self.sources.iter().map(SourceConfig::feed) {
            let mut feed = configured.clone();
            let Some(state) = checkpoint.get(&feed.name) else {
                feeds.push(feed);
                continue;
            };
            match feed.recover_state(state) {
                Ok(()) => {
                    info!(
                        name = %feed.name,
                        url = %feed.url,
                        stop_after = feed.stop_after,
                        "Resuming feed"
                    );
                    feeds.push(feed);
                }
                Err(RecoverError::Exhausted(name)) => info!(%name, "Feed exhausted, skipping"),
                Err(e @ RecoverError::WrongShape(_)) => {
                    warn!(error = %e, "Ignoring checkpoint");
                    feeds.push(feed);
                }
            }
        }
        feeds
    }
}
