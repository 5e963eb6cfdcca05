//! The dispatcher: consumer loop turning link batches into articles.
//!
//! For every [`LinkBatch`] received:
//!
//! 1. crawl-side errors carried by the batch go straight to the error sink
//! 2. links rejected by the pre-fetch classifier are dropped
//! 3. the remaining links are resolved concurrently, at most
//!    `limit_per_host` at a time per host; links queued behind a busy host
//!    do not count against `max_in_flight`
//! 4. each resolved article runs through the post-fetch classifier (archived
//!    links only), the [`DuplicateChecker`] and the [`ArticleRules`]; failures
//!    become [`ErrorRecord`]s, rejections are dropped silently
//! 5. surviving articles are sent as one message, then the batch checkpoint is
//!    merged into the backup file
//!
//! The loop ends when every producer sender is dropped and the channel drained.

pub mod dedup;
pub mod host_limit;
pub mod rules;

pub use dedup::DuplicateChecker;
pub use host_limit::HostLimiter;
pub use rules::{ArticleRules, RuleSettings};

use crate::backup::BackupManager;
use crate::classifier::LinkClassifier;
use crate::models::{Article, ErrorRecord, LinkBatch, LinkCandidate};
use crate::resolver::ArticleResolver;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, instrument, warn};

/// How long the duplicate sets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    #[default]
    Run,
    Batch,
}

/// Outbound channels of the dispatcher.
#[derive(Debug, Clone)]
pub struct Sinks {
    pub articles: mpsc::Sender<Vec<Article>>,
    pub errors: mpsc::Sender<ErrorRecord>,
}

impl Sinks {
    async fn error(&self, record: ErrorRecord) {
        if self.errors.send(record).await.is_err() {
            warn!("Error receiver dropped");
        }
    }
}

/// Counters for one batch, or summed over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub links: usize,
    pub rejected: usize,
    pub failed: usize,
    pub dropped: usize,
    pub accepted: usize,
}

impl std::ops::AddAssign for DispatchStats {
    fn add_assign(&mut self, other: Self) {
        self.links += other.links;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.dropped += other.dropped;
        self.accepted += other.accepted;
    }
}

pub struct Dispatcher {
    classifier: LinkClassifier,
    resolver: ArticleResolver,
    rules: ArticleRules,
    dedup: DuplicateChecker,
    limiter: HostLimiter,
    backup: BackupManager,
    scope: DedupScope,
    max_in_flight: usize,
}

impl Dispatcher {
    pub fn new(
        classifier: LinkClassifier,
        resolver: ArticleResolver,
        rules: ArticleRules,
        backup: BackupManager,
        limit_per_host: usize,
        scope: DedupScope,
    ) -> Self {
        Self {
            classifier,
            resolver,
            rules,
            dedup: DuplicateChecker::new(),
            limiter: HostLimiter::new(limit_per_host),
            backup,
            scope,
            max_in_flight: 64,
        }
    }

    /// Cap on resolutions polled at once across all hosts.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    #[cfg(test)]
    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    /// Consume batches until the channel is closed and drained.
    #[instrument(level = "info", skip_all)]
    pub async fn run(mut self, mut rx: mpsc::Receiver<LinkBatch>, sinks: Sinks) -> DispatchStats {
        info!(
            limit_per_host = self.limiter.limit(),
            timeout_secs = self.resolver.timeout().as_secs(),
            scope = ?self.scope,
            "Dispatcher ready"
        );
        let mut total = DispatchStats::default();
        let mut batches = 0usize;
        while let Some(batch) = rx.recv().await {
            batches += 1;
            total += self.process_batch(batch, &sinks).await;
        }
        info!(
            batches,
            links = total.links,
            accepted = total.accepted,
            failed = total.failed,
            seen = self.dedup.len(),
            checkpoints = self.backup.state().len(),
            "Dispatcher drained"
        );
        total
    }

    /// Classify, resolve, validate and flush one batch.
    ///
    /// The checkpoint carried by the batch is stored only after every
    /// resolution in it has settled.
    #[instrument(
        level = "info",
        skip_all,
        fields(links = batch.links.len(), errors = batch.errors.len())
    )]
    pub async fn process_batch(&mut self, batch: LinkBatch, sinks: &Sinks) -> DispatchStats {
        let mut stats = DispatchStats {
            links: batch.links.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return stats;
        }

        for record in batch.errors.iter().cloned() {
            sinks.error(record).await;
        }

        let accepted: Vec<LinkCandidate> = batch
            .candidates()
            .filter(|c| {
                let keep = self.classifier.pre_fetch(&c.url, c.fake);
                if !keep {
                    debug!(url = %c.url, fake = c.fake, "Link rejected before fetch");
                }
                keep
            })
            .collect();
        stats.rejected = stats.links - accepted.len();

        // A link waiting on its host holds no global slot.
        let in_flight = Semaphore::new(self.max_in_flight);
        let (this, in_flight) = (&*self, &in_flight);
        let mut resolved: FuturesUnordered<_> = accepted
            .into_iter()
            .map(|candidate| async move {
                let _host = this.limiter.acquire(&candidate.url).await;
                let _slot = in_flight.acquire().await.ok();
                let result = this.resolver.resolve(&candidate).await;
                (candidate, result)
            })
            .collect();

        let mut articles = Vec::new();
        while let Some((candidate, result)) = resolved.next().await {
            match result {
                Ok(article) => match self.validate(article) {
                    Some(article) => articles.push(article),
                    None => stats.dropped += 1,
                },
                Err(failure) => {
                    stats.failed += 1;
                    debug!(url = %candidate.url, error = %failure, "Resolution failed");
                    sinks.error(ErrorRecord::for_candidate(&failure, &candidate)).await;
                }
            }
        }
        drop(resolved);

        stats.accepted = articles.len();
        if !articles.is_empty() && sinks.articles.send(articles).await.is_err() {
            warn!("Article receiver dropped");
        }

        if !batch.checkpoint.is_empty() {
            if let Err(e) = self.backup.store(batch.checkpoint).await {
                error!(error = %e, "Failed to write backup");
            }
        }

        if self.scope == DedupScope::Batch {
            self.dedup.flush();
        }

        info!(
            accepted = stats.accepted,
            failed = stats.failed,
            rejected = stats.rejected,
            dropped = stats.dropped,
            "Batch dispatched"
        );
        stats
    }

    /// Post-fetch classification, dedup and rules, in that order.
    fn validate(&self, article: Article) -> Option<Article> {
        if article.archived() && !self.classifier.is_valid(&article.url, article.fake, true) {
            debug!(url = %article.url, visited = %article.visited_url, "Archived target rejected");
            return None;
        }
        if !self.dedup.is_valid(&article) {
            debug!(url = %article.url, "Duplicate dropped");
            return None;
        }
        if !self.rules.pass_checks(&article) {
            return None;
        }
        Some(article)
    }
}
