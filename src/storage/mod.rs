//! Persistence of articles and errors.
//!
//! [`Storage`] is the seam the pipeline writes through; [`SqliteStorage`] is
//! the bundled implementation. The two consumer loops below drain the
//! dispatcher's outbound channels into it.

pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::errors::{ErrorKind, Failure, StoreError};
use crate::models::{Article, ErrorRecord};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert every article, returning the stored URL or the rejection per item.
    async fn store_articles(&self, articles: &[Article]) -> Vec<Result<String, StoreError>>;

    async fn store_errors(&self, errors: &[ErrorRecord]) -> Result<(), StoreError>;

    /// Error rows of one polarity whose kind is not in `exclude`.
    async fn select_errors(
        &self,
        fake: bool,
        exclude: &[ErrorKind],
    ) -> Result<Vec<ErrorRecord>, StoreError>;

    /// Remove older rows sharing a URL, then rows whose URL has since been
    /// stored as an article. Returns both counts.
    async fn delete_resolved_and_duplicate_errors(&self) -> Result<(usize, usize), StoreError>;
}

/// Store article lists until the channel closes. Rejected articles are
/// turned into error records.
#[instrument(level = "info", skip_all)]
pub async fn store_articles(
    storage: &dyn Storage,
    mut rx: mpsc::Receiver<Vec<Article>>,
    errors: mpsc::Sender<ErrorRecord>,
) -> usize {
    let mut stored = 0;
    while let Some(articles) = rx.recv().await {
        info!(count = articles.len(), "Received articles");
        let results = storage.store_articles(&articles).await;
        for (article, result) in articles.iter().zip(results) {
            match result {
                Ok(url) => {
                    stored += 1;
                    info!("stored {url}");
                }
                Err(e) => {
                    let failure = Failure::from(e);
                    if errors.send(ErrorRecord::for_article(&failure, article)).await.is_err() {
                        warn!(url = %article.url, "Error receiver dropped");
                    }
                }
            }
        }
    }
    stored
}

/// Persist error records until the channel closes. A record that cannot be
/// written is logged and dropped.
#[instrument(level = "info", skip_all)]
pub async fn store_errors(storage: &dyn Storage, mut rx: mpsc::Receiver<ErrorRecord>) -> usize {
    let mut stored = 0;
    while let Some(record) = rx.recv().await {
        info!(
            "error stored {} {}{}",
            record.url,
            record.kind,
            record
                .info
                .as_deref()
                .map(|i| format!(" ({})", truncate_for_log(i, 200)))
                .unwrap_or_default()
        );
        match storage.store_errors(std::slice::from_ref(&record)).await {
            Ok(()) => stored += 1,
            Err(e) => error!(url = %record.url, error = %e, "Failed to store error"),
        }
    }
    stored
}
