//! Replay of persisted failures.
//!
//! Instead of crawling, the restore producer reads back the error table and
//! feeds the failed links to the dispatcher as a single batch. Duplicates and
//! non-2xx answers are left out since retrying them cannot succeed.

use crate::errors::{ErrorKind, StoreError};
use crate::models::LinkBatch;
use crate::storage::Storage;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Build the replay batch from stored error rows.
///
/// Rows of both polarities are read; kinds that a retry cannot fix
/// ([`ErrorKind::not_worth_retrying`]) are left out. Each row becomes a link
/// candidate carrying its original source and fake flag.
///
/// # Returns
///
/// The number of links sent, `0` when there was nothing to replay.
#[instrument(level = "info", skip_all)]
pub async fn restore_errors(
    storage: &dyn Storage,
    tx: mpsc::Sender<LinkBatch>,
) -> Result<usize, StoreError> {
    let skip = ErrorKind::not_worth_retrying();
    let mut batch = LinkBatch::new();
    for fake in [true, false] {
        let rows = storage.select_errors(fake, &skip).await?;
        info!(fake, rows = rows.len(), "Error rows selected for replay");
        for row in rows {
            let origin = row.source.unwrap_or_default();
            batch.append_link(row.url, origin, row.fake);
        }
    }

    let links = batch.links.len();
    if links == 0 {
        info!("Nothing to restore");
        return Ok(0);
    }
    if tx.send(batch).await.is_err() {
        warn!("Link receiver dropped before replay");
        return Ok(0);
    }
    Ok(links)
}

/// Best-effort removal of stale error rows after a replay.
#[instrument(level = "info", skip_all)]
pub async fn cleanup_errors(storage: &dyn Storage) {
    match storage.delete_resolved_and_duplicate_errors().await {
        Ok((duplicates, resolved)) => info!(duplicates, resolved, "Stale errors removed"),
        Err(e) => warn!(error = %e, "Error cleanup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Failure;
    use crate::models::ErrorRecord;
    use crate::storage::SqliteStorage;

    fn record(failure: Failure, url: &str, fake: bool) -> ErrorRecord {
        ErrorRecord::from_failure(&failure, url, Some("https://feed.example/1"), fake)
    }

    #[tokio::test]
    async fn test_replays_retryable_errors_of_both_polarities() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .store_errors(&[
                record(Failure::Timeout("a".into()), "https://a.example/1", true),
                record(Failure::Network("b".into()), "https://b.example/1", false),
                record(Failure::UniqueViolation("c".into()), "https://c.example/1", true),
                record(
                    Failure::HttpStatus {
                        url: "d".into(),
                        status: 500,
                    },
                    "https://d.example/1",
                    false,
                ),
            ])
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(restore_errors(&storage, tx).await.unwrap(), 2);

        let batch = rx.recv().await.unwrap();
        let fake_link = &batch.links["https://a.example/1"];
        assert!(fake_link.fake);
        assert_eq!(fake_link.origin, "https://feed.example/1");
        assert!(!batch.links["https://b.example/1"].fake);
        assert!(batch.checkpoint.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_table_sends_nothing() {
        let storage = SqliteStorage::in_memory().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        assert_eq!(restore_errors(&storage, tx).await.unwrap(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_is_best_effort() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage
            .store_errors(&[
                record(Failure::Timeout("1".into()), "https://a.example/1", true),
                record(Failure::Timeout("2".into()), "https://a.example/1", true),
            ])
            .await
            .unwrap();
        cleanup_errors(&storage).await;
        assert_eq!(storage.select_errors(true, &[]).await.unwrap().len(), 1);
    }
}
