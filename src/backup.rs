//! Checkpoint persistence.
//!
//! The backup file is a pretty-printed JSON object keyed by scraper name:
//!
//! ```text
//! {
//!   "feed": { "is_over": false, "data": { "url": "https://...", "page": 3 } },
//!   "conspiracy": { "is_over": true, "data": { "posts": 120 } }
//! }
//! ```
//!
//! Every write merges the wave's rows into the in-memory state and rewrites
//! the whole file, so a crash loses at most the wave in flight.

use crate::errors::AppResult;
use crate::models::Checkpoint;
use crate::utils::ensure_parent_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Default)]
pub struct BackupManager {
    path: Option<PathBuf>,
    state: Checkpoint,
}

impl BackupManager {
    /// `path = None` keeps checkpoints in memory only.
    pub fn new(path: Option<PathBuf>, initial: Checkpoint) -> Self {
        Self { path, state: initial }
    }

    /// Read a backup file.
    ///
    /// # Arguments
    ///
    /// * `path` - JSON file written by [`BackupManager::store`]
    ///
    /// # Returns
    ///
    /// The saved checkpoint, or an empty one when the file is missing or
    /// blank. Unreadable or malformed files are an error.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> AppResult<Checkpoint> {
        match fs::read_to_string(path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Checkpoint::new()),
            Ok(raw) => {
                let state: Checkpoint = serde_json::from_str(&raw)?;
                info!(scrapers = state.len(), "Loaded backup");
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No backup found, starting fresh");
                Ok(Checkpoint::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn state(&self) -> &Checkpoint {
        &self.state
    }

    /// Merge `delta` into the held checkpoint and rewrite the file.
    ///
    /// Entries of `delta` replace entries with the same scraper name; other
    /// scrapers keep their last state. Without a path only the in-memory
    /// checkpoint changes.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory cannot be created or the file written.
    #[instrument(level = "debug", skip_all, fields(rows = delta.len()))]
    pub async fn store(&mut self, delta: Checkpoint) -> AppResult<()> {
        self.state.extend(delta);
        let Some(path) = &self.path else {
            return Ok(());
        };
        ensure_parent_dir(path).await?;
        let json = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, json).await?;
        debug!(path = %path.display(), scrapers = self.state.len(), "Backup written");
        Ok(())
    }
}
