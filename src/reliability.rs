//! Source reliability index.
//!
//! Maps a normalised host (or host + path) key to a [`TrustLabel`]. The index
//! is built once per run from a registry of factual-reporting ratings; archive
//! mirror domains are always injected as [`TrustLabel::Archive`].
//!
//! Keys are normalised by stripping the scheme, a leading `www.` and trailing
//! slashes. Lookups happen either by bare domain or by the full normalised URL,
//! see [`LookupMode`].

use crate::errors::AppResult;
use crate::utils::{maintain_netloc, remove_prefix};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Archive mirrors that are always labelled [`TrustLabel::Archive`].
pub const ARCHIVE_DOMAINS: [&str; 4] = [
    "archive.is",
    "archive.fo",
    "archive.today",
    "web.archive.org",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustLabel {
    High,
    Low,
    Mixed,
    Archive,
}

impl TrustLabel {
    /// Map a factual-reporting rating to a label. Unknown ratings are unlabelled.
    pub fn from_rating(rating: &str) -> Option<Self> {
        match rating.trim().to_lowercase().as_str() {
            "very high" | "high" => Some(TrustLabel::High),
            "mixed" => Some(TrustLabel::Mixed),
            "low" | "very low" | "satire" | "insane stuff" => Some(TrustLabel::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
    /// Compare only the host of the link.
    #[default]
    Domain,
    /// Compare the whole normalised link.
    FullUrl,
}

/// One row of the external source registry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    pub url: String,
    pub factual_reporting: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReliabilityIndex {
    labels: HashMap<String, TrustLabel>,
    mode: LookupMode,
}

impl ReliabilityIndex {
    pub fn new(mode: LookupMode) -> Self {
        Self {
            labels: HashMap::new(),
            mode,
        }
    }

    /// Build the index from registry rows and inject the archive mirrors.
    pub fn from_registry<'a>(
        entries: impl IntoIterator<Item = &'a RegistryEntry>,
        mode: LookupMode,
    ) -> Self {
        let mut index = Self::new(mode);
        for entry in entries {
            match TrustLabel::from_rating(&entry.factual_reporting) {
                Some(label) => index.insert(&entry.url, label),
                None => debug!(
                    url = %entry.url,
                    rating = %entry.factual_reporting,
                    "Unrated source skipped"
                ),
            }
        }
        for domain in ARCHIVE_DOMAINS {
            index.insert(domain, TrustLabel::Archive);
        }
        index
    }

    /// Read a registry file (YAML or JSON list of `{url, factual_reporting}`).
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, mode: LookupMode) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<RegistryEntry> = serde_yaml::from_str(&raw)?;
        let index = Self::from_registry(&entries, mode);
        info!(entries = entries.len(), labelled = index.len(), "Loaded source registry");
        Ok(index)
    }

    pub fn insert(&mut self, url: &str, label: TrustLabel) {
        let key = self.key(url);
        if !key.is_empty() {
            self.labels.insert(key, label);
        }
    }

    pub fn label(&self, url: &str) -> Option<TrustLabel> {
        self.labels.get(&self.key(url)).copied()
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn key(&self, url: &str) -> String {
        match self.mode {
            LookupMode::Domain => remove_prefix(&maintain_netloc(url)),
            LookupMode::FullUrl => remove_prefix(url),
        }
    }
}
