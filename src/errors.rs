//! Error types for the harvester.
//!
//! Two families live here:
//!
//! - [`Failure`]: a per-link failure. It never aborts a wave or a batch; it is
//!   turned into an [`ErrorRecord`](crate::models::ErrorRecord) and routed to the
//!   error sink. Every variant maps to a persisted [`ErrorKind`] name so the
//!   restore mode can decide what is worth retrying.
//! - [`AppError`]: configuration-level failures that stop a run before any
//!   crawling starts.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A failure attached to a single link or page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{url} answered with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("request for {0} took too much time")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("original URL not found in {0}")]
    ActualUrlNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("storage rejected a duplicate: {0}")]
    UniqueViolation(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Failure::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Failure::HttpStatus { .. } => ErrorKind::HttpStatus,
            Failure::Timeout(_) => ErrorKind::Timeout,
            Failure::Network(_) => ErrorKind::Network,
            Failure::ActualUrlNotFound(_) => ErrorKind::ActualUrlNotFound,
            Failure::Extraction(_) => ErrorKind::Extraction,
            Failure::UniqueViolation(_) => ErrorKind::UniqueViolation,
            Failure::Store(_) => ErrorKind::Store,
        }
    }
}

/// Persisted name of a failure, stored in the `type` column of the error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    HttpStatus,
    Timeout,
    Network,
    ActualUrlNotFound,
    Extraction,
    UniqueViolation,
    Store,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::InvalidUrl,
        ErrorKind::HttpStatus,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::ActualUrlNotFound,
        ErrorKind::Extraction,
        ErrorKind::UniqueViolation,
        ErrorKind::Store,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "InvalidURLError",
            ErrorKind::HttpStatus => "HttpStatusError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::ActualUrlNotFound => "ActualURLNotFoundError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::UniqueViolation => "UniqueViolationError",
            ErrorKind::Store => "StoreError",
        }
    }

    /// Kinds that are never replayed: a duplicate stays a duplicate and a
    /// non-2xx answer is treated as permanent.
    pub fn not_worth_retrying() -> [ErrorKind; 2] {
        [ErrorKind::UniqueViolation, ErrorKind::HttpStatus]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(detail) => Failure::UniqueViolation(detail),
            other => Failure::Store(other.to_string()),
        }
    }
}

/// Failures that abort a run before crawling starts.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no sources to begin with")]
    NoSources,

    #[error("invalid selector `{selector}` for source {source_name}")]
    InvalidSelector {
        source_name: String,
        selector: String,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip_through_from_str() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("ClientError".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_store_error_keeps_unique_violation_distinct() {
        let unique: Failure = StoreError::UniqueViolation("article.url".into()).into();
        assert_eq!(unique.kind(), ErrorKind::UniqueViolation);

        let other: Failure = StoreError::Task("join".into()).into();
        assert_eq!(other.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_not_worth_retrying() {
        let skip = ErrorKind::not_worth_retrying();
        assert!(skip.contains(&ErrorKind::UniqueViolation));
        assert!(skip.contains(&ErrorKind::HttpStatus));
        assert!(!skip.contains(&ErrorKind::Timeout));
        assert!(!skip.contains(&ErrorKind::Network));
    }
}
