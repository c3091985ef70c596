//! Error taxonomy for the scan pipeline.
//!
//! Analyzer failures stay local to one variant and are turned into data by the
//! orchestrator. Everything else propagates to the caller as a [`ScanError`].

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures while retrieving the target page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("DNS resolution failed for {host}")]
    Dns { host: String },

    #[error("Connection refused or reset: {0}")]
    Connect(String),

    #[error("Page did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Page returned HTTP status {0}")]
    HttpStatus(u16),

    #[error("Response body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("Request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Whether repeating the same fetch could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Dns { .. } | FetchError::Connect(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            FetchError::TooLarge { .. }
            | FetchError::TooManyRedirects { .. }
            | FetchError::Request(_) => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FetchError::Dns { .. } => "fetch_dns",
            FetchError::Connect(_) => "fetch_connect",
            FetchError::Timeout(_) => "fetch_timeout",
            FetchError::HttpStatus(_) => "fetch_http_status",
            FetchError::TooLarge { .. } => "fetch_too_large",
            FetchError::TooManyRedirects { .. } => "fetch_redirects",
            FetchError::Request(_) => "fetch_request",
        }
    }
}

/// Failure of a single analyzer variant. Never fatal to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("document contains no analyzable content")]
    EmptyDocument,

    #[error("no visible text to score")]
    NoText,

    #[error("vision service error: {0}")]
    Service(String),

    #[error("{0}")]
    Other(String),
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Scan id {0} already exists or was previously deleted")]
    DuplicateId(Uuid),

    #[error("Failed to serialize scan history: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write scan history: {0}")]
    Io(#[from] std::io::Error),
}

/// Every failure a scan or a store lookup can surface to its caller.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    Validation(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("No analyzer produced a score")]
    InsufficientData,

    #[error("Scan exceeded its {0:?} deadline")]
    ScanTimeout(Duration),

    #[error("Scan {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Stable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Validation(_) => "validation",
            ScanError::Fetch(e) => e.kind(),
            ScanError::InsufficientData => "insufficient_data",
            ScanError::ScanTimeout(_) => "scan_timeout",
            ScanError::NotFound(_) => "not_found",
            ScanError::Store(_) => "store",
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScanError::Fetch(e) => e.is_transient(),
            ScanError::ScanTimeout(_) => true,
            ScanError::Validation(_)
            | ScanError::InsufficientData
            | ScanError::NotFound(_)
            | ScanError::Store(_) => false,
        }
    }
}
