pub mod api;
pub mod fetcher;
pub mod parser;
pub mod syndication;
pub mod types;

use async_trait::async_trait;

use self::types::{FeedItem, SourceRef};

/// Failure taxonomy shared by both origin adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The API origin rejected the call for quota reasons. Not retryable
    /// within the current aggregation pass.
    #[error("quota exhausted for the remainder of this pass")]
    QuotaExceeded,
    /// Transient network or HTTP failure; retryable on the next refresh.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// The source identifier no longer resolves at the origin.
    #[error("source not found: {0}")]
    NotFound(String),
    /// The whole payload was undecodable. Single bad entries are skipped
    /// during normalization and never surface as this error.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub source: SourceRef,
    /// Validators from the cached snapshot, if any.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub max_items: usize,
}

impl FetchRequest {
    pub fn new(source: SourceRef, max_items: usize) -> Self {
        Self {
            source,
            etag: None,
            last_modified: None,
            max_items,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Updated {
        items: Vec<FeedItem>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// The origin confirmed the cached snapshot is still current.
    NotModified,
}

/// The one capability the aggregator sees. Kind-specific behavior (quota
/// handling, conditional GET, retry policy) stays behind this seam.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Called once at the start of every aggregation pass, before any fetch.
    fn begin_pass(&self) {}

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, SourceError>;
}
