use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::feed::types::FeedItem;

/// Durable snapshot of one source's normalized items. An entry older than
/// `ttl_seconds` is stale and must not be served without a refresh attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_id: String,
    pub items: Vec<FeedItem>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Unix seconds of the last successful fetch or revalidation.
    pub fetched_at: i64,
    pub ttl_seconds: i64,
}

impl CacheEntry {
    pub fn is_stale(&self, now: i64) -> bool {
        now - self.fetched_at > self.ttl_seconds
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub id: String,
    pub kind: String,
    pub display_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct CacheRow {
    pub source_id: String,
    pub payload: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: i64,
    pub ttl_seconds: i64,
}
