//! Feed aggregation and cache engine.
//!
//! Merges subscribed channels from two origins, a quota-limited structured
//! API and plain RSS/Atom syndication, into one deduplicated,
//! reverse-chronological feed. Per-source snapshots live in a TTL'd SQLite
//! cache so repeated refreshes stay cheap, stale snapshots are served when an
//! origin is down, and watched state survives across runs.
//!
//! The interactive front end, media playback, and configuration loading are
//! callers of this crate, not part of it.

pub mod core;

pub use crate::core::feed::api::{ApiAdapter, ApiClient, ApiConfig, ItemFilter};
pub use crate::core::feed::syndication::{FeedAdapter, DEFAULT_FEED_URL_TEMPLATE};
pub use crate::core::feed::types::{FeedItem, SourceKind, SourceRef};
pub use crate::core::feed::{FetchOutcome, FetchRequest, SourceAdapter, SourceError};
pub use crate::core::storage::models::CacheEntry;
pub use crate::core::storage::repository::{sqlite_url, FeedRepository, StorageError};
pub use crate::core::subscription::{parse_channel_link, resolve_api_source, ChannelLink, SubscribeError};
pub use crate::core::sync::{
    Aggregator, AggregatorConfig, FeedSnapshot, RefreshError, SourceWarning, WarningKind,
};
