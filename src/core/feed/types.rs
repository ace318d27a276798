use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ApiChannel,
    FeedChannel,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ApiChannel => "api",
            SourceKind::FeedChannel => "feed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "api" => Some(SourceKind::ApiChannel),
            "feed" => Some(SourceKind::FeedChannel),
            _ => None,
        }
    }
}

/// One subscribed origin. Unique by `id`; the id is an opaque key owned by
/// the origin (a channel id for the API, a channel id or absolute URL for
/// syndication feeds).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub id: String,
    pub kind: SourceKind,
    pub display_name: String,
}

impl SourceRef {
    pub fn api(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::ApiChannel,
            display_name: display_name.into(),
        }
    }

    pub fn feed(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::FeedChannel,
            display_name: display_name.into(),
        }
    }
}

/// A normalized unit of content. `id` is stable across fetches of the same
/// underlying item; `watched` is derived at aggregation time and never
/// persisted with the item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    #[serde(skip)]
    pub watched: bool,
}
