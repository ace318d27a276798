use std::time::Duration;

use async_trait::async_trait;

use super::fetcher::{fetch_document_with_retry, DocumentStatus, FetchError};
use super::parser::parse_feed_items;
use super::{FetchOutcome, FetchRequest, SourceAdapter, SourceError};

/// Where a channel id maps to its syndication document.
pub const DEFAULT_FEED_URL_TEMPLATE: &str =
    "https://www.youtube.com/feeds/videos.xml?channel_id={channel}";

const FEED_TIMEOUT_SECS: u64 = 20;
const FEED_MAX_RETRIES: usize = 2;

/// Adapter for the unauthenticated pull origin. No quota, no auth; failures
/// are transient-network or malformed-content only.
pub struct FeedAdapter {
    client: reqwest::Client,
    url_template: String,
    max_retries: usize,
}

impl FeedAdapter {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_template(DEFAULT_FEED_URL_TEMPLATE)
    }

    pub fn with_template(url_template: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FEED_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            max_retries: FEED_MAX_RETRIES,
        })
    }

    /// Source ids that are already absolute URLs are used verbatim; opaque
    /// channel ids go through the template.
    fn feed_url(&self, source_id: &str) -> String {
        if source_id.starts_with("http://") || source_id.starts_with("https://") {
            return source_id.to_string();
        }
        self.url_template.replace("{channel}", source_id)
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, SourceError> {
        let url = self.feed_url(&request.source.id);
        let status = fetch_document_with_retry(
            &self.client,
            &url,
            request.etag.as_deref(),
            request.last_modified.as_deref(),
            self.max_retries,
        )
        .await
        .map_err(|error| match error {
            FetchError::HttpStatus(404) => SourceError::NotFound(request.source.id.clone()),
            other => SourceError::Unavailable(other.to_string()),
        })?;

        match status {
            DocumentStatus::NotModified => Ok(FetchOutcome::NotModified),
            DocumentStatus::Updated(document) => {
                let items =
                    parse_feed_items(&request.source.id, &document.body, request.max_items)?;
                Ok(FetchOutcome::Updated {
                    items,
                    etag: document.etag,
                    last_modified: document.last_modified,
                })
            }
        }
    }
}
