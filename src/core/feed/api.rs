use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::FeedItem;
use super::{FetchOutcome, FetchRequest, SourceAdapter, SourceError};

/// Upper bound on items requested per API call, to cap quota cost.
pub const MAX_RESULTS_CEILING: usize = 50;

const API_MAX_RETRIES: usize = 1;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiChannel {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ApiChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<ApiVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiVideo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub live_status: Option<String>,
}

/// Thin JSON client for the quota-limited origin.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub async fn channel_videos(
        &self,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<ApiVideo>, SourceError> {
        let bounded = max_results.clamp(1, MAX_RESULTS_CEILING);
        let url = format!("{}/channels/{channel_id}/videos", self.config.base_url);
        let response: VideoListResponse = self
            .get_json(&url, &[("maxResults", bounded.to_string())], channel_id)
            .await?;
        Ok(response.items)
    }

    /// Resolve one channel by id. A 404 is `Ok(None)`, not an error, so
    /// callers can distinguish "unknown id" from "origin down".
    pub async fn channel(&self, channel_id: &str) -> Result<Option<ApiChannel>, SourceError> {
        let url = format!("{}/channels/{channel_id}", self.config.base_url);
        match self.get_json::<ApiChannel>(&url, &[], channel_id).await {
            Ok(channel) => Ok(Some(channel)),
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn search_channel(&self, query: &str) -> Result<Option<ApiChannel>, SourceError> {
        let url = format!("{}/search", self.config.base_url);
        let response: ChannelListResponse = self
            .get_json(
                &url,
                &[
                    ("q", query.to_string()),
                    ("type", "channel".to_string()),
                    ("maxResults", "1".to_string()),
                ],
                query,
            )
            .await?;
        Ok(response.items.into_iter().next())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, SourceError> {
        let mut attempt = 0_usize;
        loop {
            let result = self.get_json_once(url, query, subject).await;
            match &result {
                Err(SourceError::Unavailable(_)) if attempt < API_MAX_RETRIES => {
                    attempt += 1;
                    debug!(url, attempt, "retrying api request");
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                _ => return result,
            }
        }
    }

    async fn get_json_once<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T, SourceError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|error| SourceError::Unavailable(error.to_string()))?;

        let status = response.status().as_u16();
        match status {
            403 | 429 => return Err(SourceError::QuotaExceeded),
            404 => return Err(SourceError::NotFound(subject.to_string())),
            code if !(200..300).contains(&code) => {
                return Err(SourceError::Unavailable(format!("http status {code}")))
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|error| SourceError::Malformed(error.to_string()))
    }
}

/// Content filter applied to API items, mirroring the origin's metadata:
/// live or upcoming broadcasts are dropped, as are items outside the
/// duration window when a duration is reported.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    pub min_duration_secs: Option<i64>,
    pub max_duration_secs: Option<i64>,
    pub skip_live: bool,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            min_duration_secs: Some(120),
            max_duration_secs: None,
            skip_live: true,
        }
    }
}

impl ItemFilter {
    fn admits(&self, video: &ApiVideo) -> bool {
        if self.skip_live
            && matches!(video.live_status.as_deref(), Some("live") | Some("upcoming"))
        {
            return false;
        }
        if let Some(duration) = video.duration_seconds {
            if self.min_duration_secs.is_some_and(|min| duration < min) {
                return false;
            }
            if self.max_duration_secs.is_some_and(|max| duration > max) {
                return false;
            }
        }
        true
    }
}

/// Adapter for the quota-limited origin. After one `QuotaExceeded` the
/// breaker trips and every fetch for the remainder of the pass fails fast
/// without touching the network; `begin_pass` re-arms it.
pub struct ApiAdapter {
    client: ApiClient,
    filter: ItemFilter,
    quota_tripped: AtomicBool,
}

impl ApiAdapter {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            filter: ItemFilter::default(),
            quota_tripped: AtomicBool::new(false),
        }
    }

    pub fn with_filter(client: ApiClient, filter: ItemFilter) -> Self {
        Self {
            client,
            filter,
            quota_tripped: AtomicBool::new(false),
        }
    }

    fn normalize(&self, source_id: &str, videos: Vec<ApiVideo>, max_items: usize) -> Vec<FeedItem> {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut items: Vec<FeedItem> = Vec::new();
        let mut skipped = 0_usize;

        for video in videos {
            if !self.filter.admits(&video) {
                continue;
            }
            let Some(item) = normalize_video(source_id, video) else {
                skipped += 1;
                continue;
            };
            if seen.insert(item.id.clone()) {
                items.push(item);
            }
        }
        if skipped > 0 {
            warn!(source_id, skipped, "skipped malformed api items");
        }

        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(max_items);
        items
    }
}

fn normalize_video(source_id: &str, video: ApiVideo) -> Option<FeedItem> {
    let id = video.id.filter(|id| !id.trim().is_empty())?;
    let url = video.url.filter(|url| !url.trim().is_empty())?;
    let published_at: DateTime<Utc> = video
        .published_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
        .with_timezone(&Utc);
    let title = video
        .title
        .map(|title| super::parser::clean_title(&title))
        .filter(|title| !title.is_empty())?;

    Some(FeedItem {
        id,
        source_id: source_id.to_string(),
        title,
        url,
        published_at,
        author: None,
        watched: false,
    })
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    fn begin_pass(&self) {
        self.quota_tripped.store(false, Ordering::SeqCst);
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, SourceError> {
        if self.quota_tripped.load(Ordering::SeqCst) {
            return Err(SourceError::QuotaExceeded);
        }

        let max_items = request.max_items.clamp(1, MAX_RESULTS_CEILING);
        let videos = match self
            .client
            .channel_videos(&request.source.id, max_items)
            .await
        {
            Ok(videos) => videos,
            Err(SourceError::QuotaExceeded) => {
                self.quota_tripped.store(true, Ordering::SeqCst);
                return Err(SourceError::QuotaExceeded);
            }
            Err(error) => return Err(error),
        };

        let items = self.normalize(&request.source.id, videos, max_items);
        Ok(FetchOutcome::Updated {
            items,
            etag: None,
            last_modified: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feed::types::SourceRef;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Clone)]
    struct ApiState {
        hits: Arc<AtomicUsize>,
        fail_first_with: Option<u16>,
    }

    async fn spawn_api_server(fail_first_with: Option<u16>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = ApiState {
            hits: hits.clone(),
            fail_first_with,
        };
        let app = Router::new()
            .route(
                "/channels/{channel_id}/videos",
                get(|State(state): State<ApiState>| async move {
                    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
                    if hit == 0 {
                        if let Some(code) = state.fail_first_with {
                            return (
                                StatusCode::from_u16(code).expect("status must be valid"),
                                Json(json!({"error": "rejected"})),
                            )
                                .into_response();
                        }
                    }
                    Json(json!({
                        "items": [
                            {
                                "id": "vid-old",
                                "title": "Older video 🎬",
                                "url": "https://videos.example/watch/vid-old",
                                "published_at": "2026-02-19T08:00:00Z",
                                "duration_seconds": 600,
                                "live_status": "none"
                            },
                            {
                                "id": "vid-new",
                                "title": "Newer video",
                                "url": "https://videos.example/watch/vid-new",
                                "published_at": "2026-02-21T09:30:00Z",
                                "duration_seconds": 900,
                                "live_status": "none"
                            },
                            {
                                "id": "vid-live",
                                "title": "Live right now",
                                "url": "https://videos.example/watch/vid-live",
                                "published_at": "2026-02-21T10:00:00Z",
                                "duration_seconds": 0,
                                "live_status": "live"
                            },
                            {
                                "id": "vid-short",
                                "title": "Sixty second short",
                                "url": "https://videos.example/watch/vid-short",
                                "published_at": "2026-02-21T11:00:00Z",
                                "duration_seconds": 60,
                                "live_status": "none"
                            },
                            {
                                "id": "vid-new",
                                "title": "Duplicate listing",
                                "url": "https://videos.example/watch/vid-new",
                                "published_at": "2026-02-21T09:30:00Z",
                                "duration_seconds": 900,
                                "live_status": "none"
                            },
                            {
                                "title": "No id at all",
                                "url": "https://videos.example/watch/unknown",
                                "published_at": "2026-02-21T12:00:00Z"
                            }
                        ]
                    }))
                    .into_response()
                }),
            )
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });
        (format!("http://{address}"), hits)
    }

    fn make_adapter(base_url: &str) -> ApiAdapter {
        let client = ApiClient::new(ApiConfig::new(base_url, "test-key"))
            .expect("client should build");
        ApiAdapter::new(client)
    }

    #[tokio::test]
    async fn fetch_normalizes_filters_and_dedups() {
        let (base_url, _hits) = spawn_api_server(None).await;
        let adapter = make_adapter(&base_url);

        let outcome = adapter
            .fetch(FetchRequest::new(SourceRef::api("UCchan", "Chan"), 25))
            .await
            .expect("fetch should succeed");
        let FetchOutcome::Updated { items, .. } = outcome else {
            panic!("api fetch always carries a body");
        };

        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["vid-new", "vid-old"], "newest first, live/short/dup/broken dropped");
        assert_eq!(items[0].title, "Newer video");
        assert_eq!(items[1].title, "Older video", "emoji stripped");
        assert!(items.iter().all(|item| item.source_id == "UCchan"));
    }

    #[tokio::test]
    async fn quota_rejection_trips_breaker_until_next_pass() {
        let (base_url, hits) = spawn_api_server(Some(403)).await;
        let adapter = make_adapter(&base_url);
        let request = FetchRequest::new(SourceRef::api("UCchan", "Chan"), 10);

        let first = adapter.fetch(request.clone()).await;
        assert!(matches!(first, Err(SourceError::QuotaExceeded)));

        let second = adapter.fetch(request.clone()).await;
        assert!(matches!(second, Err(SourceError::QuotaExceeded)));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "breaker skips the network");

        adapter.begin_pass();
        let third = adapter.fetch(request).await;
        assert!(third.is_ok(), "breaker re-arms at pass start");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let (base_url, hits) = spawn_api_server(Some(404)).await;
        let adapter = make_adapter(&base_url);

        let result = adapter
            .fetch(FetchRequest::new(SourceRef::api("UCgone", "Gone"), 10))
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(id)) if id == "UCgone"));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx is not retried");
    }

    #[tokio::test]
    async fn server_errors_surface_as_unavailable_after_retry() {
        let app = Router::new().route(
            "/channels/{channel_id}/videos",
            get(|| async { StatusCode::BAD_GATEWAY }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });

        let adapter = make_adapter(&format!("http://{address}"));
        let result = adapter
            .fetch(FetchRequest::new(SourceRef::api("UCchan", "Chan"), 10))
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
