use tracing::debug;

use crate::core::feed::api::ApiClient;
use crate::core::feed::types::SourceRef;
use crate::core::feed::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("channel link is empty")]
    EmptyLink,
    #[error("unrecognized channel link: {0}")]
    InvalidLink(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// What a user-supplied channel link turned out to be, before any network
/// round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLink {
    /// A canonical channel id, usable directly once validated.
    Id(String),
    /// A handle or username that has to be resolved through search.
    Handle(String),
}

/// Classify a channel link without touching the network. Accepted forms:
/// `…/channel/<id>`, `…/@<handle>`, `…/user/<name>`, and bare names that
/// contain no host at all.
pub fn parse_channel_link(link: &str) -> Result<ChannelLink, SubscribeError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(SubscribeError::EmptyLink);
    }

    if let Some(rest) = link.split_once("/channel/").map(|(_, rest)| rest) {
        let id = rest.split('/').next().unwrap_or_default();
        if !id.is_empty() {
            return Ok(ChannelLink::Id(id.to_string()));
        }
    }
    if let Some(rest) = link.split_once("/@").map(|(_, rest)| rest) {
        let handle = rest.split('/').next().unwrap_or_default();
        if !handle.is_empty() {
            return Ok(ChannelLink::Handle(handle.to_string()));
        }
    }
    if let Some(rest) = link.split_once("/user/").map(|(_, rest)| rest) {
        let name = rest.split('/').next().unwrap_or_default();
        if !name.is_empty() {
            return Ok(ChannelLink::Handle(name.to_string()));
        }
    }
    if !link.contains('/') && !link.contains('.') {
        return Ok(ChannelLink::Handle(link.to_string()));
    }

    Err(SubscribeError::InvalidLink(link.to_string()))
}

/// Turn a user-supplied link into a validated API `SourceRef`, using the
/// origin to verify ids and resolve handles.
pub async fn resolve_api_source(
    api: &ApiClient,
    link: &str,
) -> Result<SourceRef, SubscribeError> {
    match parse_channel_link(link)? {
        ChannelLink::Id(id) => {
            let channel = api
                .channel(&id)
                .await?
                .ok_or_else(|| SourceError::NotFound(id.clone()))?;
            debug!(channel_id = %channel.id, "resolved channel by id");
            Ok(SourceRef::api(channel.id, channel.title))
        }
        ChannelLink::Handle(handle) => {
            let channel = api
                .search_channel(&handle)
                .await?
                .ok_or_else(|| SourceError::NotFound(handle.clone()))?;
            debug!(channel_id = %channel.id, %handle, "resolved channel by handle");
            Ok(SourceRef::api(channel.id, channel.title))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feed::api::ApiConfig;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn recognizes_canonical_channel_urls() {
        let parsed = parse_channel_link("https://www.youtube.com/channel/UCabc123/videos")
            .expect("link should parse");
        assert_eq!(parsed, ChannelLink::Id("UCabc123".to_string()));
    }

    #[test]
    fn recognizes_handles_users_and_bare_names() {
        assert_eq!(
            parse_channel_link("https://www.youtube.com/@somecreator").expect("should parse"),
            ChannelLink::Handle("somecreator".to_string())
        );
        assert_eq!(
            parse_channel_link("https://www.youtube.com/user/oldname/videos")
                .expect("should parse"),
            ChannelLink::Handle("oldname".to_string())
        );
        assert_eq!(
            parse_channel_link("somecreator").expect("should parse"),
            ChannelLink::Handle("somecreator".to_string())
        );
    }

    #[test]
    fn rejects_empty_and_unrecognized_links() {
        assert!(matches!(
            parse_channel_link("   "),
            Err(SubscribeError::EmptyLink)
        ));
        assert!(matches!(
            parse_channel_link("https://example.com/watch?v=abc"),
            Err(SubscribeError::InvalidLink(_))
        ));
    }

    #[tokio::test]
    async fn resolves_handle_through_search() {
        let app = Router::new()
            .route(
                "/search",
                get(|| async {
                    Json(json!({
                        "items": [{"id": "UCfound", "title": "Found Channel"}]
                    }))
                }),
            )
            .route(
                "/channels/{id}",
                get(|| async { Json(json!({"id": "UCfound", "title": "Found Channel"})) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("local addr should exist");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });

        let api = ApiClient::new(ApiConfig::new(format!("http://{address}"), "test-key"))
            .expect("client should build");

        let by_handle = resolve_api_source(&api, "https://www.youtube.com/@somecreator")
            .await
            .expect("handle should resolve");
        assert_eq!(by_handle, SourceRef::api("UCfound", "Found Channel"));

        let by_id = resolve_api_source(&api, "https://www.youtube.com/channel/UCfound")
            .await
            .expect("id should resolve");
        assert_eq!(by_id.id, "UCfound");
    }
}
