use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use std::time::Duration;
use tracing::debug;

/// A successfully retrieved syndication document plus its cache validators.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DocumentStatus {
    Updated(FetchedDocument),
    NotModified,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(code) => Some(*code),
            FetchError::Request(error) => error.status().map(|status| status.as_u16()),
        }
    }
}

/// Single conditional GET of a feed document. Sends the cached validators so
/// an unchanged document comes back as a body-less 304.
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Result<DocumentStatus, FetchError> {
    let mut request = client.get(url);
    if let Some(value) = etag {
        request = request.header(IF_NONE_MATCH, value);
    }
    if let Some(value) = last_modified {
        request = request.header(IF_MODIFIED_SINCE, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.as_u16() == 304 {
        debug!(url, "feed not modified");
        return Ok(DocumentStatus::NotModified);
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let header_string = |name| {
        response
            .headers()
            .get(name)
            .and_then(|value: &reqwest::header::HeaderValue| value.to_str().ok())
            .map(ToString::to_string)
    };
    let etag = header_string(ETAG);
    let last_modified = header_string(LAST_MODIFIED);
    let body = response.bytes().await?.to_vec();
    debug!(url, bytes = body.len(), "feed document fetched");

    Ok(DocumentStatus::Updated(FetchedDocument {
        body,
        etag,
        last_modified,
    }))
}

/// Retries transient failures (connection errors, 5xx) with a short linear
/// backoff. 4xx responses are returned to the caller unchanged.
pub async fn fetch_document_with_retry(
    client: &reqwest::Client,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    max_retries: usize,
) -> Result<DocumentStatus, FetchError> {
    let mut attempt = 0_usize;
    loop {
        match fetch_document(client, url, etag, last_modified).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let transient = matches!(&err, FetchError::Request(inner) if inner.status().is_none())
                    || matches!(err.status(), Some(code) if code >= 500);
                if !transient || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                debug!(url, attempt, "retrying feed fetch");
                tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
            }
        }
    }
}
