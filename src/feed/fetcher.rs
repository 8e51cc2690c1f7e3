use crate::feed::parser::{parse_feed, ParseError, ParsedFeed};
use crate::types::{Entry, FetchResult};
use crate::util::validate_feed_url;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while polling a feed.
///
/// Every variant is a per-feed failure; none of them is retried within a run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured feed URL is unusable
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed document could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Fetches alert feeds and selects the entries newer than a checkpoint.
#[derive(Debug, Clone)]
pub struct FeedSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedSource {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Retrieves the feed at `url` and returns the entries newer than `last_update`.
    ///
    /// # Behavior
    ///
    /// - With no `last_update`, every entry in the document is returned
    /// - Otherwise only entries whose `<updated>` is strictly later are returned
    /// - Returned entries keep document order
    /// - A feed without a feed-level `<updated>` yields an empty result with no
    ///   timestamp; this is not an error
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - URL does not parse or is not http(s)
    /// - [`FetchError::Network`] / [`FetchError::Timeout`] - transport failures
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
    /// - [`FetchError::Parse`] - Malformed or unexpectedly shaped document
    pub async fn fetch_new(
        &self,
        url: &str,
        last_update: Option<DateTime<Utc>>,
    ) -> Result<FetchResult, FetchError> {
        let target = validate_feed_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.get(target).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        let ParsedFeed {
            title,
            updated,
            entries,
        } = parse_feed(&bytes)?;

        let Some(timestamp) = updated else {
            tracing::info!(
                feed = %url,
                title = %title,
                "Feed has not produced any results yet, likely just created"
            );
            return Ok(FetchResult::empty(title));
        };

        let total = entries.len();
        let entries = select_new(entries, last_update);
        tracing::info!(
            feed = %url,
            title = %title,
            new = entries.len(),
            total = total,
            "Found {} new of {} entries",
            entries.len(),
            total
        );

        Ok(FetchResult {
            feed_title: title,
            timestamp: Some(timestamp),
            entries,
            total,
        })
    }
}

/// Keeps the entries strictly newer than `last_update`, preserving order.
///
/// Without a checkpoint every entry is new.
pub fn select_new(entries: Vec<Entry>, last_update: Option<DateTime<Utc>>) -> Vec<Entry> {
    match last_update {
        None => entries,
        Some(checkpoint) => entries
            .into_iter()
            .filter(|entry| entry.timestamp > checkpoint)
            .collect(),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: A dropped connection can end the stream early without an error
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
