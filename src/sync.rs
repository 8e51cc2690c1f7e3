//! The polling run: list feeds, fetch each one, store new entries, advance
//! checkpoints, then report failures in aggregate.
//!
//! Feeds are processed one at a time in listing order. A failure while
//! listing aborts the run; a failure while processing a feed is recorded and
//! the run moves on to the next feed.

use crate::config::{Config, ConfigError, FeedsSchema, ResultsSchema};
use crate::feed::{FeedSource, FetchError};
use crate::store::{FeedRegistry, RecordStore, ResultWriter, StoreError};
use crate::types::Feed;
use thiserror::Error;

/// Why a single feed could not be processed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A feed that failed during a run, with the cause.
#[derive(Debug)]
pub struct FeedFailure {
    pub keyword_label: String,
    pub url: String,
    pub error: FeedError,
}

/// Raised at the end of a run in which at least one feed failed.
#[derive(Debug, Error)]
pub enum FeedProcessingError {
    #[error("Failed to process feed '{keyword_label}' ({url}): {error}")]
    Single {
        keyword_label: String,
        url: String,
        #[source]
        error: FeedError,
    },
    #[error("{} feeds failed to process: {}", .failures.len(), describe(.failures))]
    Multiple { failures: Vec<FeedFailure> },
}

fn describe(failures: &[FeedFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("'{}' ({})", f.keyword_label, f.url))
        .collect::<Vec<_>>()
        .join(", ")
}

impl FeedProcessingError {
    /// Builds the aggregate error, or `None` when nothing failed.
    ///
    /// With several failures each one is logged before aggregation.
    pub fn from_failures(mut failures: Vec<FeedFailure>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => {
                let failure = failures.remove(0);
                Some(Self::Single {
                    keyword_label: failure.keyword_label,
                    url: failure.url,
                    error: failure.error,
                })
            }
            _ => {
                for failure in &failures {
                    tracing::error!(
                        keyword = %failure.keyword_label,
                        feed = %failure.url,
                        error = %failure.error,
                        "Feed failed"
                    );
                }
                Some(Self::Multiple { failures })
            }
        }
    }

    /// Keyword labels of the failed feeds.
    pub fn keyword_labels(&self) -> Vec<&str> {
        match self {
            Self::Single { keyword_label, .. } => vec![keyword_label.as_str()],
            Self::Multiple { failures } => failures
                .iter()
                .map(|f| f.keyword_label.as_str())
                .collect(),
        }
    }
}

/// Outcome of a run that did not succeed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The feeds table could not be read; no feed was processed
    #[error("Failed to list feeds: {0}")]
    Listing(#[source] StoreError),
    #[error(transparent)]
    FeedProcessing(#[from] FeedProcessingError),
}

/// Drives one polling run over every configured feed.
#[derive(Debug)]
pub struct Orchestrator {
    store: RecordStore,
    source: FeedSource,
    feeds: FeedsSchema,
    results: ResultsSchema,
}

impl Orchestrator {
    pub fn new(
        store: RecordStore,
        source: FeedSource,
        feeds: FeedsSchema,
        results: ResultsSchema,
    ) -> Self {
        Self {
            store,
            source,
            feeds,
            results,
        }
    }

    /// Wires the store client and feed source from a validated configuration.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = config.request_timeout();
        let store = RecordStore::new(
            client.clone(),
            config.endpoint_url()?,
            config.base_id.trim(),
            config.bearer_token()?,
            timeout,
        );
        let source = FeedSource::new(client, timeout);
        Ok(Self::new(
            store,
            source,
            config.feeds.clone(),
            config.results.clone(),
        ))
    }

    /// Runs one pass over all feeds.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Listing`] - the feeds table could not be read
    /// - [`SyncError::FeedProcessing`] - one or more feeds failed; every other
    ///   feed was still processed
    pub async fn run(&self) -> Result<(), SyncError> {
        let feeds = FeedRegistry::new(&self.store, &self.feeds)
            .list_feeds()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to list feeds");
                SyncError::Listing(e)
            })?;
        let writer = ResultWriter::new(&self.store, &self.feeds, &self.results);

        let mut failures = Vec::new();
        let mut stored_total = 0;
        for feed in &feeds {
            match self.process_feed(&writer, feed).await {
                Ok(stored) => stored_total += stored,
                Err(error) => {
                    tracing::error!(
                        keyword = %feed.keyword_label,
                        feed = %feed.url,
                        error = %error,
                        "Failed to process feed"
                    );
                    failures.push(FeedFailure {
                        keyword_label: feed.keyword_label.clone(),
                        url: feed.url.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            feeds = feeds.len(),
            failed = failures.len(),
            stored = stored_total,
            "Run complete"
        );

        match FeedProcessingError::from_failures(failures) {
            None => Ok(()),
            Some(err) => Err(err.into()),
        }
    }

    /// Fetch, write, then checkpoint a single feed. Returns rows written.
    ///
    /// The checkpoint only moves after every batch of results was stored,
    /// and never moves backwards.
    async fn process_feed(
        &self,
        writer: &ResultWriter<'_>,
        feed: &Feed,
    ) -> Result<usize, FeedError> {
        let result = self.source.fetch_new(&feed.url, feed.last_update).await?;

        let stored = if result.entries.is_empty() {
            0
        } else {
            writer.store_results(&feed.record_id, &result).await?
        };

        if let Some(timestamp) = result.timestamp {
            if feed.last_update.map_or(true, |previous| timestamp > previous) {
                writer.store_checkpoint(&feed.record_id, timestamp).await?;
            } else {
                tracing::debug!(
                    keyword = %feed.keyword_label,
                    checkpoint = ?feed.last_update,
                    "Feed unchanged since last checkpoint"
                );
            }
        }

        Ok(stored)
    }
}
