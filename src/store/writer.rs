use crate::config::{FeedsSchema, ResultsSchema};
use crate::store::client::{Fields, RecordStore, StoreError, MAX_BATCH_ROWS};
use crate::types::{Entry, FetchResult};
use crate::util::{format_checkpoint, format_date, parse_checkpoint, parse_timestamp};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Writes new entries to the results table and checkpoints to the feeds table.
pub struct ResultWriter<'a> {
    store: &'a RecordStore,
    feeds: &'a FeedsSchema,
    results: &'a ResultsSchema,
}

impl<'a> ResultWriter<'a> {
    pub fn new(
        store: &'a RecordStore,
        feeds: &'a FeedsSchema,
        results: &'a ResultsSchema,
    ) -> Self {
        Self {
            store,
            feeds,
            results,
        }
    }

    /// Stores one result row per entry, in batches of at most [`MAX_BATCH_ROWS`].
    ///
    /// Every row links back to `feed_record_id`. Batches are sent in entry
    /// order; the first failing batch stops the write and earlier batches stay
    /// stored. Returns the number of rows written.
    pub async fn store_results(
        &self,
        feed_record_id: &str,
        result: &FetchResult,
    ) -> Result<usize, StoreError> {
        let mut stored = 0;
        for batch in result.entries.chunks(MAX_BATCH_ROWS) {
            let rows: Vec<Fields> = batch
                .iter()
                .map(|entry| self.result_row(feed_record_id, entry))
                .collect();
            self.store.create(&self.results.table, &rows).await?;
            stored += rows.len();
        }
        Ok(stored)
    }

    /// Sets the checkpoint column of the feed row to `timestamp`.
    ///
    /// The checkpoint column must be a date-time field. When the store echoes
    /// the value back as a bare date the time of day was dropped, and every
    /// later run would re-store that day's entries, so this fails with
    /// [`StoreError::Decode`].
    pub async fn store_checkpoint(
        &self,
        feed_record_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut fields = Fields::new();
        fields.insert(
            self.feeds.checkpoint_column.clone(),
            Value::String(format_checkpoint(timestamp)),
        );
        let row = self
            .store
            .patch(&self.feeds.table, feed_record_id, &fields)
            .await?;

        if let Some(Value::String(stored)) = row.fields.get(&self.feeds.checkpoint_column) {
            if parse_timestamp(stored).is_err() && parse_checkpoint(stored).is_ok() {
                return Err(StoreError::Decode(format!(
                    "column {} of table {} stored '{}' as a date only; it must be a date-time field",
                    self.feeds.checkpoint_column, self.feeds.table, stored
                )));
            }
        }
        tracing::debug!(record_id = %feed_record_id, checkpoint = %timestamp, "Checkpoint advanced");
        Ok(())
    }

    fn result_row(&self, feed_record_id: &str, entry: &Entry) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            self.results.title_column.clone(),
            Value::String(entry.title.clone()),
        );
        fields.insert(
            self.results.link_column.clone(),
            Value::String(entry.link.clone()),
        );
        fields.insert(
            self.results.date_column.clone(),
            Value::String(format_date(entry.timestamp)),
        );
        fields.insert(
            self.results.keyword_column.clone(),
            Value::Array(vec![Value::String(feed_record_id.to_string())]),
        );
        fields
    }
}
