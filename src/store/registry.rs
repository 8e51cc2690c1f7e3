use crate::config::FeedsSchema;
use crate::store::client::{RecordStore, Row, StoreError};
use crate::types::Feed;
use crate::util::parse_checkpoint;
use serde_json::Value;

/// Reads the configured feeds from the feeds table.
pub struct FeedRegistry<'a> {
    store: &'a RecordStore,
    schema: &'a FeedsSchema,
}

impl<'a> FeedRegistry<'a> {
    pub fn new(store: &'a RecordStore, schema: &'a FeedsSchema) -> Self {
        Self { store, schema }
    }

    /// Lists every feed row, in table order.
    ///
    /// Rows without any populated field are skipped. A checkpoint cell that
    /// is present but not a timestamp fails the whole listing with
    /// [`StoreError::Decode`]: polling such a feed from scratch would store
    /// its entries a second time.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let rows = self.store.list(&self.schema.table).await?;
        let total = rows.len();

        let feeds = rows
            .into_iter()
            .filter(|row| !row.fields.is_empty())
            .map(|row| self.to_feed(row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            table = %self.schema.table,
            feeds = feeds.len(),
            skipped = total - feeds.len(),
            "Listed feeds"
        );
        Ok(feeds)
    }

    fn to_feed(&self, row: Row) -> Result<Feed, StoreError> {
        let keyword_label = cell_text(&row, &self.schema.keyword_column).unwrap_or_default();
        let url = cell_text(&row, &self.schema.url_column).unwrap_or_default();

        let last_update = match cell_text(&row, &self.schema.checkpoint_column) {
            Some(value) => Some(parse_checkpoint(&value).map_err(|e| {
                StoreError::Decode(format!(
                    "row {} has invalid {} '{}': {}",
                    row.id, self.schema.checkpoint_column, value, e
                ))
            })?),
            None => None,
        };

        Ok(Feed {
            url,
            keyword_label,
            record_id: row.id,
            last_update,
        })
    }
}

/// Text of a cell; blank strings and nulls count as absent.
fn cell_text(row: &Row, column: &str) -> Option<String> {
    match row.fields.get(column)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema() -> FeedsSchema {
        FeedsSchema {
            table: "Keywords".to_string(),
            keyword_column: "Alerts Keyword".to_string(),
            url_column: "RSS Feed".to_string(),
            checkpoint_column: "Last Query".to_string(),
        }
    }

    async fn store_listing(records: serde_json::Value) -> (MockServer, RecordStore) {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appTEST/Keywords"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": records })))
            .mount(&mock_server)
            .await;
        let store = RecordStore::new(
            reqwest::Client::new(),
            Url::parse(&mock_server.uri()).unwrap(),
            "appTEST",
            SecretString::from("pat".to_string()),
            Duration::from_secs(5),
        );
        (mock_server, store)
    }

    #[tokio::test]
    async fn test_maps_columns_and_skips_empty_rows() {
        let (_server, store) = store_listing(json!([
            {"id": "rec1", "fields": {
                "Alerts Keyword": "rust",
                "RSS Feed": "https://www.google.com/alerts/feeds/1/1",
                "Last Query": "2024-03-05T10:00:00.000Z"
            }},
            {"id": "recEmpty", "fields": {}},
            {"id": "rec2", "fields": {
                "Alerts Keyword": "tokio",
                "RSS Feed": "https://www.google.com/alerts/feeds/1/2"
            }}
        ]))
        .await;

        let schema = schema();
        let feeds = FeedRegistry::new(&store, &schema).list_feeds().await.unwrap();

        assert_eq!(
            feeds,
            vec![
                Feed {
                    url: "https://www.google.com/alerts/feeds/1/1".to_string(),
                    keyword_label: "rust".to_string(),
                    record_id: "rec1".to_string(),
                    last_update: Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()),
                },
                Feed {
                    url: "https://www.google.com/alerts/feeds/1/2".to_string(),
                    keyword_label: "tokio".to_string(),
                    record_id: "rec2".to_string(),
                    last_update: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_checkpoint_is_unset() {
        let (_server, store) = store_listing(json!([
            {"id": "rec1", "fields": {"Alerts Keyword": "rust", "Last Query": "  "}}
        ]))
        .await;

        let schema = schema();
        let feeds = FeedRegistry::new(&store, &schema).list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert!(feeds[0].last_update.is_none());
        // Missing URL maps to empty; the fetch for this feed will fail on its own
        assert_eq!(feeds[0].url, "");
    }

    #[tokio::test]
    async fn test_invalid_checkpoint_fails_listing() {
        let (_server, store) = store_listing(json!([
            {"id": "rec1", "fields": {"Alerts Keyword": "rust", "Last Query": "last week"}}
        ]))
        .await;

        let schema = schema();
        let err = FeedRegistry::new(&store, &schema)
            .list_feeds()
            .await
            .unwrap_err();
        match err {
            StoreError::Decode(msg) => {
                assert!(msg.contains("rec1"));
                assert!(msg.contains("last week"));
            }
            e => panic!("Expected Decode, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_authorization_error_propagates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;
        let store = RecordStore::new(
            reqwest::Client::new(),
            Url::parse(&mock_server.uri()).unwrap(),
            "appTEST",
            SecretString::from("pat".to_string()),
            Duration::from_secs(5),
        );

        let schema = schema();
        let err = FeedRegistry::new(&store, &schema)
            .list_feeds()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Authorization { status: 401, .. }));
    }

    #[test]
    fn test_non_string_cells_are_stringified() {
        let row = Row {
            id: "rec1".to_string(),
            fields: match json!({"n": 3, "z": null}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        };
        assert_eq!(cell_text(&row, "n").as_deref(), Some("3"));
        assert_eq!(cell_text(&row, "z"), None);
        assert_eq!(cell_text(&row, "missing"), None);
    }
}
