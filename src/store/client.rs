use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// The store rejects create requests carrying more rows than this.
pub const MAX_BATCH_ROWS: usize = 10;

/// Column name to cell value, as sent to and returned by the store.
pub type Fields = Map<String, Value>;

/// Errors returned by [`RecordStore`] operations.
///
/// None of these are retried; callers decide whether a failure is fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store answered 401 or 403
    #[error("Authorization error: {status} with message {body}")]
    Authorization { status: u16, body: String },
    /// Any other non-2xx answer
    #[error("Backend server error: {status}")]
    Backend { status: u16, body: String },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// A successful response or a stored cell could not be interpreted
    #[error("Unexpected store data: {0}")]
    Decode(String),
    /// A create call was asked to send zero or more than ten rows
    #[error("Batch of {0} rows is outside the allowed range of 1 to 10")]
    InvalidBatch(usize),
}

/// A row as returned by the store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Row {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Deserialize)]
struct RowList {
    records: Vec<Row>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Serialize)]
struct NewRow<'a> {
    fields: &'a Fields,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    records: Vec<NewRow<'a>>,
}

#[derive(Deserialize)]
struct CreateResponse {
    records: Vec<Row>,
}

#[derive(Serialize)]
struct PatchRequest<'a> {
    fields: &'a Fields,
}

/// Client for the tabular record store REST API.
///
/// Rows live at `{endpoint}/{base_id}/{table}`; a single row at
/// `{endpoint}/{base_id}/{table}/{row_id}`. Every request carries
/// `Authorization: Bearer {token}` and is bounded by `timeout`.
#[derive(Clone)]
pub struct RecordStore {
    client: reqwest::Client,
    endpoint: Url,
    base_id: String,
    token: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("base_id", &self.base_id)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RecordStore {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        base_id: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            base_id: base_id.into(),
            token,
            timeout,
        }
    }

    /// Lists the rows of `table`.
    ///
    /// Only the first page is read; when the store reports more pages a
    /// warning is logged.
    pub async fn list(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let request = self.client.get(self.table_url(table, None));
        let response = self.send(request).await?;
        let response = check_status(response, || {}).await?;
        let list: RowList = decode(response).await?;

        if list.offset.is_some() {
            tracing::warn!(
                table = %table,
                rows = list.records.len(),
                "Table has more rows than one page; remaining pages are not read"
            );
        }
        tracing::debug!(table = %table, rows = list.records.len(), "Listed rows");
        Ok(list.records)
    }

    /// Creates between 1 and [`MAX_BATCH_ROWS`] rows in `table`.
    ///
    /// On a 422 validation error every submitted row is logged before the
    /// error is returned.
    pub async fn create(&self, table: &str, rows: &[Fields]) -> Result<Vec<Row>, StoreError> {
        if rows.is_empty() || rows.len() > MAX_BATCH_ROWS {
            return Err(StoreError::InvalidBatch(rows.len()));
        }

        let payload = CreateRequest {
            records: rows.iter().map(|fields| NewRow { fields }).collect(),
        };
        let request = self
            .client
            .post(self.table_url(table, None))
            .json(&payload);
        let response = self.send(request).await?;
        let response = check_status(response, || {
            for row in &payload.records {
                let row = Value::Object(row.fields.clone());
                tracing::error!(
                    table = %table,
                    row = %row,
                    "Row rejected by store validation"
                );
            }
        })
        .await?;
        let created: CreateResponse = decode(response).await?;

        tracing::info!(
            table = %table,
            count = created.records.len(),
            "Stored {} new records",
            created.records.len()
        );
        Ok(created.records)
    }

    /// Updates the given `fields` of one row, leaving other columns untouched.
    pub async fn patch(
        &self,
        table: &str,
        row_id: &str,
        fields: &Fields,
    ) -> Result<Row, StoreError> {
        let payload = PatchRequest { fields };
        let request = self
            .client
            .patch(self.table_url(table, Some(row_id)))
            .json(&payload);
        let response = self.send(request).await?;
        let response = check_status(response, || {
            let fields = Value::Object(fields.clone());
            tracing::error!(
                table = %table,
                row_id = %row_id,
                fields = %fields,
                "Update rejected by store validation"
            );
        })
        .await?;
        decode(response).await
    }

    fn table_url(&self, table: &str, row_id: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        // Segments are percent-encoded, so table names may contain spaces
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.base_id).push(table);
            if let Some(id) = row_id {
                segments.push(id);
            }
        }
        url
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let request = request.header(
            AUTHORIZATION,
            format!("Bearer {}", self.token.expose_secret()),
        );
        tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::Network)
    }
}

/// Maps non-2xx responses onto [`StoreError`], logging status and body.
///
/// `on_validation_error` runs before the error is returned when the store
/// answers 422.
async fn check_status(
    response: reqwest::Response,
    on_validation_error: impl FnOnce(),
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        tracing::error!(status = status.as_u16(), body = %body, "Store authorization error");
        return Err(StoreError::Authorization {
            status: status.as_u16(),
            body,
        });
    }

    if status == StatusCode::UNPROCESSABLE_ENTITY {
        on_validation_error();
    }
    tracing::error!(status = status.as_u16(), body = %body, "Backend server error");
    Err(StoreError::Backend {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let bytes = response.bytes().await.map_err(StoreError::Network)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
}
