use chrono::{DateTime, Utc};

/// A configured alert feed, as listed from the feeds table.
///
/// Identity is the store row id; `last_update` is the checkpoint written
/// after the previous successful run, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub url: String,
    pub keyword_label: String,
    pub record_id: String,
    pub last_update: Option<DateTime<Utc>>,
}

/// A single entry parsed from a feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of polling one feed: the entries newer than the checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Feed-level `<title>`
    pub feed_title: String,
    /// Feed-level `<updated>`, absent for feeds that have never produced results
    pub timestamp: Option<DateTime<Utc>>,
    /// New entries, in document order
    pub entries: Vec<Entry>,
    /// Number of entries present in the document, new or not
    pub total: usize,
}

impl FetchResult {
    /// Result for a feed document without an `<updated>` element.
    pub fn empty(feed_title: String) -> Self {
        Self {
            feed_title,
            timestamp: None,
            entries: Vec::new(),
            total: 0,
        }
    }
}
