//! Access to the tabular record store (Airtable REST API).
//!
//! - [`RecordStore`] - authenticated list / create / patch over rows of a table
//! - [`FeedRegistry`] - reads the configured feeds from the feeds table
//! - [`ResultWriter`] - writes new entries and advances feed checkpoints

mod client;
mod registry;
mod writer;

pub use client::{Fields, RecordStore, Row, StoreError, MAX_BATCH_ROWS};
pub use registry::FeedRegistry;
pub use writer::ResultWriter;
