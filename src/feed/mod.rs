//! Feed polling: fetching alert feeds and selecting new entries.
//!
//! - `parser` - Namespace-aware Atom parsing with `quick-xml`
//! - `fetcher` - HTTP retrieval with timeout and size limit, plus the
//!   checkpoint filter
//!
//! # Example
//!
//! ```ignore
//! use alertsync::feed::FeedSource;
//!
//! let source = FeedSource::new(reqwest::Client::new(), Duration::from_secs(30));
//! let result = source.fetch_new(&feed.url, feed.last_update).await?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{select_new, FeedSource, FetchError};
pub use parser::{parse_feed, ParseError, ParsedFeed};
