//! Utility functions shared by the feed and store modules.
//!
//! - **URL validation**: scheme checks for feed URLs, HTTPS enforcement for
//!   the store endpoint that receives the bearer token
//! - **Timestamps**: parsing and formatting of feed and checkpoint values
//!
//! # Examples
//!
//! ```
//! use alertsync::util::{format_date, parse_timestamp, validate_feed_url};
//!
//! let url = validate_feed_url("https://www.google.com/alerts/feeds/1/2").unwrap();
//! let ts = parse_timestamp("2024-03-05T10:00:00Z").unwrap();
//! assert_eq!(format_date(ts), "2024-03-05");
//! # let _ = url;
//! ```

mod time;
mod url_validator;

pub use time::{format_checkpoint, format_date, parse_checkpoint, parse_timestamp};
pub use url_validator::{validate_endpoint, validate_feed_url, UrlValidationError};
