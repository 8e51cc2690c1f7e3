//! Polls Google Alerts Atom feeds listed in an Airtable base and records
//! every entry newer than the feed's checkpoint in a results table.
//!
//! One call to [`sync::Orchestrator::run`] is one polling run. Scheduling is
//! left to the caller (cron, systemd timer, ...).

pub mod config;
pub mod feed;
pub mod store;
pub mod sync;
pub mod types;
pub mod util;
