use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};

/// Parses an RFC 3339 timestamp (Atom `<updated>`) into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Parses a stored checkpoint cell.
///
/// Date-time columns come back as RFC 3339; a plain date column yields
/// `YYYY-MM-DD`, which is taken as midnight UTC.
pub fn parse_checkpoint(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let value = value.trim();
    parse_timestamp(value).or_else(|rfc_err| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
            .map_err(|_| rfc_err)
    })
}

/// Formats a checkpoint for the feeds table, e.g. `2024-03-05T10:00:00Z`.
///
/// Fractional seconds are kept (`10:00:00.500Z`) so the value parses back to
/// the same instant and entries stamped with it are not seen as newer.
pub fn format_checkpoint(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Formats the date-only value written to the results table.
pub fn format_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}
