//! Row-to-entity parsing helpers.
//!
//! Dates are stored as `YYYY-MM-DD` TEXT. Some feeds hand us full
//! timestamps, so parsing only looks at the leading date portion.

use chrono::NaiveDate;

use super::error::StoreError;

/// Parse a TEXT column as a calendar date.
///
/// # Errors
///
/// Returns `StoreError::Query` if the leading ten characters are not a date.
pub fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|e| StoreError::Query(format!("Failed to parse date '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, StoreError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Read a nullable TEXT date column.
pub fn get_opt_date(row: &libsql::Row, idx: i32) -> Result<Option<NaiveDate>, StoreError> {
    match get_opt_string(row, idx)? {
        Some(s) => Ok(Some(parse_date(&s)?)),
        None => Ok(None),
    }
}

/// Read a TEXT column into any `FromStr` type (chambers, vote codes).
pub fn get_parsed<T>(row: &libsql::Row, idx: i32) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    row.get::<String>(idx)?.parse().map_err(StoreError::Query)
}

/// Bind form of an optional date.
pub fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}
