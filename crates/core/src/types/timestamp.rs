//! Timestamp parsing for API payloads.
//!
//! The commerce API emits ISO-8601 timestamps, sometimes without an offset
//! (`2024-03-01T10:15:00`). Offset-less values are interpreted as UTC.
//!
//! Use with `#[serde(with = "crate::types::timestamp")]`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

/// Error returned when a timestamp string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampError(String);

/// Parse an ISO-8601 timestamp, with or without an offset.
///
/// # Errors
///
/// Returns `TimestampError` if the value is neither RFC 3339 nor a naive
/// `YYYY-MM-DDTHH:MM:SS[.fraction]` date-time.
pub fn parse(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| TimestampError(value.to_string()))
}

/// Serialize as RFC 3339.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339())
}

/// Deserialize from an ISO-8601 string.
///
/// # Errors
///
/// Returns a deserializer error if the string is not a valid timestamp.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}
