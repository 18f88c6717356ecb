//! Column encoding shared by the table modules.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC so that
//! lexical order matches chronological order.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::decode(column, e))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, v)).transpose()
}

pub(crate) fn to_json<T: Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Encode(format!("{column}: {e}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| DatabaseError::decode(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_lossless() {
        let at = Utc::now();
        let stored = timestamp(&at);
        assert_eq!(parse_timestamp("at", &stored).expect("parse"), at);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(timestamp(&earlier) < timestamp(&later));
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let err = parse_timestamp("created_at", "yesterday").unwrap_err();
        assert!(matches!(err, DatabaseError::Decode(ref m) if m.starts_with("created_at")));
    }
}
