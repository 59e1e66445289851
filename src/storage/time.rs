use crate::error::LedgerError;
use chrono::{DateTime, SecondsFormat, Utc};

/// 将 UTC 时间转换为 ISO-8601 / RFC3339（UTC, `Z`）
pub fn to_iso8601_utc_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Storage form for SQLite text columns; keeps microseconds so a row read
/// back equals the value written.
pub fn to_storage_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses the RFC3339 text written by [`to_storage_string`].
pub fn parse_datetime_string(s: &str) -> crate::error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::TimeParse(e.to_string()))
}
