use axum::extract::rejection::{JsonRejection, QueryRejection};
use uuid::Uuid;

use crate::error::LedgerError;

// Query helpers

/// `a,b , c` -> `["a", "b", "c"]`; blanks are dropped.
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub fn parse_flag(raw: Option<&str>, field: &str) -> Result<Option<bool>, LedgerError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
        Some(v) => Err(LedgerError::validation(
            field,
            format!("'{}' is not a boolean", v),
        )),
    }
}

pub fn parse_int(raw: Option<&str>, field: &str) -> Result<Option<i64>, LedgerError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| LedgerError::validation(field, format!("'{}' is not an integer", v))),
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, LedgerError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| LedgerError::validation("id", format!("'{}' is not a valid UUID", raw)))
}

// Rejections from axum extractors become 400 validation errors.
pub fn body_rejected(e: JsonRejection) -> LedgerError {
    LedgerError::validation("body", e.body_text())
}

pub fn query_rejected(e: QueryRejection) -> LedgerError {
    LedgerError::validation("query", e.body_text())
}
