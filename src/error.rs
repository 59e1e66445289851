use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed for field {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    /// A cost total that does not fit in `i64`.
    #[error("{0}")]
    Overflow(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Pg(#[from] tokio_postgres::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Time parse error: {0}")]
    TimeParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn cost_overflow() -> Self {
        Self::Overflow("total cost exceeds the representable range".to_string())
    }

    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("subscription {} not found", id))
    }

    /// Stable machine-readable code carried by every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "validation_error",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Duplicate(_) => "duplicate",
            LedgerError::Overflow(_) => "overflow",
            _ => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation { .. } => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Duplicate(_) => StatusCode::CONFLICT,
            LedgerError::Overflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Field name for validation failures, `None` otherwise.
    pub fn field(&self) -> Option<&str> {
        match self {
            LedgerError::Validation { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == "internal_error"
    }

    /// Message safe to hand to a client. Internal causes stay in the logs.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            tracing::error!(error = %self, "request failed with internal error");
        }
        let details = match &self {
            LedgerError::Validation { field, reason } => serde_json::json!({
                "field": field,
                "reason": reason,
            }),
            _ => serde_json::json!({}),
        };
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.public_message(),
            "code": status.as_u16(),
            "details": details,
        });
        (status, Json(body)).into_response()
    }
}
