use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::LedgerError;
use crate::storage::query::SqlValue;

/// SQLite-backed store. All statements run under one connection lock, so a
/// single store call is never interleaved with another.
#[derive(Clone)]
pub struct DatabaseStore {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl DatabaseStore {
    pub async fn new(database_path: &str) -> Result<Self, LedgerError> {
        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                service_name TEXT NOT NULL,
                price INTEGER NOT NULL CHECK (price > 0 AND price <= 2147483647),
                start_month INTEGER NOT NULL CHECK (start_month BETWEEN 1 AND 12),
                start_year INTEGER NOT NULL,
                end_month INTEGER CHECK (end_month BETWEEN 1 AND 12),
                end_year INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((end_month IS NULL) = (end_year IS NULL))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_user_service_uidx
                ON subscriptions (user_id, service_name);
            CREATE INDEX IF NOT EXISTS subscriptions_start_idx
                ON subscriptions (start_year, start_month);",
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlValue::Int(v) => Ok(ToSqlOutput::from(*v)),
            SqlValue::Text(v) => Ok(ToSqlOutput::from(v.as_str())),
        }
    }
}

pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// SQLite's `SUM` fails with "integer overflow" instead of wrapping.
pub(crate) fn is_integer_overflow(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("integer overflow")
    )
}
