use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::storage::query::SqlValue;
use crate::subscription::{MonthDate, Subscription};

pub struct PgPool {
    clients: Vec<Arc<Mutex<Client>>>,
    next: AtomicUsize,
}

impl PgPool {
    async fn connect_many(
        pg_url: &str,
        schema: &Option<String>,
        size: usize,
    ) -> Result<Self, LedgerError> {
        let mut clients = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            let (client, connection) = tokio_postgres::connect(pg_url, NoTls)
                .await
                .map_err(|e| LedgerError::Config(format!("Failed to connect postgres: {}", e)))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("postgres connection error: {}", e);
                }
            });
            if let Some(s) = schema {
                client
                    .execute(&format!("SET search_path TO {}", s), &[])
                    .await
                    .map_err(|e| {
                        LedgerError::Config(format!("Failed to set search_path: {}", e))
                    })?;
            }
            let client = Arc::new(Mutex::new(client));
            crate::db::postgres::spawn_keepalive(Arc::clone(&client), 240, 420);
            clients.push(client);
        }
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pick(&self) -> Arc<Mutex<Client>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len().max(1);
        Arc::clone(&self.clients[idx])
    }
}

/// Postgres-backed store over a small round-robin pool of clients. Each
/// client is locked for the duration of one store call.
#[derive(Clone)]
pub struct PgStore {
    pub pool: Arc<PgPool>,
}

impl PgStore {
    pub async fn connect(
        pg_url: &str,
        schema: &Option<String>,
        pool_size: usize,
    ) -> Result<Self, LedgerError> {
        let pool = PgPool::connect_many(pg_url, schema, pool_size).await?;
        let store = Self {
            pool: Arc::new(pool),
        };
        // init tables
        let client = store.pool.pick();
        let client = client.lock().await;
        client
            .batch_execute(
                r#"CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                service_name TEXT NOT NULL,
                price BIGINT NOT NULL CHECK (price > 0 AND price <= 2147483647),
                start_month BIGINT NOT NULL CHECK (start_month BETWEEN 1 AND 12),
                start_year BIGINT NOT NULL,
                end_month BIGINT CHECK (end_month BETWEEN 1 AND 12),
                end_year BIGINT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CHECK ((end_month IS NULL) = (end_year IS NULL)),
                CONSTRAINT subscriptions_user_service_key UNIQUE (user_id, service_name)
            );
            CREATE INDEX IF NOT EXISTS subscriptions_start_idx
                ON subscriptions (start_year, start_month);"#,
            )
            .await
            .map_err(|e| LedgerError::Config(format!("Failed to init postgres schema: {}", e)))?;
        tracing::info!("Postgres subscription store initialized");
        drop(client);
        Ok(store)
    }
}

pub(crate) fn pg_params(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    values
        .iter()
        .map(|v| match v {
            SqlValue::Int(i) => i as &(dyn ToSql + Sync),
            SqlValue::Text(s) => s as &(dyn ToSql + Sync),
        })
        .collect()
}

pub(crate) fn is_unique_violation(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// The numeric `SUM` cast back to `BIGINT` fails when it is out of range.
pub(crate) fn is_out_of_range(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::NUMERIC_VALUE_OUT_OF_RANGE)
}

fn pg_uuid(row: &Row, idx: usize) -> Result<Uuid, LedgerError> {
    let raw: String = row.try_get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| LedgerError::Internal(format!("stored id '{}' is invalid: {}", raw, e)))
}

fn pg_month(month: i64, year: i64) -> Result<MonthDate, LedgerError> {
    let month = u8::try_from(month)
        .map_err(|_| LedgerError::Internal(format!("stored month {} out of range", month)))?;
    let year = u16::try_from(year)
        .map_err(|_| LedgerError::Internal(format!("stored year {} out of range", year)))?;
    MonthDate::new(month, year)
}

pub(crate) fn row_to_subscription(row: &Row) -> Result<Subscription, LedgerError> {
    let end_month: Option<i64> = row.try_get(6)?;
    let end_year: Option<i64> = row.try_get(7)?;
    let end = match (end_month, end_year) {
        (Some(m), Some(y)) => Some(pg_month(m, y)?),
        _ => None,
    };
    Ok(Subscription {
        id: pg_uuid(row, 0)?,
        user_id: pg_uuid(row, 1)?,
        service_name: row.try_get(2)?,
        price: row.try_get(3)?,
        start: pg_month(row.try_get(4)?, row.try_get(5)?)?,
        end,
        created_at: row.try_get(8)?,
        updated_at: row.try_get(9)?,
    })
}
