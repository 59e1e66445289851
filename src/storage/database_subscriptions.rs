use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params_from_iter};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::storage::database::{DatabaseStore, is_integer_overflow, is_unique_violation};
use crate::storage::query::{self, Dialect, SUBSCRIPTION_COLUMNS};
use crate::storage::time::{parse_datetime_string, to_storage_string};
use crate::subscription::store::duplicate_error;
use crate::subscription::{
    FilterSpec, MonthDate, Pagination, PaginationMeta, Period, Subscription, SubscriptionPatch,
    SubscriptionStore,
};

fn conversion_err(idx: usize, e: LedgerError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, LedgerError::Internal(e.to_string())))
}

fn month_columns(month: i64, year: i64) -> Result<MonthDate, LedgerError> {
    let month = u8::try_from(month)
        .map_err(|_| LedgerError::Internal(format!("stored month {} out of range", month)))?;
    let year = u16::try_from(year)
        .map_err(|_| LedgerError::Internal(format!("stored year {} out of range", year)))?;
    MonthDate::new(month, year)
}

fn row_to_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    let start_month: i64 = row.get(4)?;
    let start_year: i64 = row.get(5)?;
    let end_month: Option<i64> = row.get(6)?;
    let end_year: Option<i64> = row.get(7)?;
    let created_at_s: String = row.get(8)?;
    let updated_at_s: String = row.get(9)?;

    let end = match (end_month, end_year) {
        (Some(m), Some(y)) => Some(month_columns(m, y).map_err(|e| conversion_err(6, e))?),
        _ => None,
    };
    Ok(Subscription {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        service_name: row.get(2)?,
        price: row.get(3)?,
        start: month_columns(start_month, start_year).map_err(|e| conversion_err(4, e))?,
        end,
        created_at: parse_datetime_string(&created_at_s).map_err(|e| conversion_err(8, e))?,
        updated_at: parse_datetime_string(&updated_at_s).map_err(|e| conversion_err(9, e))?,
    })
}

fn end_columns(sub: &Subscription) -> (Option<i64>, Option<i64>) {
    match sub.end {
        Some(e) => (Some(i64::from(e.month())), Some(i64::from(e.year()))),
        None => (None, None),
    }
}

fn write_row(conn: &rusqlite::Connection, sub: &Subscription) -> Result<usize, LedgerError> {
    let (end_month, end_year) = end_columns(sub);
    conn.execute(
        "UPDATE subscriptions SET user_id = ?2, service_name = ?3, price = ?4, start_month = ?5, start_year = ?6, end_month = ?7, end_year = ?8, updated_at = ?9 WHERE id = ?1",
        rusqlite::params![
            sub.id.to_string(),
            sub.user_id.to_string(),
            &sub.service_name,
            sub.price,
            i64::from(sub.start.month()),
            i64::from(sub.start.year()),
            end_month,
            end_year,
            to_storage_string(&sub.updated_at),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            duplicate_error(sub.user_id, &sub.service_name)
        } else {
            LedgerError::Db(e)
        }
    })
}

#[async_trait]
impl SubscriptionStore for DatabaseStore {
    async fn create(&self, sub: &Subscription) -> Result<Uuid, LedgerError> {
        let (end_month, end_year) = end_columns(sub);
        let conn = self.connection.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO subscriptions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SUBSCRIPTION_COLUMNS
            ),
            rusqlite::params![
                sub.id.to_string(),
                sub.user_id.to_string(),
                &sub.service_name,
                sub.price,
                i64::from(sub.start.month()),
                i64::from(sub.start.year()),
                end_month,
                end_year,
                to_storage_string(&sub.created_at),
                to_storage_string(&sub.updated_at),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_error(sub.user_id, &sub.service_name)
            } else {
                LedgerError::Db(e)
            }
        })?;
        tracing::info!(subscription_id = %sub.id, user_id = %sub.user_id, service_name = %sub.service_name, "subscription created");
        Ok(sub.id)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, LedgerError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?1",
            SUBSCRIPTION_COLUMNS
        ))?;
        stmt.query_row([id.to_string()], row_to_subscription)
            .optional()?
            .ok_or_else(|| LedgerError::not_found(id))
    }

    async fn list(
        &self,
        filter: &FilterSpec,
        pagination: Pagination,
    ) -> Result<(Vec<Subscription>, PaginationMeta), LedgerError> {
        let count = query::count_query(Dialect::Sqlite, filter);
        let page = query::list_query(Dialect::Sqlite, filter, pagination);

        let conn = self.connection.lock().await;
        let total: i64 = conn.query_row(&count.sql, params_from_iter(count.params.iter()), |row| {
            row.get(0)
        })?;
        let mut stmt = conn.prepare(&page.sql)?;
        let rows = stmt.query_map(params_from_iter(page.params.iter()), row_to_subscription)?;
        let mut items = Vec::new();
        for r in rows {
            items.push(r?);
        }
        tracing::debug!(count = items.len(), total, "subscriptions listed");
        Ok((items, PaginationMeta::new(pagination, total.max(0) as u64)))
    }

    async fn update(&self, sub: &Subscription) -> Result<(), LedgerError> {
        let conn = self.connection.lock().await;
        if write_row(&conn, sub)? == 0 {
            return Err(LedgerError::not_found(sub.id));
        }
        tracing::info!(subscription_id = %sub.id, "subscription updated");
        Ok(())
    }

    async fn partial_update(
        &self,
        id: Uuid,
        patch: &SubscriptionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        let current = tx
            .query_row(
                &format!(
                    "SELECT {} FROM subscriptions WHERE id = ?1",
                    SUBSCRIPTION_COLUMNS
                ),
                [id.to_string()],
                row_to_subscription,
            )
            .optional()?;
        let Some(mut sub) = current else {
            tracing::debug!(subscription_id = %id, "subscription not found for partial update");
            return Err(LedgerError::not_found(id));
        };
        sub.apply_patch(patch, updated_at)?;
        write_row(&tx, &sub)?;
        tx.commit()?;
        tracing::info!(subscription_id = %id, "subscription partially updated");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), LedgerError> {
        let conn = self.connection.lock().await;
        let rows = conn.execute("DELETE FROM subscriptions WHERE id = ?1", [id.to_string()])?;
        if rows == 0 {
            tracing::debug!(subscription_id = %id, "subscription not found for deletion");
            return Err(LedgerError::not_found(id));
        }
        tracing::info!(subscription_id = %id, "subscription deleted");
        Ok(())
    }

    async fn aggregate_cost(&self, period: Period, filter: &FilterSpec) -> Result<i64, LedgerError> {
        let q = query::total_cost_query(Dialect::Sqlite, period, filter);
        let conn = self.connection.lock().await;
        let total: i64 = conn
            .query_row(&q.sql, params_from_iter(q.params.iter()), |row| row.get(0))
            .map_err(|e| {
                if is_integer_overflow(&e) {
                    LedgerError::cost_overflow()
                } else {
                    LedgerError::Db(e)
                }
            })?;
        tracing::debug!(total_cost = total, "total cost calculated");
        Ok(total)
    }

    async fn exists_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<bool, LedgerError> {
        let conn = self.connection.lock().await;
        Ok(conn
            .query_row(
                "SELECT 1 FROM subscriptions WHERE user_id = ?1 AND service_name = ?2 LIMIT 1",
                rusqlite::params![user_id.to_string(), service_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    async fn get_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Subscription>, LedgerError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 AND service_name = ?2",
            SUBSCRIPTION_COLUMNS
        ))?;
        Ok(stmt
            .query_row(
                rusqlite::params![user_id.to_string(), service_name],
                row_to_subscription,
            )
            .optional()?)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        let conn = self.connection.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
