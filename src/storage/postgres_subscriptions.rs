use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::storage::postgres_store::{
    PgStore, is_out_of_range, is_unique_violation, pg_params, row_to_subscription,
};
use crate::storage::query::{self, Dialect, SUBSCRIPTION_COLUMNS};
use crate::subscription::store::duplicate_error;
use crate::subscription::{
    FilterSpec, Pagination, PaginationMeta, Period, Subscription, SubscriptionPatch,
    SubscriptionStore,
};

fn month_params(sub: &Subscription) -> (i64, i64, Option<i64>, Option<i64>) {
    (
        i64::from(sub.start.month()),
        i64::from(sub.start.year()),
        sub.end.map(|e| i64::from(e.month())),
        sub.end.map(|e| i64::from(e.year())),
    )
}

fn map_write_err(e: tokio_postgres::Error, sub: &Subscription) -> LedgerError {
    if is_unique_violation(&e) {
        duplicate_error(sub.user_id, &sub.service_name)
    } else {
        LedgerError::Pg(e)
    }
}

async fn write_row(tx: &Transaction<'_>, sub: &Subscription) -> Result<u64, LedgerError> {
    let (sm, sy, em, ey) = month_params(sub);
    tx
        .execute(
            "UPDATE subscriptions SET user_id = $2, service_name = $3, price = $4, start_month = $5, start_year = $6, end_month = $7, end_year = $8, updated_at = $9 WHERE id = $1",
            &[
                &sub.id.to_string(),
                &sub.user_id.to_string(),
                &sub.service_name,
                &sub.price,
                &sm,
                &sy,
                &em,
                &ey,
                &sub.updated_at,
            ],
        )
        .await
        .map_err(|e| map_write_err(e, sub))
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn create(&self, sub: &Subscription) -> Result<Uuid, LedgerError> {
        let (sm, sy, em, ey) = month_params(sub);
        let client = self.pool.pick();
        let client = client.lock().await;
        client
            .execute(
                &format!(
                    "INSERT INTO subscriptions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                    SUBSCRIPTION_COLUMNS
                ),
                &[
                    &sub.id.to_string(),
                    &sub.user_id.to_string(),
                    &sub.service_name,
                    &sub.price,
                    &sm,
                    &sy,
                    &em,
                    &ey,
                    &sub.created_at,
                    &sub.updated_at,
                ],
            )
            .await
            .map_err(|e| map_write_err(e, sub))?;
        tracing::info!(subscription_id = %sub.id, user_id = %sub.user_id, service_name = %sub.service_name, "subscription created");
        Ok(sub.id)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, LedgerError> {
        let client = self.pool.pick();
        let client = client.lock().await;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS),
                &[&id.to_string()],
            )
            .await?;
        match row {
            Some(row) => row_to_subscription(&row),
            None => Err(LedgerError::not_found(id)),
        }
    }

    async fn list(
        &self,
        filter: &FilterSpec,
        pagination: Pagination,
    ) -> Result<(Vec<Subscription>, PaginationMeta), LedgerError> {
        let count = query::count_query(Dialect::Postgres, filter);
        let page = query::list_query(Dialect::Postgres, filter, pagination);

        let client = self.pool.pick();
        let mut client = client.lock().await;
        // Count and page come from one snapshot.
        let tx = client.build_transaction().read_only(true).start().await?;
        let total: i64 = tx
            .query_one(&count.sql, &pg_params(&count.params))
            .await?
            .try_get(0)?;
        let rows = tx.query(&page.sql, &pg_params(&page.params)).await?;
        tx.commit().await?;

        let items = rows
            .iter()
            .map(row_to_subscription)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = items.len(), total, "subscriptions listed");
        Ok((items, PaginationMeta::new(pagination, total.max(0) as u64)))
    }

    async fn update(&self, sub: &Subscription) -> Result<(), LedgerError> {
        let client = self.pool.pick();
        let mut client = client.lock().await;
        let tx = client.transaction().await?;
        if write_row(&tx, sub).await? == 0 {
            return Err(LedgerError::not_found(sub.id));
        }
        tx.commit().await?;
        tracing::info!(subscription_id = %sub.id, "subscription updated");
        Ok(())
    }

    async fn partial_update(
        &self,
        id: Uuid,
        patch: &SubscriptionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let client = self.pool.pick();
        let mut client = client.lock().await;
        let tx = client.transaction().await?;
        let row = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM subscriptions WHERE id = $1 FOR UPDATE",
                    SUBSCRIPTION_COLUMNS
                ),
                &[&id.to_string()],
            )
            .await?;
        let Some(row) = row else {
            tracing::debug!(subscription_id = %id, "subscription not found for partial update");
            return Err(LedgerError::not_found(id));
        };
        let mut sub = row_to_subscription(&row)?;
        sub.apply_patch(patch, updated_at)?;
        write_row(&tx, &sub).await?;
        tx.commit().await?;
        tracing::info!(subscription_id = %id, "subscription partially updated");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), LedgerError> {
        let client = self.pool.pick();
        let client = client.lock().await;
        let rows = client
            .execute("DELETE FROM subscriptions WHERE id = $1", &[&id.to_string()])
            .await?;
        if rows == 0 {
            tracing::debug!(subscription_id = %id, "subscription not found for deletion");
            return Err(LedgerError::not_found(id));
        }
        tracing::info!(subscription_id = %id, "subscription deleted");
        Ok(())
    }

    async fn aggregate_cost(&self, period: Period, filter: &FilterSpec) -> Result<i64, LedgerError> {
        let q = query::total_cost_query(Dialect::Postgres, period, filter);
        let client = self.pool.pick();
        let client = client.lock().await;
        let total: i64 = client
            .query_one(&q.sql, &pg_params(&q.params))
            .await
            .map_err(|e| {
                if is_out_of_range(&e) {
                    LedgerError::cost_overflow()
                } else {
                    LedgerError::Pg(e)
                }
            })?
            .try_get(0)?;
        tracing::debug!(total_cost = total, "total cost calculated");
        Ok(total)
    }

    async fn exists_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<bool, LedgerError> {
        let client = self.pool.pick();
        let client = client.lock().await;
        let row = client
            .query_opt(
                "SELECT 1 FROM subscriptions WHERE user_id = $1 AND service_name = $2 LIMIT 1",
                &[&user_id.to_string(), &service_name],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn get_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Subscription>, LedgerError> {
        let client = self.pool.pick();
        let client = client.lock().await;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM subscriptions WHERE user_id = $1 AND service_name = $2",
                    SUBSCRIPTION_COLUMNS
                ),
                &[&user_id.to_string(), &service_name],
            )
            .await?;
        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        let client = self.pool.pick();
        let client = client.lock().await;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }
}
