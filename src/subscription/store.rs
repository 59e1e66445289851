use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::subscription::filter::{FilterSpec, Pagination, PaginationMeta};
use crate::subscription::interval::Period;
use crate::subscription::model::{Subscription, SubscriptionPatch};

/// Persistent subscription collection. Implementations enforce the
/// `(user_id, service_name)` uniqueness invariant atomically and must select
/// and aggregate exactly what [`FilterSpec::matches`] and
/// [`Subscription::cost_for_period`] compute in process.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, sub: &Subscription) -> Result<Uuid, LedgerError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, LedgerError>;
    async fn list(
        &self,
        filter: &FilterSpec,
        pagination: Pagination,
    ) -> Result<(Vec<Subscription>, PaginationMeta), LedgerError>;
    /// Full replace of every mutable field.
    async fn update(&self, sub: &Subscription) -> Result<(), LedgerError>;
    /// Reads the stored row, applies `patch` via [`Subscription::apply_patch`]
    /// and writes it back in one transaction, stamping `updated_at`.
    async fn partial_update(
        &self,
        id: Uuid,
        patch: &SubscriptionPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;
    async fn delete(&self, id: Uuid) -> Result<(), LedgerError>;
    async fn aggregate_cost(&self, period: Period, filter: &FilterSpec) -> Result<i64, LedgerError>;
    async fn exists_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<bool, LedgerError>;
    async fn get_by_user_and_service(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> Result<Option<Subscription>, LedgerError>;
    async fn ping(&self) -> Result<(), LedgerError>;
}

pub(crate) fn duplicate_error(user_id: Uuid, service_name: &str) -> LedgerError {
    LedgerError::Duplicate(format!(
        "subscription for user '{}' to service '{}' already exists",
        user_id, service_name
    ))
}
