//! Use-case layer between transports and the subscription store.
//!
//! Requests are validated here, before any store call. Store calls run under
//! the configured timeout; dropping the returned future cancels the call.

pub mod dto;

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AccountingConfig;
use crate::error::{LedgerError, Result};
use crate::subscription::{
    FilterQuery, FilterSpec, MonthDate, PageQuery, Pagination, Period, Subscription,
    SubscriptionPatch, SubscriptionStore, parse_dates, validate_dates,
};

pub use dto::{
    CreateSubscriptionRequest, FilterCriteria, ListResponse, PartialUpdateRequest, PeriodView,
    SubscriptionView, TotalCostRequest, TotalCostResponse, UpdateSubscriptionRequest,
};

#[derive(Clone)]
pub struct AccountingService {
    store: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
    config: AccountingConfig,
}

fn parse_user_id(raw: &str, field: &str) -> Result<Uuid> {
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| LedgerError::validation(field, format!("'{}' is not a valid UUID", raw)))?;
    if id.is_nil() {
        return Err(LedgerError::validation(field, "user ID is required"));
    }
    Ok(id)
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::validation(field, format!("{} is required", field)))
}

fn rename_field(e: LedgerError, field: &str) -> LedgerError {
    match e {
        LedgerError::Validation { reason, .. } => LedgerError::validation(field, reason),
        other => other,
    }
}

impl AccountingService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
        config: AccountingConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    async fn call<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout(), fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                if e.is_internal() {
                    tracing::error!(operation = op, error = %e, "store call failed");
                }
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    operation = op,
                    timeout_ms = self.config.store_timeout_ms,
                    "store call timed out"
                );
                Err(LedgerError::Internal(format!("{} timed out", op)))
            }
        }
    }

    fn parse_month(&self, raw: &str, field: &str) -> Result<MonthDate> {
        MonthDate::parse_within(raw.trim(), self.config.year_bounds())
            .map_err(|e| rename_field(e, field))
    }

    pub async fn ping(&self) -> Result<()> {
        self.call("ping", self.store.ping()).await
    }

    pub async fn create_subscription(&self, req: CreateSubscriptionRequest) -> Result<Subscription> {
        let user_id = parse_user_id(&req.user_id, "user_id")?;
        let (start, end) = parse_dates(
            req.start_date.trim(),
            req.end_date.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            self.config.year_bounds(),
        )?;
        let sub = Subscription::create(
            &req.service_name,
            req.price,
            user_id,
            start,
            end,
            self.clock.now(),
        )
        .inspect_err(|e| tracing::warn!(error = %e, "create rejected"))?;

        if let Some(existing) = self
            .call(
                "get_by_user_and_service",
                self.store.get_by_user_and_service(user_id, &sub.service_name),
            )
            .await?
        {
            tracing::warn!(
                user_id = %user_id,
                service_name = %sub.service_name,
                existing_id = %existing.id,
                "duplicate subscription rejected"
            );
            return Err(LedgerError::Duplicate(format!(
                "user '{}' already has subscription {} to service '{}'",
                user_id, existing.id, sub.service_name
            )));
        }

        // The unique index still decides races between concurrent creates.
        self.call("create", self.store.create(&sub)).await?;
        Ok(sub)
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Subscription> {
        self.call("get_by_id", self.store.get_by_id(id)).await
    }

    pub async fn list_subscriptions(
        &self,
        query: FilterQuery,
        page: PageQuery,
    ) -> Result<ListResponse> {
        let pagination = Pagination::clamp(
            page,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        let filter = FilterSpec::validate(&query, self.config.year_bounds())
            .inspect_err(|e| tracing::warn!(error = %e, "list filter rejected"))?;
        let (items, meta) = self
            .call("list", self.store.list(&filter, pagination))
            .await?;
        Ok(ListResponse {
            data: items.iter().map(SubscriptionView::from).collect(),
            pagination: meta,
        })
    }

    /// Full replacement. The request's own start/end pair is validated, the
    /// stored identity and `created_at` are kept.
    pub async fn update_subscription(
        &self,
        id: Uuid,
        req: UpdateSubscriptionRequest,
    ) -> Result<Subscription> {
        let existing = self.get_subscription(id).await?;
        let user_id = parse_user_id(&req.user_id, "user_id")?;
        let (start, end) = parse_dates(
            req.start_date.trim(),
            req.end_date.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            self.config.year_bounds(),
        )?;
        let updated = Subscription {
            id: existing.id,
            user_id,
            service_name: req.service_name.trim().to_string(),
            price: req.price,
            start,
            end,
            created_at: existing.created_at,
            updated_at: self.clock.now(),
        };
        updated
            .validate()
            .inspect_err(|e| tracing::warn!(subscription_id = %id, error = %e, "update rejected"))?;
        self.call("update", self.store.update(&updated)).await?;
        Ok(updated)
    }

    fn build_patch(&self, req: &PartialUpdateRequest) -> Result<SubscriptionPatch> {
        let user_id = req
            .user_id
            .as_deref()
            .map(|raw| parse_user_id(raw, "user_id"))
            .transpose()?;
        let start = req
            .start_date
            .as_deref()
            .map(|raw| self.parse_month(raw, "start_date"))
            .transpose()?;
        let end = match &req.end_date {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => Some(Some(self.parse_month(raw, "end_date")?)),
        };
        Ok(SubscriptionPatch {
            service_name: req.service_name.clone(),
            price: req.price,
            user_id,
            start,
            end,
        })
    }

    /// Applies only the supplied fields and returns the stored result.
    pub async fn partial_update(&self, id: Uuid, req: PartialUpdateRequest) -> Result<Subscription> {
        let patch = self.build_patch(&req)?;
        if patch.is_empty() {
            return Err(LedgerError::validation("body", "no fields to update"));
        }
        if patch.touches_dates() {
            // Early check against current values; the store repeats it
            // atomically when it applies the patch.
            let current = self.get_subscription(id).await?;
            let start = patch.start.unwrap_or(current.start);
            let end = patch.end.unwrap_or(current.end);
            validate_dates(start, end).inspect_err(
                |e| tracing::warn!(subscription_id = %id, error = %e, "partial update rejected"),
            )?;
        }
        self.call(
            "partial_update",
            self.store.partial_update(id, &patch, self.clock.now()),
        )
        .await?;
        self.get_subscription(id).await
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        self.get_subscription(id).await?;
        self.call("delete", self.store.delete(id)).await
    }

    pub async fn get_total_cost(&self, req: TotalCostRequest) -> Result<TotalCostResponse> {
        let start = self.parse_month(required(req.start_date.as_deref(), "start_date")?, "start_date")?;
        let end = self.parse_month(required(req.end_date.as_deref(), "end_date")?, "end_date")?;
        let period = Period::new(start, end)?;
        let filter = FilterSpec::validate(
            &FilterQuery {
                user_ids: req.user_ids,
                service_names: req.service_names,
                ..Default::default()
            },
            self.config.year_bounds(),
        )?;

        let total_cost = self
            .call("aggregate_cost", self.store.aggregate_cost(period, &filter))
            .await?;
        tracing::debug!(
            period_start = %period.start,
            period_end = %period.end,
            total_cost,
            "total cost computed"
        );
        Ok(TotalCostResponse {
            period: PeriodView {
                start_date: period.start.format(),
                end_date: period.end.format(),
            },
            filter_criteria: FilterCriteria {
                user_ids: filter.user_ids.into_iter().collect(),
                service_names: filter.service_names.into_iter().collect(),
            },
            total_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::storage::DatabaseStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;

    async fn service(dir: &tempfile::TempDir) -> (AccountingService, Arc<FixedClock>) {
        let store = DatabaseStore::new(dir.path().join("svc.db").to_str().unwrap())
            .await
            .unwrap();
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        (
            AccountingService::new(Arc::new(store), clock.clone(), AccountingConfig::default()),
            clock,
        )
    }

    fn create_req(user: Uuid, name: &str, price: i64, start: &str, end: Option<&str>) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            service_name: name.to_string(),
            price,
            user_id: user.to_string(),
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let user = Uuid::new_v4();
        let created = svc
            .create_subscription(create_req(user, " Yandex Plus ", 400, "07-2025", None))
            .await
            .unwrap();
        assert_eq!(created.service_name, "Yandex Plus");
        assert_eq!(svc.get_subscription(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input_before_store() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let user = Uuid::new_v4();

        let err = svc
            .create_subscription(create_req(user, "Netflix", 0, "01-2024", None))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("price"));

        let err = svc
            .create_subscription(create_req(user, "Netflix", 10, "2024-01", None))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("date_format"));

        let err = svc
            .create_subscription(create_req(user, "Netflix", 10, "05-2024", Some("01-2024")))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("date_range"));

        let mut req = create_req(user, "Netflix", 10, "05-2024", None);
        req.user_id = "not-a-uuid".into();
        let err = svc.create_subscription(req).await.unwrap_err();
        assert_eq!(err.field(), Some("user_id"));

        let (items, _) = svc
            .store
            .list(&FilterSpec::default(), Pagination { page: 1, limit: 10 })
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn duplicate_create_names_existing_record() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let user = Uuid::new_v4();
        let first = svc
            .create_subscription(create_req(user, "Netflix", 100, "01-2024", None))
            .await
            .unwrap();
        let err = svc
            .create_subscription(create_req(user, "Netflix", 200, "02-2024", None))
            .await
            .unwrap_err();
        assert!(matches!(&err, LedgerError::Duplicate(msg) if msg.contains(&first.id.to_string())));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_keeps_identity() {
        let dir = tempdir().unwrap();
        let (svc, clock) = service(&dir).await;
        let user = Uuid::new_v4();
        let created = svc
            .create_subscription(create_req(user, "Netflix", 100, "01-2024", None))
            .await
            .unwrap();
        clock.advance(chrono::Duration::hours(1));

        let other = Uuid::new_v4();
        let updated = svc
            .update_subscription(
                created.id,
                create_req(other, "Netflix Premium", 150, "02-2024", Some("12-2024")),
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.user_id, other);
        assert_eq!(svc.get_subscription(created.id).await.unwrap(), updated);

        let missing = svc
            .update_subscription(Uuid::new_v4(), create_req(user, "X", 1, "01-2024", None))
            .await
            .unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn partial_update_rejects_end_before_stored_start() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let created = svc
            .create_subscription(create_req(Uuid::new_v4(), "iCloud", 99, "01-2024", None))
            .await
            .unwrap();
        let err = svc
            .partial_update(
                created.id,
                PartialUpdateRequest {
                    end_date: Some(Some("02-2023".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("date_range"));
        assert_eq!(svc.get_subscription(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn partial_update_sets_and_clears_end() {
        let dir = tempdir().unwrap();
        let (svc, clock) = service(&dir).await;
        let created = svc
            .create_subscription(create_req(Uuid::new_v4(), "iCloud", 99, "01-2024", None))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));

        let bounded = svc
            .partial_update(
                created.id,
                PartialUpdateRequest {
                    price: Some(149),
                    end_date: Some(Some("06-2024".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bounded.price, 149);
        assert_eq!(bounded.end, Some(MonthDate::parse("06-2024").unwrap()));
        assert_eq!(bounded.service_name, "iCloud");
        assert!(bounded.updated_at > created.updated_at);

        let open = svc
            .partial_update(
                created.id,
                PartialUpdateRequest {
                    end_date: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(open.end, None);

        let err = svc
            .partial_update(created.id, PartialUpdateRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("body"));
    }

    #[tokio::test]
    async fn delete_is_not_found_the_second_time() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let created = svc
            .create_subscription(create_req(Uuid::new_v4(), "Spotify", 300, "01-2024", None))
            .await
            .unwrap();
        svc.delete_subscription(created.id).await.unwrap();
        assert!(matches!(
            svc.delete_subscription(created.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn total_cost_applies_filters_and_echoes_them() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let user = Uuid::new_v4();
        svc.create_subscription(create_req(user, "Netflix", 1000, "01-2024", Some("06-2024")))
            .await
            .unwrap();
        svc.create_subscription(create_req(user, "Spotify", 500, "01-2024", None))
            .await
            .unwrap();
        svc.create_subscription(create_req(Uuid::new_v4(), "Netflix", 1000, "01-2024", None))
            .await
            .unwrap();

        let resp = svc
            .get_total_cost(TotalCostRequest {
                start_date: Some("03-2024".into()),
                end_date: Some("12-2024".into()),
                user_ids: vec![user.to_string()],
                service_names: vec!["Netflix".into()],
            })
            .await
            .unwrap();
        assert_eq!(resp.total_cost, 4000);
        assert_eq!(resp.period.start_date, "03-2024");
        assert_eq!(resp.filter_criteria.user_ids, vec![user]);

        let resp = svc
            .get_total_cost(TotalCostRequest {
                start_date: Some("06-2024".into()),
                end_date: Some("08-2024".into()),
                user_ids: vec![user.to_string()],
                service_names: vec!["Spotify".into()],
            })
            .await
            .unwrap();
        assert_eq!(resp.total_cost, 1500);

        let err = svc
            .get_total_cost(TotalCostRequest {
                start_date: Some("12-2024".into()),
                end_date: Some("01-2024".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("date_range"));

        let err = svc
            .get_total_cost(TotalCostRequest {
                end_date: Some("01-2024".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("start_date"));
    }

    #[tokio::test]
    async fn list_clamps_pagination() {
        let dir = tempdir().unwrap();
        let (svc, _) = service(&dir).await;
        let user = Uuid::new_v4();
        for i in 0..3 {
            svc.create_subscription(create_req(user, &format!("svc-{i}"), 10, "01-2024", None))
                .await
                .unwrap();
        }
        let resp = svc
            .list_subscriptions(
                FilterQuery {
                    user_ids: vec![user.to_string()],
                    ..Default::default()
                },
                PageQuery {
                    page: Some(0),
                    limit: Some(10_000),
                },
            )
            .await
            .unwrap();
        assert_eq!(resp.pagination.page, 1);
        assert_eq!(resp.pagination.limit, 100);
        assert_eq!(resp.pagination.total, 3);
        assert_eq!(resp.data.len(), 3);
    }

    struct StalledStore;

    #[async_trait]
    impl SubscriptionStore for StalledStore {
        async fn create(&self, _: &Subscription) -> Result<Uuid> {
            std::future::pending().await
        }
        async fn get_by_id(&self, _: Uuid) -> Result<Subscription> {
            std::future::pending().await
        }
        async fn list(
            &self,
            _: &FilterSpec,
            _: Pagination,
        ) -> Result<(Vec<Subscription>, crate::subscription::PaginationMeta)> {
            std::future::pending().await
        }
        async fn update(&self, _: &Subscription) -> Result<()> {
            std::future::pending().await
        }
        async fn partial_update(
            &self,
            _: Uuid,
            _: &SubscriptionPatch,
            _: DateTime<Utc>,
        ) -> Result<()> {
            std::future::pending().await
        }
        async fn delete(&self, _: Uuid) -> Result<()> {
            std::future::pending().await
        }
        async fn aggregate_cost(&self, _: Period, _: &FilterSpec) -> Result<i64> {
            std::future::pending().await
        }
        async fn exists_by_user_and_service(&self, _: Uuid, _: &str) -> Result<bool> {
            std::future::pending().await
        }
        async fn get_by_user_and_service(&self, _: Uuid, _: &str) -> Result<Option<Subscription>> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_internal() {
        let svc = AccountingService::new(
            Arc::new(StalledStore),
            Arc::new(crate::clock::SystemClock),
            AccountingConfig {
                store_timeout_ms: 50,
                ..Default::default()
            },
        );
        let err = svc.get_subscription(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.kind(), "internal_error");
    }
}
