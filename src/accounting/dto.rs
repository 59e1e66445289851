use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::storage::time::to_iso8601_utc_string;
use crate::subscription::{PaginationMeta, Subscription};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub service_name: String,
    pub price: i64,
    pub user_id: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Full replacement body; same shape as creation.
pub type UpdateSubscriptionRequest = CreateSubscriptionRequest;

/// Sparse body for PATCH. `end_date` distinguishes an absent key (leave the
/// end month alone) from `null` or `""` (clear it).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialUpdateRequest {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub end_date: Option<Option<String>>,
}

fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TotalCostRequest {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub service_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodView {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterCriteria {
    pub user_ids: Vec<Uuid>,
    pub service_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalCostResponse {
    pub period: PeriodView,
    pub filter_criteria: FilterCriteria,
    pub total_cost: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub start_date: String,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Subscription> for SubscriptionView {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id,
            service_name: sub.service_name.clone(),
            price: sub.price,
            user_id: sub.user_id,
            start_date: sub.start.format(),
            end_date: sub.end.map(|e| e.format()),
            created_at: to_iso8601_utc_string(&sub.created_at),
            updated_at: to_iso8601_utc_string(&sub.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub data: Vec<SubscriptionView>,
    pub pagination: PaginationMeta,
}
