use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::accounting::{
    CreateSubscriptionRequest, ListResponse, PartialUpdateRequest, SubscriptionView,
    TotalCostRequest, TotalCostResponse, UpdateSubscriptionRequest,
};
use crate::error::LedgerError;
use crate::server::AppState;
use crate::server::util::{
    body_rejected, parse_flag, parse_id, parse_int, query_rejected, split_csv,
};
use crate::subscription::{FilterQuery, PageQuery};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub user_ids: Option<String>,
    pub service_names: Option<String>,
    pub start_date_from: Option<String>,
    pub start_date_to: Option<String>,
    pub end_date_null: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TotalCostParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_ids: Option<String>,
    pub service_names: Option<String>,
}

pub async fn create_subscription(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubscriptionView>), LedgerError> {
    let Json(req) = body.map_err(body_rejected)?;
    let sub = app_state.service.create_subscription(req).await?;
    Ok((StatusCode::CREATED, Json(SubscriptionView::from(&sub))))
}

pub async fn list_subscriptions(
    State(app_state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListResponse>, LedgerError> {
    let Query(p) = params.map_err(query_rejected)?;
    let filter = FilterQuery {
        user_ids: split_csv(p.user_ids.as_deref()),
        service_names: split_csv(p.service_names.as_deref()),
        start_date_from: p.start_date_from,
        start_date_to: p.start_date_to,
        end_date_null: parse_flag(p.end_date_null.as_deref(), "end_date_null")?,
    };
    let page = PageQuery {
        page: parse_int(p.page.as_deref(), "page")?,
        limit: parse_int(p.limit.as_deref(), "limit")?,
    };
    Ok(Json(app_state.service.list_subscriptions(filter, page).await?))
}

pub async fn get_subscription(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionView>, LedgerError> {
    let sub = app_state.service.get_subscription(parse_id(&id)?).await?;
    Ok(Json(SubscriptionView::from(&sub)))
}

pub async fn update_subscription(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateSubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionView>, LedgerError> {
    let id = parse_id(&id)?;
    let Json(req) = body.map_err(body_rejected)?;
    let sub = app_state.service.update_subscription(id, req).await?;
    Ok(Json(SubscriptionView::from(&sub)))
}

pub async fn patch_subscription(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<PartialUpdateRequest>, JsonRejection>,
) -> Result<Json<SubscriptionView>, LedgerError> {
    let id = parse_id(&id)?;
    let Json(req) = body.map_err(body_rejected)?;
    let sub = app_state.service.partial_update(id, req).await?;
    Ok(Json(SubscriptionView::from(&sub)))
}

pub async fn delete_subscription(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, LedgerError> {
    app_state.service.delete_subscription(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn total_cost(
    State(app_state): State<Arc<AppState>>,
    params: Result<Query<TotalCostParams>, QueryRejection>,
) -> Result<Json<TotalCostResponse>, LedgerError> {
    let Query(p) = params.map_err(query_rejected)?;
    let req = TotalCostRequest {
        start_date: p.start_date,
        end_date: p.end_date,
        user_ids: split_csv(p.user_ids.as_deref()),
        service_names: split_csv(p.service_names.as_deref()),
    };
    Ok(Json(app_state.service.get_total_cost(req).await?))
}
