use axum::{Router, routing::get};
use std::sync::Arc;

use crate::server::AppState;

mod health;
mod subscriptions;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health))
        .route("/live", get(health::live))
        .route("/ready", get(health::ready))
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::create_subscription),
        )
        .route(
            "/subscriptions/summary/total-cost",
            get(subscriptions::total_cost),
        )
        .route(
            "/subscriptions/{id}",
            get(subscriptions::get_subscription)
                .put(subscriptions::update_subscription)
                .patch(subscriptions::patch_subscription)
                .delete(subscriptions::delete_subscription),
        )
}
