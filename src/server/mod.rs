pub mod handlers;
pub(crate) mod util;

use axum::Router;
use std::sync::Arc;

use crate::accounting::AccountingService;
use crate::clock::SystemClock;
use crate::config::Settings;
use crate::error::Result as AppResult;
use crate::storage::{DatabaseStore, PgStore};
use crate::subscription::SubscriptionStore;

#[derive(Clone)]
pub struct AppState {
    pub service: AccountingService,
}

/// Postgres when `storage.pg_url` is set, the SQLite file otherwise.
pub async fn open_store(config: &Settings) -> AppResult<Arc<dyn SubscriptionStore>> {
    if let Some(pg_url) = &config.storage.pg_url {
        let store = PgStore::connect(
            pg_url,
            &config.storage.pg_schema,
            config.storage.pg_pool_size,
        )
        .await?;
        tracing::info!("Using PostgreSQL for subscriptions");
        Ok(Arc::new(store))
    } else {
        let store = DatabaseStore::new(&config.storage.database_path).await?;
        tracing::info!("Using SQLite for subscriptions");
        Ok(Arc::new(store))
    }
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let routes = handlers::routes();
    let mut app = Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .with_state(app_state);

    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true);
    app = app
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http());
    app
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let store = open_store(&config).await?;
    let service = AccountingService::new(
        store,
        Arc::new(SystemClock),
        config.accounting.clone(),
    );
    let app_state = AppState { service };
    Ok(build_router(Arc::new(app_state)))
}
