//! Storefront HTTP service selling from a fixed stock.
//!
//! Sales are pushed to the central product service over HTTP; a failed
//! push is logged and the sale still completes.

pub mod client;
pub mod config;
pub mod model;
pub mod repository;
pub mod routes;
pub mod service;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use common::{AppError, ChaosInjector, ErrorCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use client::{CatalogClient, HttpCatalogClient};
use config::Config;
use repository::{FixedStockCatalog, StoreCatalog};
use service::MasterStoreService;

/// Shared application state accessible from all handlers.
pub struct AppState<R, C> {
    pub service: MasterStoreService<R, C>,
}

impl<R: StoreCatalog, C: CatalogClient> AppState<R, C> {
    pub fn new(service: MasterStoreService<R, C>) -> Self {
        Self { service }
    }
}

/// Builds the state described by `config`.
pub async fn create_state(
    config: &Config,
) -> Result<Arc<AppState<FixedStockCatalog, HttpCatalogClient>>, AppError> {
    let chaos = Arc::new(ChaosInjector::new(config.chaos.clone()));
    let catalog = FixedStockCatalog::open(&config.data_file_path, chaos.clone()).await?;
    let client = HttpCatalogClient::new(&config.product_service_url, config.product_service_timeout)
        .map_err(|e| {
            AppError::application(
                ErrorCode::InternalProcessing,
                "Failed to create product service client",
            )
            .with_cause(e)
        })?;
    Ok(Arc::new(AppState::new(MasterStoreService::new(
        catalog, client, chaos,
    ))))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, C>(state: Arc<AppState<R, C>>, metrics_handle: PrometheusHandle) -> Router
where
    R: StoreCatalog + 'static,
    C: CatalogClient + 'static,
{
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<R, C>))
        .route("/products/buy", post(routes::products::buy::<R, C>))
        .route("/products/stock", patch(routes::products::update_stock::<R, C>))
        .with_state(state)
        .merge(common::http::metrics_router(metrics_handle))
        .layer(CatchPanicLayer::custom(common::http::panic_response))
        .layer(middleware::from_fn(common::http::propagate_request_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
