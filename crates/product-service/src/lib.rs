//! Product catalog HTTP service.
//!
//! Serves a JSON-file-backed catalog with read, stock update and purchase
//! endpoints. Every layer reports errors as [`common::AppError`] and
//! opens one span per operation.

pub mod config;
pub mod model;
pub mod repository;
pub mod routes;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use common::{AppError, ChaosInjector};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use repository::{FileProductRepository, ProductRepository};
use service::ProductService;
use store::FileStore;

/// Shared application state accessible from all handlers.
pub struct AppState<R> {
    pub service: ProductService<R>,
}

impl<R: ProductRepository> AppState<R> {
    pub fn new(service: ProductService<R>) -> Self {
        Self { service }
    }
}

/// Builds the file-backed state described by `config`.
pub async fn create_state(
    config: &Config,
) -> Result<Arc<AppState<FileProductRepository>>, AppError> {
    let chaos = Arc::new(ChaosInjector::new(config.chaos.clone()));
    let repo =
        FileProductRepository::open(FileStore::new(&config.data_file_path), chaos.clone()).await?;
    Ok(Arc::new(AppState::new(ProductService::new(repo, chaos))))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: ProductRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<R>))
        .route("/products/category", get(routes::products::by_category::<R>))
        .route("/products/details", post(routes::products::details::<R>))
        .route("/products/stock", patch(routes::products::update_stock::<R>))
        .route("/products/buy", post(routes::products::buy::<R>))
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
