//! Storefront endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use common::http::{JsonBody, success};
use common::requests::{BuyProductRequest, UpdateStockRequest};
use common::{AppError, RequestContext, layer_span, traced, validate_request};

use crate::AppState;
use crate::client::CatalogClient;
use crate::model::StockUpdated;
use crate::repository::StoreCatalog;

/// GET /products: the store catalog at fixed stock.
pub async fn list<R, C>(
    State(state): State<Arc<AppState<R, C>>>,
    ctx: RequestContext,
) -> Result<Response, AppError>
where
    R: StoreCatalog + 'static,
    C: CatalogClient + 'static,
{
    let span = layer_span!("handler", "get_all_products");
    let products = traced(span, &ctx, state.service.get_all(&ctx)).await?;
    tracing::info!(count = products.len(), "store products listed");
    Ok(success(products))
}

/// POST /products/buy: sell from the fixed stock.
pub async fn buy<R, C>(
    State(state): State<Arc<AppState<R, C>>>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<BuyProductRequest>,
) -> Result<Response, AppError>
where
    R: StoreCatalog + 'static,
    C: CatalogClient + 'static,
{
    let span = layer_span!("handler", "buy_product", product.name = %req.name());
    let receipt = traced(span, &ctx, async {
        validate_request(&req)?;
        let quantity = req.quantity()?;
        state.service.buy_product(&ctx, req.name(), quantity).await
    })
    .await?;
    Ok(success(receipt))
}

/// PATCH /products/stock: forward a stock update to the product service.
pub async fn update_stock<R, C>(
    State(state): State<Arc<AppState<R, C>>>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<UpdateStockRequest>,
) -> Result<Response, AppError>
where
    R: StoreCatalog + 'static,
    C: CatalogClient + 'static,
{
    let span = layer_span!("handler", "update_product_stock", product.name = %req.name());
    let updated = traced(span, &ctx, async {
        validate_request(&req)?;
        let stock = req.stock()?;
        state.service.update_stock(&ctx, req.name(), stock).await?;
        Ok::<_, AppError>(StockUpdated {
            name: req.name().to_string(),
            stock,
        })
    })
    .await?;
    Ok(success(updated))
}
