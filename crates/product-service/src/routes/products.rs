//! Product catalog endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use common::http::{JsonBody, QueryParams, success};
use common::requests::{BuyProductRequest, CategoryQuery, GetByNameRequest, UpdateStockRequest};
use common::{AppError, RequestContext, layer_span, traced, validate_request};

use crate::AppState;
use crate::model::StockUpdated;
use crate::repository::ProductRepository;

/// GET /products: every product in the catalog.
pub async fn list<R: ProductRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let span = layer_span!("handler", "get_all_products");
    let products = traced(span, &ctx, state.service.get_all(&ctx)).await?;
    tracing::info!(count = products.len(), "products listed");
    Ok(success(products))
}

/// GET /products/category?category=: products of one category.
pub async fn by_category<R: ProductRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    ctx: RequestContext,
    QueryParams(query): QueryParams<CategoryQuery>,
) -> Result<Response, AppError> {
    let category = query.category.unwrap_or_default();
    let span = layer_span!("handler", "get_products_by_category", product.category = %category);
    let products = traced(span, &ctx, async {
        if category.trim().is_empty() {
            return Err(AppError::validation("Missing 'category' query parameter"));
        }
        state.service.get_by_category(&ctx, &category).await
    })
    .await?;
    tracing::info!(%category, count = products.len(), "category products listed");
    Ok(success(products))
}

/// POST /products/details: one product by name.
pub async fn details<R: ProductRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<GetByNameRequest>,
) -> Result<Response, AppError> {
    let span = layer_span!("handler", "get_product_by_name", product.name = %req.name());
    let product = traced(span, &ctx, async {
        validate_request(&req)?;
        state.service.get_by_name(&ctx, req.name()).await
    })
    .await?;
    Ok(success(product))
}

/// PATCH /products/stock: set the stock of a product.
pub async fn update_stock<R: ProductRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<UpdateStockRequest>,
) -> Result<Response, AppError> {
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
    tracing::info!(product = %updated.name, stock = updated.stock, "stock updated");
    Ok(success(updated))
}

/// POST /products/buy: purchase a quantity of a product.
pub async fn buy<R: ProductRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    ctx: RequestContext,
    JsonBody(req): JsonBody<BuyProductRequest>,
) -> Result<Response, AppError> {
    let span = layer_span!("handler", "buy_product", product.name = %req.name());
    let receipt = traced(span, &ctx, async {
        validate_request(&req)?;
        let quantity = req.quantity()?;
        state
            .service
            .buy_product(&ctx, req.name(), quantity)
            .await
            .map_err(|e| {
                if let Some(current_stock) = e.current_stock {
                    tracing::info!(current_stock, "purchase rejected");
                }
                AppError::from(e)
            })
    })
    .await?;
    Ok(success(receipt))
}
