//! Master-store service: sales from a fixed stock, synced to the product
//! service on a best-effort basis.

use std::sync::Arc;

use common::telemetry::record_sale;
use common::{AppError, ChaosInjector, ErrorCode, RequestContext, layer_span, traced};

use crate::client::CatalogClient;
use crate::model::{Product, SaleReceipt};
use crate::repository::{FIXED_STOCK, StoreCatalog};

/// Price used for metrics when the product service cannot be reached.
pub const DEFAULT_PRICE: f64 = 50.0;
/// Category used for metrics when the product service cannot be reached.
pub const DEFAULT_CATEGORY: &str = "General";

pub struct MasterStoreService<R, C> {
    catalog: R,
    client: C,
    chaos: Arc<ChaosInjector>,
}

impl<R: StoreCatalog, C: CatalogClient> MasterStoreService<R, C> {
    pub fn new(catalog: R, client: C, chaos: Arc<ChaosInjector>) -> Self {
        Self {
            catalog,
            client,
            chaos,
        }
    }

    pub async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError> {
        traced(layer_span!("service", "get_all"), ctx, async {
            self.chaos.simulate().await?;
            self.catalog.get_all(ctx).await
        })
        .await
    }

    /// Sells `quantity` units from the fixed stock.
    ///
    /// The central stock is set to `FIXED_STOCK - quantity`. A failed sync is
    /// logged and reported through [`SaleReceipt::synced`]; the sale still
    /// completes.
    pub async fn buy_product(
        &self,
        ctx: &RequestContext,
        name: &str,
        quantity: u32,
    ) -> Result<SaleReceipt, AppError> {
        let span = layer_span!(
            "service",
            "buy_product",
            product.name = %name,
            product.purchase_quantity = quantity,
            store.fixed_stock = FIXED_STOCK,
            store.synced = tracing::field::Empty,
        );
        let synced_field = span.span().clone();

        traced(span, ctx, async {
            self.chaos.simulate().await?;

            if quantity > FIXED_STOCK {
                return Err(AppError::business(
                    ErrorCode::InsufficientStock,
                    format!(
                        "Insufficient stock for product '{name}'. Available: {FIXED_STOCK}, Requested: {quantity}"
                    ),
                )
                .with_context("requested", quantity)
                .with_context("available", FIXED_STOCK));
            }

            let central_stock = FIXED_STOCK - quantity;
            let synced = match self.client.update_stock(ctx, name, central_stock).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        code = %err.code(),
                        "completing sale despite central inventory sync failure"
                    );
                    false
                }
            };
            synced_field.record("store.synced", synced);

            let (price, category) = match self.client.product_details(ctx, name).await {
                Ok(details) => (details.price, details.category),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        price = DEFAULT_PRICE,
                        category = DEFAULT_CATEGORY,
                        "product details unavailable, using defaults for metrics"
                    );
                    (DEFAULT_PRICE, DEFAULT_CATEGORY.to_string())
                }
            };

            let revenue = price * f64::from(quantity);
            record_sale(name, &category, quantity, revenue);
            tracing::info!(quantity, revenue, synced, "sale completed");

            Ok(SaleReceipt {
                name: name.to_string(),
                quantity,
                remaining_stock: FIXED_STOCK,
                synced,
            })
        })
        .await
    }

    /// Forwards a stock update to the product service.
    pub async fn update_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        stock: u32,
    ) -> Result<(), AppError> {
        let span = layer_span!(
            "service",
            "update_stock",
            product.name = %name,
            product.new_stock = stock,
        );
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            self.client.update_stock(ctx, name, stock).await
        })
        .await
    }
}
