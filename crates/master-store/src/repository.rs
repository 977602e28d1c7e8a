//! Store catalog with a fixed stock level.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, ChaosInjector, RequestContext, layer_span, traced};

use crate::model::Product;

/// Stock every product is sold from.
pub const FIXED_STOCK: u32 = 10_000;

/// Read access to the products the store offers.
#[async_trait]
pub trait StoreCatalog: Send + Sync {
    /// Returns every product, ordered by name, at [`FIXED_STOCK`].
    async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError>;
}

/// Catalog loaded once from the shared product data file.
pub struct FixedStockCatalog {
    products: Vec<Product>,
    chaos: Arc<ChaosInjector>,
}

impl FixedStockCatalog {
    pub fn new(products: Vec<Product>, chaos: Arc<ChaosInjector>) -> Self {
        let mut products: Vec<Product> = products
            .into_iter()
            .map(|p| Product {
                stock: FIXED_STOCK,
                ..p
            })
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Self { products, chaos }
    }

    /// Loads the catalog from a JSON object keyed by product name.
    ///
    /// A missing file yields an empty catalog.
    pub async fn open(path: &Path, chaos: Arc<ChaosInjector>) -> Result<Self, AppError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "catalog file missing, starting with an empty catalog");
                return Ok(Self::new(Vec::new(), chaos));
            }
            Err(e) => {
                return Err(AppError::database("Failed to read product data", e)
                    .with_context("path", path.display()));
            }
        };

        let products: HashMap<String, Product> = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::database("Failed to read product data", e).with_context("path", path.display())
        })?;
        tracing::info!(path = %path.display(), count = products.len(), "store catalog loaded");
        Ok(Self::new(products.into_values().collect(), chaos))
    }
}

#[async_trait]
impl StoreCatalog for FixedStockCatalog {
    async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError> {
        let span = layer_span!("repository", "get_all", store.fixed_stock = FIXED_STOCK);
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            Ok(self.products.clone())
        })
        .await
    }
}
