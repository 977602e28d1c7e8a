//! Product repository: owns the product records.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::telemetry::record_stock_level;
use common::{AppError, ChaosInjector, RequestContext, layer_span, traced};
use tokio::sync::RwLock;

use crate::model::Product;
use crate::store::{FileStore, StoreError};

/// Read and stock-update access to the product catalog.
///
/// Not-found is always the business `PRODUCT_NOT_FOUND`; storage failures
/// are application `DATABASE_ACCESS_ERROR`s.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Returns every product, ordered by name.
    async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError>;

    async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Product, AppError>;

    /// Returns the products of one category, ordered by name. Possibly empty.
    async fn get_by_category(
        &self,
        ctx: &RequestContext,
        category: &str,
    ) -> Result<Vec<Product>, AppError>;

    /// Sets the stock of an existing product and persists it.
    async fn update_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        new_stock: u32,
    ) -> Result<(), AppError>;
}

/// Repository over a JSON data file, cached in memory.
///
/// Reads share a lock; an update holds the write lock across lookup,
/// persist and commit, so concurrent updates are serialized.
pub struct FileProductRepository {
    store: FileStore,
    products: RwLock<HashMap<String, Product>>,
    chaos: Arc<ChaosInjector>,
}

impl FileProductRepository {
    /// Loads the catalog from `store`.
    ///
    /// A missing file yields an empty catalog.
    pub async fn open(store: FileStore, chaos: Arc<ChaosInjector>) -> Result<Self, AppError> {
        let products = match store.load().await {
            Ok(products) => products,
            Err(StoreError::Missing(path)) => {
                tracing::warn!(path = %path.display(), "product data file missing, starting with an empty catalog");
                HashMap::new()
            }
            Err(e) => {
                return Err(
                    AppError::database("Failed to read product data", e)
                        .with_context("path", store.path().display()),
                );
            }
        };

        tracing::info!(
            path = %store.path().display(),
            count = products.len(),
            "product catalog loaded"
        );
        for product in products.values() {
            record_stock_level(&product.name, &product.category, product.stock);
        }

        Ok(Self {
            store,
            products: RwLock::new(products),
            chaos,
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }
}

fn sorted(mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by(|a, b| a.name.cmp(&b.name));
    products
}

#[async_trait]
impl ProductRepository for FileProductRepository {
    async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError> {
        let span = layer_span!("repository", "get_all", products.count = tracing::field::Empty);
        let count_field = span.span().clone();
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            let products = self.products.read().await;
            let all = sorted(products.values().cloned().collect());
            count_field.record("products.count", all.len());
            tracing::debug!(count = all.len(), "listing all products");
            Ok(all)
        })
        .await
    }

    async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Product, AppError> {
        let span = layer_span!("repository", "get_by_name", product.name = %name);
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            let products = self.products.read().await;
            let product = products.get(name).cloned().ok_or_else(|| {
                AppError::not_found(name).with_context("operation", "get_by_name")
            })?;
            record_stock_level(&product.name, &product.category, product.stock);
            tracing::debug!(stock = product.stock, "product found");
            Ok(product)
        })
        .await
    }

    async fn get_by_category(
        &self,
        ctx: &RequestContext,
        category: &str,
    ) -> Result<Vec<Product>, AppError> {
        let span = layer_span!(
            "repository",
            "get_by_category",
            product.category = %category,
            products.count = tracing::field::Empty,
        );
        let count_field = span.span().clone();
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            let products = self.products.read().await;
            let matching = sorted(
                products
                    .values()
                    .filter(|p| p.category == category)
                    .cloned()
                    .collect(),
            );
            count_field.record("products.count", matching.len());
            if matching.is_empty() {
                tracing::info!("no products in category");
            }
            Ok(matching)
        })
        .await
    }

    async fn update_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        new_stock: u32,
    ) -> Result<(), AppError> {
        let span = layer_span!(
            "repository",
            "update_stock",
            product.name = %name,
            product.new_stock = new_stock,
        );
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            let mut products = self.products.write().await;

            let product = products.get_mut(name).ok_or_else(|| {
                AppError::not_found(name).with_context("operation", "update_stock")
            })?;
            let old_stock = product.stock;
            let category = product.category.clone();
            product.stock = new_stock;
            tracing::info!(
                old_stock,
                new_stock,
                delta = i64::from(new_stock) - i64::from(old_stock),
                "updating stock"
            );

            if let Err(e) = self.store.save(&products).await {
                if let Some(product) = products.get_mut(name) {
                    product.stock = old_stock;
                }
                return Err(AppError::database("Failed to persist stock update", e)
                    .with_context("product", name)
                    .with_context("path", self.store.path().display()));
            }

            record_stock_level(name, &category, new_stock);
            Ok(())
        })
        .await
    }
}
