//! Product service: orchestration over the repository plus the purchase rule.

use std::fmt;
use std::sync::Arc;

use common::telemetry::record_sale;
use common::{
    AppError, ChaosInjector, ErrorCode, LayerError, RequestContext, RequestId, layer_span, traced,
};
use tokio::sync::Mutex;

use crate::model::{Product, PurchaseReceipt};
use crate::repository::ProductRepository;

/// Failure of [`ProductService::buy_product`].
///
/// `current_stock` is the stock observed before the failure, when the
/// product was found.
#[derive(Debug)]
pub struct PurchaseError {
    pub error: AppError,
    pub current_stock: Option<u32>,
}

impl PurchaseError {
    pub fn new(error: AppError, current_stock: Option<u32>) -> Self {
        Self {
            error,
            current_stock,
        }
    }

    fn unknown_stock(error: AppError) -> Self {
        Self::new(error, None)
    }
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_stock {
            Some(stock) => write!(f, "{} (current_stock={stock})", self.error),
            None => fmt::Display::fmt(&self.error, f),
        }
    }
}

impl std::error::Error for PurchaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl LayerError for PurchaseError {
    fn app_error(&self) -> &AppError {
        &self.error
    }

    fn stamp_request_id(&mut self, request_id: &RequestId) {
        self.error.stamp_request_id(request_id.clone());
    }

    fn from_panic(err: AppError) -> Self {
        Self::unknown_stock(err)
    }
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        err.error
    }
}

/// Catalog operations exposed to the handler layer.
///
/// Every stock write goes through `stock_lock`, so a purchase's read and
/// decrement cannot interleave with another purchase or a stock update.
pub struct ProductService<R> {
    repo: R,
    chaos: Arc<ChaosInjector>,
    stock_lock: Mutex<()>,
}

impl<R: ProductRepository> ProductService<R> {
    pub fn new(repo: R, chaos: Arc<ChaosInjector>) -> Self {
        Self {
            repo,
            chaos,
            stock_lock: Mutex::new(()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub async fn get_all(&self, ctx: &RequestContext) -> Result<Vec<Product>, AppError> {
        traced(layer_span!("service", "get_all"), ctx, async {
            self.chaos.simulate().await?;
            self.repo.get_all(ctx).await
        })
        .await
    }

    pub async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Product, AppError> {
        let span = layer_span!("service", "get_by_name", product.name = %name);
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            self.repo.get_by_name(ctx, name).await
        })
        .await
    }

    pub async fn get_by_category(
        &self,
        ctx: &RequestContext,
        category: &str,
    ) -> Result<Vec<Product>, AppError> {
        let span = layer_span!("service", "get_by_category", product.category = %category);
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            self.repo.get_by_category(ctx, category).await
        })
        .await
    }

    pub async fn update_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        new_stock: u32,
    ) -> Result<(), AppError> {
        let span = layer_span!(
            "service",
            "update_stock",
            product.name = %name,
            product.new_stock = new_stock,
        );
        traced(span, ctx, async {
            self.chaos.simulate().await?;
            let _guard = self.stock_lock.lock().await;
            self.repo.update_stock(ctx, name, new_stock).await
        })
        .await
    }

    /// Sells `quantity` units of `name` if enough stock is available.
    ///
    /// The stock check and the decrement run under the stock lock and act
    /// on the same observed stock.
    pub async fn buy_product(
        &self,
        ctx: &RequestContext,
        name: &str,
        quantity: u32,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let span = layer_span!(
            "service",
            "buy_product",
            product.name = %name,
            product.purchase_quantity = quantity,
            product.remaining_stock = tracing::field::Empty,
        );
        let remaining_field = span.span().clone();

        traced(span, ctx, async {
            self.chaos
                .simulate()
                .await
                .map_err(PurchaseError::unknown_stock)?;

            let _guard = self.stock_lock.lock().await;
            let product = self
                .repo
                .get_by_name(ctx, name)
                .await
                .map_err(PurchaseError::unknown_stock)?;

            if product.stock < quantity {
                let error = AppError::business(
                    ErrorCode::InsufficientStock,
                    format!(
                        "Insufficient stock for product '{name}'. Available: {}, Requested: {quantity}",
                        product.stock
                    ),
                )
                .with_context("requested", quantity)
                .with_context("available", product.stock);
                return Err(PurchaseError::new(error, Some(product.stock)));
            }

            let remaining = product.stock - quantity;
            self.repo
                .update_stock(ctx, name, remaining)
                .await
                .map_err(|e| PurchaseError::new(e, Some(product.stock)))?;

            let revenue = product.price * f64::from(quantity);
            record_sale(&product.name, &product.category, quantity, revenue);
            remaining_field.record("product.remaining_stock", remaining);
            tracing::info!(quantity, remaining, revenue, "purchase completed");

            Ok(PurchaseReceipt {
                name: product.name,
                quantity,
                remaining_stock: remaining,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use common::ErrorCategory;
    use tokio::sync::RwLock;

    use super::*;

    /// In-memory repository with switchable failures.
    #[derive(Default)]
    struct MockRepository {
        products: RwLock<HashMap<String, Product>>,
        fail_updates: AtomicBool,
        panic_on_read: AtomicBool,
        read_delay_ms: AtomicU64,
    }

    impl MockRepository {
        fn with(products: &[(&str, u32)]) -> Self {
            let repo = Self::default();
            {
                let mut map = repo.products.try_write().unwrap();
                for (name, stock) in products {
                    map.insert(
                        name.to_string(),
                        Product {
                            name: name.to_string(),
                            description: String::new(),
                            price: 2.5,
                            stock: *stock,
                            category: "Test".to_string(),
                        },
                    );
                }
            }
            repo
        }
    }

    #[async_trait]
    impl ProductRepository for MockRepository {
        async fn get_all(&self, _ctx: &RequestContext) -> Result<Vec<Product>, AppError> {
            Ok(self.products.read().await.values().cloned().collect())
        }

        async fn get_by_name(&self, _ctx: &RequestContext, name: &str) -> Result<Product, AppError> {
            if self.panic_on_read.load(Ordering::SeqCst) {
                panic!("index corrupted");
            }
            let product = self
                .products
                .read()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| AppError::not_found(name));
            let delay = self.read_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            product
        }

        async fn get_by_category(
            &self,
            _ctx: &RequestContext,
            category: &str,
        ) -> Result<Vec<Product>, AppError> {
            Ok(self
                .products
                .read()
                .await
                .values()
                .filter(|p| p.category == category)
                .cloned()
                .collect())
        }

        async fn update_stock(
            &self,
            _ctx: &RequestContext,
            name: &str,
            new_stock: u32,
        ) -> Result<(), AppError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(AppError::database(
                    "Failed to persist stock update",
                    std::io::Error::other("disk full"),
                ));
            }
            let mut products = self.products.write().await;
            let product = products
                .get_mut(name)
                .ok_or_else(|| AppError::not_found(name))?;
            product.stock = new_stock;
            Ok(())
        }
    }

    fn service(repo: MockRepository) -> ProductService<MockRepository> {
        ProductService::new(repo, Arc::new(ChaosInjector::disabled()))
    }

    fn ctx() -> RequestContext {
        RequestContext::new(RequestId::from("svc-test"))
    }

    #[tokio::test]
    async fn buy_decrements_stock() {
        let svc = service(MockRepository::with(&[("Widget", 10)]));
        let receipt = svc.buy_product(&ctx(), "Widget", 3).await.unwrap();
        assert_eq!(receipt.remaining_stock, 7);
        assert_eq!(receipt.quantity, 3);
        assert_eq!(svc.get_by_name(&ctx(), "Widget").await.unwrap().stock, 7);
    }

    #[tokio::test]
    async fn buy_exact_stock_leaves_zero() {
        let svc = service(MockRepository::with(&[("Widget", 4)]));
        let receipt = svc.buy_product(&ctx(), "Widget", 4).await.unwrap();
        assert_eq!(receipt.remaining_stock, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_reports_current_stock() {
        let svc = service(MockRepository::with(&[("Widget", 2)]));
        let err = svc.buy_product(&ctx(), "Widget", 3).await.unwrap_err();
        assert_eq!(err.current_stock, Some(2));
        assert_eq!(err.error.code(), ErrorCode::InsufficientStock);
        assert_eq!(err.error.category(), ErrorCategory::Business);
        assert!(err.error.message().contains("Available: 2, Requested: 3"));
        assert_eq!(err.error.request_id().map(RequestId::as_str), Some("svc-test"));
        assert_eq!(svc.get_by_name(&ctx(), "Widget").await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn unknown_product_has_no_stock() {
        let svc = service(MockRepository::with(&[]));
        let err = svc.buy_product(&ctx(), "Ghost", 1).await.unwrap_err();
        assert_eq!(err.current_stock, None);
        assert_eq!(err.error.code(), ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn failed_update_propagates_with_pre_update_stock() {
        let repo = MockRepository::with(&[("Widget", 5)]);
        repo.fail_updates.store(true, Ordering::SeqCst);
        let svc = service(repo);

        let err = svc.buy_product(&ctx(), "Widget", 1).await.unwrap_err();
        assert_eq!(err.current_stock, Some(5));
        assert_eq!(err.error.code(), ErrorCode::DatabaseAccess);
        assert_eq!(err.error.category(), ErrorCategory::Application);
    }

    #[tokio::test]
    async fn repository_panic_becomes_system_panic() {
        let repo = MockRepository::with(&[("Widget", 5)]);
        repo.panic_on_read.store(true, Ordering::SeqCst);
        let svc = service(repo);

        let err = svc.get_by_name(&ctx(), "Widget").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemPanic);
        assert_eq!(err.context_value("panic"), Some("index corrupted"));
    }

    #[tokio::test]
    async fn pass_through_errors_are_unchanged() {
        let svc = service(MockRepository::with(&[]));
        let err = svc.update_stock(&ctx(), "Ghost", 3).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        assert_eq!(err.message(), "Product with name 'Ghost' not found");
    }

    #[tokio::test]
    async fn concurrent_purchases_never_oversell() {
        let svc = Arc::new(service(MockRepository::with(&[("Widget", 5)])));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.buy_product(&ctx(), "Widget", 1).await.is_ok() })
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            if handle.await.unwrap() {
                sold += 1;
            }
        }
        assert_eq!(sold, 5);
        assert_eq!(svc.get_by_name(&ctx(), "Widget").await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn stock_update_during_purchase_is_not_lost() {
        let repo = MockRepository::with(&[("Widget", 10)]);
        repo.read_delay_ms.store(50, Ordering::SeqCst);
        let svc = Arc::new(service(repo));

        let buyer = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.buy_product(&ctx(), "Widget", 1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        svc.update_stock(&ctx(), "Widget", 100).await.unwrap();

        let receipt = buyer.await.unwrap().unwrap();
        assert_eq!(receipt.remaining_stock, 9);

        svc.repository().read_delay_ms.store(0, Ordering::SeqCst);
        let stock = svc.get_by_name(&ctx(), "Widget").await.unwrap().stock;
        assert_eq!(stock, 100);
    }
}
