//! Span lifecycle helpers, metric names and subscriber setup.
//!
//! Each layer operation opens exactly one span with [`layer_span!`] and
//! runs its body through [`traced`], which closes the span on every exit
//! path, panics included, and derives the span status from the result.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use tracing::{Instrument, Span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{AppError, ErrorCode};
use crate::types::{RequestContext, RequestId};

pub const ERRORS_TOTAL: &str = "app_errors_total";
pub const OPERATION_DURATION_SECONDS: &str = "app_operation_duration_seconds";
pub const PRODUCT_STOCK_COUNT: &str = "app_product_stock_count";
pub const REVENUE_CENTS_TOTAL: &str = "app_revenue_cents_total";
pub const ITEMS_SOLD_TOTAL: &str = "app_items_sold_total";

/// Opens a [`LayerSpan`] named `"<layer>.<operation>"`.
///
/// Extra span fields follow the operation name using `tracing` field
/// syntax. Fields recorded later must be declared here as
/// `tracing::field::Empty`.
///
/// ```ignore
/// let span = layer_span!("repository", "get_by_name", product.name = %name);
/// ```
#[macro_export]
macro_rules! layer_span {
    ($layer:literal, $operation:literal $(, $($fields:tt)*)?) => {
        $crate::telemetry::LayerSpan::start(
            $layer,
            $operation,
            $crate::__tracing::info_span!(
                concat!($layer, ".", $operation),
                layer = $layer,
                operation = $operation,
                request_id = $crate::__tracing::field::Empty,
                otel.status_code = $crate::__tracing::field::Empty,
                otel.status_message = $crate::__tracing::field::Empty,
                error.code = $crate::__tracing::field::Empty,
                error.category = $crate::__tracing::field::Empty,
                $($($fields)*)?
            ),
        )
    };
}

/// Final status of a layer span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    /// The span was dropped before the operation completed.
    Unset,
    Ok,
    Error(String),
}

/// Error types that can flow through [`traced`].
pub trait LayerError: Sized {
    /// The application error driving span status.
    fn app_error(&self) -> &AppError;

    /// Records the request ID unless one is already set.
    fn stamp_request_id(&mut self, request_id: &RequestId);

    /// Wraps an error produced by a recovered panic.
    fn from_panic(err: AppError) -> Self;
}

impl LayerError for AppError {
    fn app_error(&self) -> &AppError {
        self
    }

    fn stamp_request_id(&mut self, request_id: &RequestId) {
        AppError::stamp_request_id(self, request_id.clone());
    }

    fn from_panic(err: AppError) -> Self {
        err
    }
}

/// A span scoped to one layer operation.
pub struct LayerSpan {
    span: Span,
    layer: &'static str,
    operation: &'static str,
    started: Instant,
    status: Option<SpanStatus>,
}

impl LayerSpan {
    pub fn start(layer: &'static str, operation: &'static str, span: Span) -> Self {
        Self {
            span,
            layer,
            operation,
            started: Instant::now(),
            status: None,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn layer(&self) -> &'static str {
        self.layer
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Records a value for a field declared when the span was opened.
    pub fn record<V: tracing::Value>(&self, field: &str, value: V) {
        self.span.record(field, value);
    }

    /// Closes the span, deriving its status from `result`.
    pub fn end<T, E: LayerError>(mut self, result: &Result<T, E>) -> SpanStatus {
        let status = match result {
            Ok(_) => {
                self.span.record("otel.status_code", "OK");
                SpanStatus::Ok
            }
            Err(e) => {
                let err = e.app_error();
                self.span.record("otel.status_code", "ERROR");
                self.span.record("otel.status_message", err.message());
                self.span.record("error.code", err.code().as_str());
                self.span.record("error.category", err.category().as_str());
                tracing::debug!(parent: &self.span, error = %err, "operation failed");
                metrics::counter!(
                    ERRORS_TOTAL,
                    "code" => err.code().as_str(),
                    "category" => err.category().as_str(),
                    "layer" => self.layer,
                    "operation" => self.operation,
                )
                .increment(1);
                SpanStatus::Error(err.message().to_string())
            }
        };

        metrics::histogram!(
            OPERATION_DURATION_SECONDS,
            "layer" => self.layer,
            "operation" => self.operation,
        )
        .record(self.started.elapsed().as_secs_f64());

        self.status = Some(status.clone());
        status
    }
}

impl Drop for LayerSpan {
    fn drop(&mut self) {
        if self.status.is_none() {
            tracing::debug!(
                parent: &self.span,
                layer = self.layer,
                operation = self.operation,
                "span dropped before completion"
            );
        }
    }
}

/// Runs one layer operation inside `span`.
///
/// A panic inside `operation` is recovered and turned into a
/// `SYSTEM_PANIC` error carrying the panic message as `panic` context.
/// Errors are stamped with the request ID, then the span is closed.
pub async fn traced<T, E, F>(span: LayerSpan, ctx: &RequestContext, operation: F) -> Result<T, E>
where
    E: LayerError,
    F: Future<Output = Result<T, E>>,
{
    span.record("request_id", ctx.request_id().as_str());

    let outcome = AssertUnwindSafe(operation)
        .catch_unwind()
        .instrument(span.span().clone())
        .await;

    let mut result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                parent: span.span(),
                layer = span.layer(),
                operation = span.operation(),
                panic = %message,
                "recovered panic"
            );
            Err(E::from_panic(panic_error(span.operation(), &message)))
        }
    };

    if let Err(e) = &mut result {
        e.stamp_request_id(ctx.request_id());
    }
    span.end(&result);
    result
}

/// Builds the error reported for a recovered panic.
pub fn panic_error(operation: &str, message: &str) -> AppError {
    AppError::application(
        ErrorCode::SystemPanic,
        format!("Unexpected failure during {operation}"),
    )
    .with_context("panic", message)
    .with_context("operation", operation)
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Publishes the current stock of a product.
pub fn record_stock_level(name: &str, category: &str, stock: u32) {
    metrics::gauge!(
        PRODUCT_STOCK_COUNT,
        "product" => name.to_string(),
        "category" => category.to_string(),
    )
    .set(f64::from(stock));
}

/// Publishes revenue and item counts for a completed sale.
pub fn record_sale(name: &str, category: &str, quantity: u32, revenue: f64) {
    let cents = (revenue * 100.0).round().max(0.0) as u64;
    metrics::counter!(
        REVENUE_CENTS_TOTAL,
        "product" => name.to_string(),
        "category" => category.to_string(),
    )
    .increment(cents);
    metrics::counter!(
        ITEMS_SOLD_TOTAL,
        "product" => name.to_string(),
        "category" => category.to_string(),
    )
    .increment(u64::from(quantity));
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// OTLP trace export settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpConfig {
    /// gRPC collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: String,
    /// Value of the `service.name` resource attribute.
    pub service_name: String,
}

impl OtlpConfig {
    /// Reads `OTEL_EXPORTER_OTLP_ENDPOINT` and `OTEL_SERVICE_NAME`.
    ///
    /// Returns `None`, disabling export, when no endpoint is set.
    pub fn from_env(default_service_name: &str) -> Option<Self> {
        Self::from_values(
            std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            std::env::var("OTEL_SERVICE_NAME").ok(),
            default_service_name,
        )
    }

    fn from_values(
        endpoint: Option<String>,
        service_name: Option<String>,
        default_service_name: &str,
    ) -> Option<Self> {
        let endpoint = endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())?;
        let service_name = service_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        Some(Self {
            endpoint,
            service_name,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP span exporter: {0}")]
    Exporter(String),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the OTLP pipeline alive; flushes pending spans when dropped.
#[must_use = "dropping the guard shuts down trace export"]
#[derive(Default)]
pub struct TracingGuard {
    provider: Option<TracerProvider>,
}

impl std::fmt::Debug for TracingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingGuard")
            .field("exporting", &self.exporting())
            .finish()
    }
}

impl TracingGuard {
    /// Whether spans are exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                tracing::warn!(error = %err, "failed to flush OTLP spans");
            }
        }
    }
}

fn tracer_provider(config: &OtlpConfig) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new([KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
        .build())
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `log_level` when set. With an [`OtlpConfig`],
/// spans are also exported to the collector, carrying the
/// `otel.status_code` recorded by [`LayerSpan::end`]. Must be called from
/// within a Tokio runtime when export is enabled.
pub fn init_tracing(
    log_level: &str,
    format: LogFormat,
    otlp: Option<&OtlpConfig>,
) -> Result<TracingGuard, TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let json = format == LogFormat::Json;

    let (provider, otel) = match otlp {
        Some(config) => {
            let provider = tracer_provider(config)?;
            let tracer = provider.tracer(config.service_name.clone());
            (
                Some(provider),
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()?;

    if let (Some(provider), Some(config)) = (&provider, otlp) {
        opentelemetry::global::set_tracer_provider(provider.clone());
        tracing::info!(
            endpoint = %config.endpoint,
            service_name = %config.service_name,
            "exporting traces over OTLP"
        );
    }

    Ok(TracingGuard { provider })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn ctx() -> RequestContext {
        RequestContext::new(RequestId::from("req-test"))
    }

    #[test]
    fn end_with_ok_sets_ok_status() {
        let span = crate::layer_span!("service", "get_all");
        let result: Result<u32, AppError> = Ok(3);
        assert_eq!(span.end(&result), SpanStatus::Ok);
    }

    #[test]
    fn end_with_error_sets_error_status_with_message() {
        let span = crate::layer_span!("repository", "get_by_name", product.name = "Ghost");
        let result: Result<(), AppError> = Err(AppError::not_found("Ghost"));
        assert_eq!(
            span.end(&result),
            SpanStatus::Error("Product with name 'Ghost' not found".to_string())
        );
    }

    #[tokio::test]
    async fn traced_passes_success_through() {
        let result: Result<u32, AppError> =
            traced(crate::layer_span!("service", "get_all"), &ctx(), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn traced_stamps_request_id_once() {
        let result: Result<(), AppError> = traced(
            crate::layer_span!("service", "update_stock"),
            &ctx(),
            async {
                Err(AppError::not_found("Ghost").with_request_id(RequestId::from("inner")))
            },
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.request_id().map(RequestId::as_str), Some("inner"));

        let result: Result<(), AppError> = traced(
            crate::layer_span!("service", "update_stock"),
            &ctx(),
            async { Err(AppError::not_found("Ghost")) },
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.request_id().map(RequestId::as_str), Some("req-test"));
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        assert_eq!(err.category(), ErrorCategory::Business);
    }

    #[tokio::test]
    async fn traced_recovers_panics_as_system_panic() {
        let result: Result<u32, AppError> = traced(
            crate::layer_span!("repository", "get_all"),
            &ctx(),
            async { panic!("ledger exploded") },
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemPanic);
        assert_eq!(err.category(), ErrorCategory::Application);
        assert_eq!(err.context_value("panic"), Some("ledger exploded"));
        assert_eq!(err.context_value("operation"), Some("get_all"));
        assert_eq!(err.request_id().map(RequestId::as_str), Some("req-test"));
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }

    #[test]
    fn otlp_disabled_without_endpoint() {
        assert_eq!(OtlpConfig::from_values(None, None, "product-service"), None);
        assert_eq!(
            OtlpConfig::from_values(Some("  ".to_string()), None, "product-service"),
            None
        );
    }

    #[test]
    fn otlp_service_name_defaults() {
        let config = OtlpConfig::from_values(
            Some("http://collector:4317".to_string()),
            None,
            "master-store",
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://collector:4317");
        assert_eq!(config.service_name, "master-store");

        let config = OtlpConfig::from_values(
            Some("http://collector:4317".to_string()),
            Some("store-eu".to_string()),
            "master-store",
        )
        .unwrap();
        assert_eq!(config.service_name, "store-eu");
    }

    #[test]
    fn default_guard_does_not_export() {
        assert!(!TracingGuard::default().exporting());
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("TEXT".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
