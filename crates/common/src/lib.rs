//! Shared building blocks for the catalog services.
//!
//! Provides the error taxonomy and [`AppError`], request context,
//! response envelopes, request payloads with validation, the chaos
//! injector, layer span helpers and the HTTP boundary used by both
//! `product-service` and `master-store`.

pub mod chaos;
pub mod envelope;
pub mod error;
pub mod http;
pub mod model;
pub mod requests;
pub mod telemetry;
pub mod types;
pub mod validation;

#[doc(hidden)]
pub use tracing as __tracing;

pub use chaos::{ChaosConfig, ChaosInjector, SimulatedError};
pub use envelope::{ErrorDetail, ErrorResponse, SuccessResponse};
pub use error::{AppError, AppErrorBuilder, BoxError, ErrorCategory, ErrorCode};
pub use telemetry::{
    LayerError, LayerSpan, LogFormat, OtlpConfig, SpanStatus, TelemetryError, TracingGuard, traced,
};
pub use types::{RequestContext, RequestId};
pub use validation::validate_request;
