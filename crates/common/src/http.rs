//! HTTP boundary shared by both services: status table, error rendering,
//! request-ID propagation and body extraction.

use std::any::Any;
use std::convert::Infallible;

use axum::extract::{FromRequest, FromRequestParts, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::de::DeserializeOwned;

use crate::envelope::{ErrorResponse, SuccessResponse};
use crate::error::{AppError, ErrorCategory, ErrorCode};
use crate::telemetry::{panic_error, panic_message};
use crate::types::{RequestContext, RequestId};

/// Header carrying the request ID in and out of both services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maps an error code to its HTTP status.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ProductNotFound => StatusCode::NOT_FOUND,
        ErrorCode::InsufficientStock => StatusCode::CONFLICT,
        ErrorCode::InvalidProductData => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::OrderLimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::PriceMismatch => StatusCode::CONFLICT,
        ErrorCode::DatabaseAccess => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::RequestValidation => StatusCode::BAD_REQUEST,
        ErrorCode::InternalProcessing => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::ResourceConstraint => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::SystemPanic => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorCode::MalformedData => StatusCode::BAD_REQUEST,
        ErrorCode::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let cause = self.cause().map(ToString::to_string);
        let request_id = self.request_id().map(RequestId::as_str);
        match self.category() {
            ErrorCategory::Business => tracing::warn!(
                code = %self.code(),
                category = %self.category(),
                request_id,
                context = ?self.context(),
                cause,
                "{}",
                self.message()
            ),
            ErrorCategory::Application => tracing::error!(
                code = %self.code(),
                category = %self.category(),
                request_id,
                context = ?self.context(),
                cause,
                "{}",
                self.message()
            ),
        }

        let status = status_for(self.code());
        let mut response = (status, Json(ErrorResponse::from(&self))).into_response();
        if let Some(id) = self.request_id() {
            set_request_id(response.headers_mut(), id);
        }
        response
    }
}

/// Wraps `data` in the success envelope with status 200.
pub fn success<T: serde::Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(SuccessResponse::new(data))).into_response()
}

fn set_request_id(headers: &mut HeaderMap, id: &RequestId) {
    if headers.contains_key(REQUEST_ID_HEADER) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<RequestId> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(RequestId::from)
}

/// Middleware attaching a [`RequestContext`] to every request and echoing
/// its ID on the response.
pub async fn propagate_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request_id_from_headers(request.headers()).unwrap_or_else(RequestId::generate);
    request
        .extensions_mut()
        .insert(RequestContext::new(request_id.clone()));

    let mut response = next.run(request).await;
    set_request_id(response.headers_mut(), &request_id);
    response
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        let request_id = request_id_from_headers(&parts.headers).unwrap_or_else(RequestId::generate);
        Ok(RequestContext::new(request_id))
    }
}

/// JSON body extractor whose rejection is a `REQUEST_VALIDATION_ERROR`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id().clone());

        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                let mut err = AppError::validation("Invalid request body")
                    .with_context("detail", rejection.body_text());
                if let Some(id) = request_id {
                    err.stamp_request_id(id);
                }
                Err(err)
            }
        }
    }
}

/// Query string extractor whose rejection is a `REQUEST_VALIDATION_ERROR`.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => {
                let mut err = AppError::validation("Invalid query parameters")
                    .with_context("detail", rejection.body_text());
                if let Some(ctx) = parts.extensions.get::<RequestContext>() {
                    err.stamp_request_id(ctx.request_id().clone());
                }
                Err(err)
            }
        }
    }
}

/// Response for a panic that escaped every layer, for
/// `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    panic_error("request", &message).into_response()
}

/// Router serving `GET /metrics` in the Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// Resolves on SIGINT or SIGTERM, for `axum::serve(..).with_graceful_shutdown`.
///
/// A signal handler that cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
