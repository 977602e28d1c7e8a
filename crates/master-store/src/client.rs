//! HTTP client for the product service.

use std::time::Duration;

use async_trait::async_trait;
use common::http::REQUEST_ID_HEADER;
use common::{AppError, ErrorCode, RequestContext, layer_span, traced};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Product;

/// Errors raised while talking to the product service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// The request timed out.
    #[error("product service timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// The request could not be sent or the connection failed.
    #[error("product service unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    /// The product service answered with a non-success status.
    #[error("product service returned status {0}")]
    Status(StatusCode),

    /// The response body was not the expected JSON.
    #[error("invalid response from product service: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ClientError {
    fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err)
        } else {
            ClientError::Transport(err)
        }
    }

    /// Maps a peer failure onto the error taxonomy.
    ///
    /// A 404 from the details endpoint is the business not-found; any other
    /// transport or status failure means the peer is unavailable.
    fn into_app_error(self, operation: &'static str, name: &str) -> AppError {
        let error = match &self {
            ClientError::Status(StatusCode::NOT_FOUND) if operation == "product_details" => {
                AppError::not_found(name)
            }
            ClientError::Timeout(_) => AppError::application(
                ErrorCode::ServiceUnavailable,
                "Product service did not respond in time",
            ),
            ClientError::Build(_) => AppError::application(
                ErrorCode::InternalProcessing,
                "Failed to prepare request to product service",
            ),
            ClientError::Transport(_) | ClientError::Status(_) => AppError::application(
                ErrorCode::ServiceUnavailable,
                "Product service is currently unavailable",
            ),
            ClientError::Decode(_) => AppError::application(
                ErrorCode::MalformedData,
                "Failed to understand product service response",
            ),
        };
        let error = match &self {
            ClientError::Status(status) => error.with_context("peer_status", status.as_u16()),
            _ => error,
        };
        error
            .with_context("peer_operation", operation)
            .with_cause(self)
    }
}

/// Calls made by the master store against the central product service.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches one product by name.
    async fn product_details(&self, ctx: &RequestContext, name: &str) -> Result<Product, AppError>;

    /// Sets the central stock of a product.
    async fn update_stock(&self, ctx: &RequestContext, name: &str, stock: u32)
    -> Result<(), AppError>;
}

#[derive(Serialize)]
struct DetailsRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct StockRequest<'a> {
    name: &'a str,
    stock: u32,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// [`CatalogClient`] over HTTP with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_details(&self, ctx: &RequestContext, name: &str) -> Result<Product, ClientError> {
        let response = self
            .http
            .post(self.url("/products/details"))
            .header(REQUEST_ID_HEADER, ctx.request_id().as_str())
            .json(&DetailsRequest { name })
            .send()
            .await
            .map_err(ClientError::from_send)?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::Status(response.status()));
        }

        let envelope: DataEnvelope<Product> =
            response.json().await.map_err(ClientError::Decode)?;
        Ok(envelope.data)
    }

    async fn push_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        stock: u32,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(self.url("/products/stock"))
            .header(REQUEST_ID_HEADER, ctx.request_id().as_str())
            .json(&StockRequest { name, stock })
            .send()
            .await
            .map_err(ClientError::from_send)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ClientError::Status(status)),
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn product_details(&self, ctx: &RequestContext, name: &str) -> Result<Product, AppError> {
        let span = layer_span!(
            "client",
            "product_details",
            product.name = %name,
            peer.service = "product-service",
        );
        traced(span, ctx, async {
            self.fetch_details(ctx, name)
                .await
                .map_err(|e| e.into_app_error("product_details", name))
        })
        .await
    }

    async fn update_stock(
        &self,
        ctx: &RequestContext,
        name: &str,
        stock: u32,
    ) -> Result<(), AppError> {
        let span = layer_span!(
            "client",
            "update_stock",
            product.name = %name,
            product.new_stock = stock,
            peer.service = "product-service",
        );
        traced(span, ctx, async {
            self.push_stock(ctx, name, stock)
                .await
                .map_err(|e| e.into_app_error("update_stock", name))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = HttpCatalogClient::new("http://peer:8082/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://peer:8082");
        assert_eq!(client.url("/products/stock"), "http://peer:8082/products/stock");
    }

    #[test]
    fn status_mapping() {
        let not_found = ClientError::Status(StatusCode::NOT_FOUND);
        let err = not_found.into_app_error("product_details", "Ghost");
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        assert_eq!(err.context_value("peer_status"), Some("404"));

        let not_found = ClientError::Status(StatusCode::NOT_FOUND);
        let err = not_found.into_app_error("update_stock", "Ghost");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);

        let bad_gateway = ClientError::Status(StatusCode::BAD_GATEWAY);
        let err = bad_gateway.into_app_error("product_details", "Widget");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert!(err.cause().is_some());
    }

    #[tokio::test]
    async fn unreachable_peer_is_service_unavailable() {
        // Port 9 on loopback is not expected to accept connections.
        let client = HttpCatalogClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let ctx = RequestContext::detached();
        let err = client.update_stock(&ctx, "Widget", 1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(err.context_value("peer_operation"), Some("update_stock"));
        assert_eq!(err.request_id(), Some(ctx.request_id()));
    }

    #[tokio::test]
    async fn silent_peer_times_out_as_service_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers.
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client =
            HttpCatalogClient::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let ctx = RequestContext::detached();
        let started = std::time::Instant::now();
        let err = client.product_details(&ctx, "Widget").await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(err.message(), "Product service did not respond in time");
        assert_eq!(err.context_value("peer_operation"), Some("product_details"));
        assert!(matches!(
            err.cause().and_then(|c| c.downcast_ref::<ClientError>()),
            Some(ClientError::Timeout(_))
        ));
        silent.abort();
    }
}
