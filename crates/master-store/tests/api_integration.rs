//! Integration tests for the master-store HTTP API, against an unreachable
//! peer and against a live product service.

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const SEED: &str = r#"{
    "Widget": {"name":"Widget","description":"A widget","price":2.5,"stock":10,"category":"Tools"},
    "Teapot": {"name":"Teapot","description":"Short and stout","price":18.0,"stock":7,"category":"Kitchen"}
}"#;

fn seed_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("products.json");
    std::fs::write(&path, SEED).unwrap();
    path
}

async fn master_store(dir: &TempDir, product_service_url: &str) -> axum::Router {
    let config = master_store::config::Config {
        data_file_path: seed_file(dir),
        product_service_url: product_service_url.to_string(),
        product_service_timeout: Duration::from_millis(500),
        ..master_store::config::Config::default()
    };
    let state = master_store::create_state(&config).await.unwrap();
    master_store::create_app(state, get_metrics_handle())
}

/// Serves a product service on an ephemeral port; returns its base URL
/// and data file.
async fn spawn_product_service(dir: &TempDir) -> (String, std::path::PathBuf) {
    let data_file = dir.path().join("central.json");
    std::fs::write(&data_file, SEED).unwrap();
    let config = product_service::config::Config {
        data_file_path: data_file.clone(),
        ..product_service::config::Config::default()
    };
    let state = product_service::create_state(&config).await.unwrap();
    let app = product_service::create_app(state, get_metrics_handle());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), data_file)
}

async fn central_stock(data_file: &std::path::Path, name: &str) -> u32 {
    product_service::store::FileStore::new(data_file)
        .load()
        .await
        .unwrap()[name]
        .stock
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const UNREACHABLE: &str = "http://127.0.0.1:9";

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, UNREACHABLE).await;
    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "master-store");
}

#[tokio::test]
async fn test_list_reports_fixed_stock() {
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, UNREACHABLE).await;
    let (status, json) = send(
        &app,
        Request::builder().uri("/products").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let products = json["data"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert!(products.iter().all(|p| p["stock"] == 10_000));
}

#[tokio::test]
async fn test_sale_completes_with_unreachable_peer() {
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, UNREACHABLE).await;
    let (status, json) = send(
        &app,
        json_request("POST", "/products/buy", json!({"name": "Widget", "quantity": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["quantity"], 3);
    assert_eq!(json["data"]["remaining_stock"], 10_000);
    assert_eq!(json["data"]["synced"], false);
}

#[tokio::test]
async fn test_forwarded_update_with_unreachable_peer_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, UNREACHABLE).await;
    let (status, json) = send(
        &app,
        json_request("PATCH", "/products/stock", json!({"name": "Widget", "stock": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_invalid_quantity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, UNREACHABLE).await;
    let (status, json) = send(
        &app,
        json_request("POST", "/products/buy", json!({"name": "Widget"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "REQUEST_VALIDATION_ERROR");
    assert_eq!(
        json["error"]["message"],
        "Validation failed: Field 'quantity' failed validation on 'required' tag"
    );
}

#[tokio::test]
async fn test_sale_syncs_central_stock() {
    let peer_dir = tempfile::tempdir().unwrap();
    let (url, central) = spawn_product_service(&peer_dir).await;
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, &url).await;

    let (status, json) = send(
        &app,
        json_request("POST", "/products/buy", json!({"name": "Widget", "quantity": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["synced"], true);
    assert_eq!(central_stock(&central, "Widget").await, 9_997);
}

#[tokio::test]
async fn test_forwarded_update_reaches_peer() {
    let peer_dir = tempfile::tempdir().unwrap();
    let (url, central) = spawn_product_service(&peer_dir).await;
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, &url).await;

    let (status, json) = send(
        &app,
        json_request("PATCH", "/products/stock", json!({"name": "Teapot", "stock": 21})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["stock"], 21);
    assert_eq!(central_stock(&central, "Teapot").await, 21);
}

#[tokio::test]
async fn test_forwarded_update_of_unknown_product_fails() {
    let peer_dir = tempfile::tempdir().unwrap();
    let (url, central) = spawn_product_service(&peer_dir).await;
    let dir = tempfile::tempdir().unwrap();
    let app = master_store(&dir, &url).await;

    let (status, json) = send(
        &app,
        json_request("PATCH", "/products/stock", json!({"name": "Ghost", "stock": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(central_stock(&central, "Widget").await, 10);
}
