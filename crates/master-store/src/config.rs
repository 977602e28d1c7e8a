//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use common::{ChaosConfig, LogFormat, OtlpConfig};

/// Master-store configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Path of the JSON catalog listed by `GET /products`.
    pub data_file_path: PathBuf,
    /// Base URL of the product service, without a trailing slash.
    pub product_service_url: String,
    /// Timeout applied to every call to the product service.
    pub product_service_timeout: Duration,
    pub chaos: ChaosConfig,
    pub otlp: Option<OtlpConfig>,
}

impl Config {
    /// Loads configuration from environment variables with defaults.
    ///
    /// - `HOST` (default: `0.0.0.0`)
    /// - `PORT` (default: `8083`)
    /// - `RUST_LOG` (default: `info`)
    /// - `LOG_FORMAT` (`text` or `json`, default: `text`)
    /// - `PRODUCT_DATA_FILE_PATH` (default: `data/products.json`)
    /// - `PRODUCT_SERVICE_URL` (default: `http://localhost:8082`)
    /// - `PRODUCT_SERVICE_TIMEOUT_MS` (default: `5000`)
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME` (export off by default)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .ok()
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            data_file_path: std::env::var("PRODUCT_DATA_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file_path),
            product_service_url: std::env::var("PRODUCT_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.product_service_url),
            product_service_timeout: std::env::var("PRODUCT_SERVICE_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.product_service_timeout),
            chaos: ChaosConfig::from_env(),
            otlp: OtlpConfig::from_env("master-store"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            data_file_path: PathBuf::from("data/products.json"),
            product_service_url: "http://localhost:8082".to_string(),
            product_service_timeout: Duration::from_millis(5000),
            chaos: ChaosConfig::default(),
            otlp: None,
        }
    }
}
