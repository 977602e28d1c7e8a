//! Service configuration loaded from environment variables.

use std::path::PathBuf;

use common::{ChaosConfig, LogFormat, OtlpConfig};

/// Product-service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind the server to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Path of the JSON product data file.
    pub data_file_path: PathBuf,
    /// Fault injection settings.
    pub chaos: ChaosConfig,
    /// OTLP trace export, enabled by `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub otlp: Option<OtlpConfig>,
}

impl Config {
    /// Loads configuration from environment variables with defaults.
    ///
    /// - `HOST` (default: `0.0.0.0`)
    /// - `PORT` (default: `8082`)
    /// - `RUST_LOG` (default: `info`)
    /// - `LOG_FORMAT` (`text` or `json`, default: `text`)
    /// - `PRODUCT_DATA_FILE_PATH` (default: `data/products.json`)
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
            chaos: ChaosConfig::from_env(),
            otlp: OtlpConfig::from_env("product-service"),
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
            port: 8082,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            data_file_path: PathBuf::from("data/products.json"),
            chaos: ChaosConfig::default(),
            otlp: None,
        }
    }
}
