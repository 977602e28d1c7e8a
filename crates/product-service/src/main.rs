//! Product-service entry point.

use product_service::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    let _tracing = common::telemetry::init_tracing(
        &config.log_level,
        config.log_format,
        config.otlp.as_ref(),
    )
    .expect("failed to initialize tracing");

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let state = match product_service::create_state(&config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to load product catalog");
            std::process::exit(1);
        }
    };

    let app = product_service::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        data_file = %config.data_file_path.display(),
        chaos = ?config.chaos,
        "starting product service"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(common::http::shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
