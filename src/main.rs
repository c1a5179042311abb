use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};

use rest_mediator::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    utils::init_tracing("info");

    info!(
        "Starting REST mediator v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        extensions = ?config.extensions,
        rate_limit = config.rate_limit.enabled,
        log_enabled = config.log_enabled,
        log_level = %config.log_level,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    } else {
        info!("Metrics export disabled (METRICS_PORT=0)");
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(config);
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET    /health                  - Health check");
    info!("  GET    /ready                   - Readiness check");
    info!("  GET    /resources.json          - Exposed handlers");
    info!("  GET    /widgets.{{json,xml}}      - List widgets");
    info!("  POST   /widgets.json            - Create widget(s)");
    info!("  GET    /widgets/{{id}}.json       - View widget");
    info!("  PUT    /widgets/{{id}}.json       - Update widget");
    info!("  DELETE /widgets/{{id}}.json       - Delete widget");

    // Client addresses feed the request log and anonymous rate limiting.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
