//! Bus service.
//!
//! Establishes the primary/replica MySQL pools (retrying with exponential
//! backoff), builds the Kafka event publisher, and serves probes until Ctrl-C.
//! On shutdown the publisher is closed before the pools.
//!
//! # Endpoints
//!
//! - `GET /health/live` - liveness probe
//! - `GET /health/ready` - readiness probe, pings the primary
//! - `GET /metrics` - Prometheus metrics (path set by `METRICS_PATH`)
//!
//! # Configuration
//!
//! - `MASTER_DB_*`, `SLAVE_n_DB_*`, `DB_*` - database endpoints and retry settings
//! - `KAFKA_*` - broker address, batching and retry settings
//! - `RUST_LOG`, `LOG_FORMAT`, `SERVICE_NAME` - logging
//! - `METRICS_ENABLED`, `METRICS_PATH` - exporter
//! - `SERVICE_PORT` - HTTP port (default: 8080)

use std::net::SocketAddr;

use axum::{routing::get, Router};
use bustrack_lib::config::{ConnectionConfig, PublisherConfig};
use bustrack_lib::db::PoolHandle;
use bustrack_lib::env;
use bustrack_service_shared::{
    health_live, health_ready, init_logging, init_metrics, metrics_handler, AppState,
    LoggingConfig, MetricsConfig,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const DEFAULT_SERVICE_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_config = LoggingConfig::from_env().with_service("bus");
    init_logging(&logging_config);

    let metrics_config = MetricsConfig::from_env();
    if let Err(e) = init_metrics(&metrics_config) {
        warn!(error = %e, "continuing without metrics");
    }

    let db_config = ConnectionConfig::from_env();
    let publisher_config = PublisherConfig::from_env();
    let port = env::get_int("SERVICE_PORT", DEFAULT_SERVICE_PORT);

    info!(
        port,
        db = ?db_config,
        broker = %publisher_config.broker_addr,
        "starting bus service"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let state = <AppState>::connect(db_config, &publisher_config, &shutdown)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to initialize dependencies");
            e
        })?;

    let app = router(state.clone(), &metrics_config);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");

    let stop = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await;

    info!("shutting down");
    // Close dependencies even when the server stopped on an error.
    let closed = state.shutdown().await;
    served?;
    closed?;
    Ok(())
}

/// Routes served by the bus service.
fn router<P: PoolHandle>(state: AppState<P>, metrics: &MetricsConfig) -> Router {
    let mut app = Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready::<P>));
    if metrics.enabled {
        app = app.route(&metrics.path, get(metrics_handler));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
    }
    token.cancel();
}
