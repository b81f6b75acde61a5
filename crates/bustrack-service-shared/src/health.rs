//! Liveness and readiness probes.
//!
//! `/health/live` answers as long as the process is serving requests.
//! `/health/ready` additionally pings the primary database and reports how
//! many read replicas are registered.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bustrack_lib::db::PoolHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

/// Deadline for the readiness ping against the primary.
pub const READY_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Probe response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "ok", or "not_ready: <reason>".
    pub status: String,
    pub service: String,
    pub version: String,

    /// Registered read replicas (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<usize>,

    /// Connection ceiling per pool (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_connections: Option<u32>,
}

impl HealthStatus {
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            replicas: None,
            max_open_connections: None,
        }
    }

    pub fn ready(service: &str, version: &str, replicas: usize, max_open: u32) -> Self {
        Self {
            replicas: Some(replicas),
            max_open_connections: Some(max_open),
            ..Self::alive(service, version)
        }
    }

    pub fn not_ready(service: &str, version: &str, reason: &str) -> Self {
        Self {
            status: format!("not_ready: {reason}"),
            ..Self::alive(service, version)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Liveness probe handler.
///
/// ```text
/// GET /health/live
/// {"status":"ok","service":"bustrack-service-shared","version":"0.1.0"}
/// ```
pub async fn health_live() -> impl IntoResponse {
    let status = HealthStatus::alive(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// Readiness probe handler.
///
/// Returns 503 when the primary does not answer a ping within
/// [`READY_PING_TIMEOUT`].
///
/// ```text
/// GET /health/ready
/// {"status":"ok","service":"bustrack-service-shared","version":"0.1.0","replicas":2,"max_open_connections":100}
/// ```
pub async fn health_ready<P: PoolHandle>(State(state): State<AppState<P>>) -> Response {
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    let pool = state.pool();

    if let Err(err) = pool.ping(READY_PING_TIMEOUT).await {
        warn!(error = %err, "readiness check failed");
        let status = HealthStatus::not_ready(service, version, "primary database unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    let status = HealthStatus::ready(
        service,
        version,
        pool.replica_count(),
        pool.limits().max_open,
    );
    (StatusCode::OK, Json(status)).into_response()
}
