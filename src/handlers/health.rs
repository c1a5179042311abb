//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check with request-log status
//! - `GET /ready` - Kubernetes-compatible readiness probe
//!
//! Both bypass mediation: they answer plain JSON with no envelope, so probes
//! are neither rate limited nor written to the request log.
//!
//! # Health vs Readiness
//!
//! - **Health** (`/health`): Returns 200 even if degraded, includes details
//! - **Readiness** (`/ready`): Returns 503 if not ready to serve traffic

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, ReadinessResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// Always returns 200 OK. The service is `degraded` when rate limiting is on
/// but no request log is configured, since every mediated request will then
/// abort.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "log_enabled": true,
///   "log_records": 42,
///   "uptime_seconds": 360,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let log_enabled = state.log_store.is_some();
    let degraded = state.config.rate_limit.enabled && !log_enabled;

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        log_enabled,
        log_records: state.log_store.as_ref().and_then(|s| s.record_count()),
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// Returns 200 OK if the service is ready to accept traffic,
/// 503 Service Unavailable otherwise.
///
/// # Usage
///
/// Configure in Kubernetes:
/// ```yaml
/// readinessProbe:
///   httpGet:
///     path: /ready
///     port: 3000
///   initialDelaySeconds: 5
///   periodSeconds: 10
/// ```
#[instrument(skip(state))]
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    if state.config.rate_limit.enabled && state.log_store.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                reason: Some("Rate limiting is enabled without a request log".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            ready: true,
            reason: None,
        }),
    )
}
