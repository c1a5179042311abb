//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Adds X-Request-Id header
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 if exceeded
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler ─► RestPipeline (credentials, rate limit, envelope)
//! ```
//!
//! Authentication and rate limiting are not layers here. Both happen inside
//! the mediation pipeline so their failures come back as envelopes.
//!
//! # Route Groups
//!
//! - `/health`, `/ready` - Health & monitoring (not mediated)
//! - `/{resource}` - `GET` index, `POST` add
//! - `/{resource}/{id}` - `GET` view, `PUT` edit, `DELETE` delete

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::RequestIdLayer;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Arguments
///
/// * `state` - Application state containing config and services
///
/// # Returns
///
/// Fully configured Axum router ready to be served. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the pipeline
/// sees the client address.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // Build Router with Routes
    // =========================================================================
    let mut router = Router::new()
        // Health and status endpoints (never mediated)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Mediated resources
        .route(
            "/{resource}",
            get(handlers::index).post(handlers::add),
        )
        .route(
            "/{resource}/{id}",
            get(handlers::view)
                .put(handlers::edit)
                .delete(handlers::delete),
        );

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit (prevents DoS via large payloads)
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Request ID
    router = router.layer(RequestIdLayer::new());

    info!(
        extensions = ?config.extensions,
        rate_limit = config.rate_limit.enabled,
        logging = state.log_store.is_some(),
        "REST mediation configured"
    );

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Arguments
///
/// * `allowed_origins` - List of allowed origins, or `["*"]` for any origin
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    // Check if we should allow any origin
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Parse specific origins
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
