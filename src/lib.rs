//! # REST Mediator
//!
//! A request-mediation layer that sits between HTTP handlers and their
//! clients, featuring:
//!
//! - **Credentials**: `Authorization: TRUEREST apikey=...&class=...` parsing
//! - **Rate Limiting**: Sliding windows counted against the request log
//! - **Request Log**: One persisted record per request, optional file diversion
//! - **Envelopes**: Every response is `{data, meta}` in JSON, JSONP or XML
//! - **Aborts**: Any failure becomes a fully formed envelope with its status
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → CORS → Body limit)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (widgets, resources, health)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RestPipeline                                               │
//! │   credentials · ratelimit · feedback · envelope · encoding  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LogStore (memory, field-to-file diversion)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use rest_mediator::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let addr = config.server_addr();
//!
//!     let state = AppState::new(config);
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Calling a Resource
//!
//! ```bash
//! curl -H "Authorization: TRUEREST apikey=abc&class=Employee" \
//!      "http://localhost:3000/widgets.json?callback=show"
//! ```

pub mod config;
pub mod context;
pub mod credentials;
pub mod discovery;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod feedback;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod restlog;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{RestMediator, RestPipeline};
pub use routes::build_router;
pub use state::AppState;
