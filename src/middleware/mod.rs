//! Transport-level middleware and helpers.
//!
//! - **Request ID**: Generation and propagation of `X-Request-Id`
//! - **Client address**: Trusted-proxy aware IP and scheme resolution
//!
//! ```text
//! Request → Request ID → Trace → CORS → Handler → Response
//!               ↓
//!        X-Request-Id header
//! ```
//!
//! Authentication and rate limiting live in the mediation pipeline, not
//! here, so that their failures are reported inside the response envelope.

pub mod ip;
pub mod request_id;

pub use ip::{TrustedProxyConfig, resolve_client_ip};
pub use request_id::{REQUEST_ID_HEADER, RequestIdLayer};
