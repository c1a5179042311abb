//! Request correlation ids.
//!
//! Every request leaves this layer with an `X-Request-Id` header: the
//! client's own id when it is usable, a fresh UUIDv4 otherwise. The pipeline
//! copies it into the `request_id` field of the request log, and the same id
//! is echoed on the response, envelopes and aborts alike.
//!
//! ```bash
//! curl -H "X-Request-Id: checkout-42" http://localhost:3000/widgets.json
//! ```
//!
//! Client ids end up in persisted log records, so only short, visible-ASCII
//! values are accepted.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Span, debug};
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied id that is kept.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Adds [`RequestIdService`] to a router.
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let id = assign_request_id(&req);
        req.headers_mut().insert(REQUEST_ID_HEADER, id.clone());

        if let Ok(text) = id.to_str() {
            Span::current().record("request_id", text);
            debug!(request_id = text, "Request id assigned");
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response.headers_mut().insert(REQUEST_ID_HEADER, id);
            Ok(response)
        })
    }
}

/// Whether a client-supplied id may be stored as is.
pub fn is_acceptable_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

/// Keep the client's id when acceptable, otherwise mint a UUIDv4.
fn assign_request_id<B>(req: &Request<B>) -> HeaderValue {
    if let Some(value) = req.headers().get(REQUEST_ID_HEADER)
        && value.to_str().is_ok_and(is_acceptable_id)
    {
        return value.clone();
    }

    let generated = Uuid::new_v4().to_string();
    match HeaderValue::from_str(&generated) {
        Ok(value) => value,
        Err(_) => HeaderValue::from_static("unknown"),
    }
}
