//! Read-only view of the request a pipeline mediates.
//!
//! Everything the mediation components need from the transport is captured
//! here once, when the request arrives: client address, headers, query
//! parameters, the raw body and a snapshot of CGI-style environment fields
//! (`HTTP_HOST`, `REMOTE_ADDR`, `REQUEST_METHOD`, ...) for `meta.request`.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri, Version};
use chrono::{DateTime, Utc};

use crate::encoding::{Extension, normalize_utf8};
use crate::error::AppError;
use crate::middleware::ip::{TrustedProxyConfig, is_secure, resolve_client_ip};
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::pipeline::AuthMessage;
use crate::state::AppState;

/// Query parameters checked for a JSONP callback. The later name wins.
pub const CALLBACK_PARAMS: [&str; 2] = ["jsoncallback", "callback"];

/// Snapshot of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Query pairs in the order they were sent.
    pub query: Vec<(String, String)>,
    /// Resolved client address, if any.
    pub ip: Option<String>,
    /// Whether the client connected over HTTPS.
    pub secure: bool,
    pub request_id: Option<String>,
    /// Message left by an authorization layer for this request only.
    pub auth_message: Option<String>,
    /// Environment fields keyed by upper-case name.
    pub environment: BTreeMap<String, String>,
    pub body: Bytes,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    /// Capture a request from its parts.
    pub fn capture(
        parts: &Parts,
        body: Bytes,
        peer: Option<SocketAddr>,
        trusted: &TrustedProxyConfig,
    ) -> Self {
        let peer_ip = peer.map(|addr| addr.ip());
        let ip = resolve_client_ip(&parts.headers, peer_ip, trusted);
        let secure = is_secure(
            &parts.headers,
            parts.uri.scheme_str(),
            peer_ip,
            trusted,
        );
        let query = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let auth_message = parts
            .extensions
            .get::<AuthMessage>()
            .map(|AuthMessage(message)| message.clone());
        let received_at = Utc::now();

        let environment = snapshot_environment(
            &parts.method,
            &parts.uri,
            parts.version,
            &parts.headers,
            ip.as_deref(),
            received_at,
        );

        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            query,
            ip,
            secure,
            request_id,
            auth_message,
            environment,
            body,
            received_at,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Extension of the last path segment, as written (`widgets.json` → `json`).
    pub fn raw_extension(&self) -> Option<&str> {
        self.path()
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }

    /// Negotiated content extension, if the path carries a supported one.
    pub fn extension(&self) -> Option<Extension> {
        self.raw_extension().and_then(|ext| ext.parse().ok())
    }

    /// Raw `Authorization` header, normalized to UTF-8.
    pub fn authorization(&self) -> Option<String> {
        self.headers
            .get(AUTHORIZATION)
            .map(|v| normalize_utf8(v.as_bytes()).into_owned())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Last value sent for a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Requested JSONP callback name, unvalidated.
    pub fn callback(&self) -> Option<&str> {
        CALLBACK_PARAMS
            .iter()
            .rev()
            .find_map(|name| self.query_param(name))
            .filter(|cb| !cb.is_empty())
    }
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn snapshot_environment(
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
    ip: Option<&str>,
    received_at: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for (name, value) in headers {
        let key = format!(
            "HTTP_{}",
            name.as_str().to_ascii_uppercase().replace('-', "_")
        );
        env.insert(key, normalize_utf8(value.as_bytes()).into_owned());
    }

    if let Some(ip) = ip {
        env.insert("REMOTE_ADDR".to_string(), ip.to_string());
    }
    env.insert("REQUEST_METHOD".to_string(), method.to_string());
    env.insert("REQUEST_TIME".to_string(), received_at.timestamp().to_string());
    env.insert(
        "REQUEST_URI".to_string(),
        uri.path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string()),
    );
    env.insert(
        "SERVER_PROTOCOL".to_string(),
        protocol_name(version).to_string(),
    );
    if let Some(host) = uri.host().or_else(|| {
        headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h))
    }) {
        env.insert("SERVER_NAME".to_string(), host.to_string());
    }

    env
}

/// Extractor producing a [`RequestContext`].
///
/// Must be the last extractor of a handler since it consumes the body.
pub struct RestRequest(pub RequestContext);

impl FromRequest<AppState> for RestRequest {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = req.into_parts();
        let body = Bytes::from_request(Request::from_parts(parts.clone(), body), state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Unreadable request body: {e}")))?;

        let mut ctx = RequestContext::capture(&parts, body, peer, &state.trusted_proxies);
        ctx.environment
            .insert("SERVER_ADDR".to_string(), state.config.server_addr());
        Ok(RestRequest(ctx))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn context(uri: &str, headers: &[(&str, &str)]) -> RequestContext {
        let mut builder = HttpRequest::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        RequestContext::capture(
            &parts,
            Bytes::new(),
            Some("10.0.0.7:5555".parse().unwrap()),
            &TrustedProxyConfig::default(),
        )
    }

    #[test]
    fn test_extension_from_path() {
        assert_eq!(context("/widgets.json", &[]).extension(), Some(Extension::Json));
        assert_eq!(context("/widgets/3.xml", &[]).extension(), Some(Extension::Xml));
        assert_eq!(context("/widgets/3.csv", &[]).extension(), None);
        assert_eq!(context("/widgets/3.csv", &[]).raw_extension(), Some("csv"));
        assert_eq!(context("/v1.0/widgets", &[]).raw_extension(), None);
    }

    #[test]
    fn test_callback_prefers_later_name() {
        let ctx = context("/widgets.json?jsoncallback=a&callback=b", &[]);
        assert_eq!(ctx.callback(), Some("b"));

        let ctx = context("/widgets.json?jsoncallback=a", &[]);
        assert_eq!(ctx.callback(), Some("a"));

        let ctx = context("/widgets.json?callback=", &[]);
        assert_eq!(ctx.callback(), None);
    }

    #[test]
    fn test_query_param_last_value_wins() {
        let ctx = context("/widgets.json?page=1&page=2", &[]);
        assert_eq!(ctx.query_param("page"), Some("2"));
        assert_eq!(ctx.query_param("missing"), None);
    }

    #[test]
    fn test_environment_snapshot() {
        let ctx = context(
            "/widgets.json?x=1",
            &[("host", "api.example.com:8080"), ("user-agent", "curl/8")],
        );
        assert_eq!(ctx.environment["HTTP_HOST"], "api.example.com:8080");
        assert_eq!(ctx.environment["HTTP_USER_AGENT"], "curl/8");
        assert_eq!(ctx.environment["REMOTE_ADDR"], "10.0.0.7");
        assert_eq!(ctx.environment["REQUEST_METHOD"], "POST");
        assert_eq!(ctx.environment["REQUEST_URI"], "/widgets.json?x=1");
        assert_eq!(ctx.environment["SERVER_PROTOCOL"], "HTTP/1.1");
        assert_eq!(ctx.environment["SERVER_NAME"], "api.example.com");
    }

    #[test]
    fn test_authorization_and_request_id() {
        let ctx = context(
            "/widgets.json",
            &[
                ("authorization", "TRUEREST apikey=abc"),
                ("x-request-id", "req-1"),
            ],
        );
        assert_eq!(ctx.authorization().as_deref(), Some("TRUEREST apikey=abc"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
        assert!(!ctx.secure);
    }

    #[test]
    fn test_forwarded_proto_marks_secure() {
        let ctx = context("/widgets.json", &[("x-forwarded-proto", "https")]);
        assert!(ctx.secure);
    }

    #[test]
    fn test_auth_message_read_from_extensions() {
        assert!(context("/widgets.json", &[]).auth_message.is_none());

        let mut request = HttpRequest::builder()
            .uri("/widgets.json")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(AuthMessage("Login first".to_string()));
        let (parts, ()) = request.into_parts();
        let ctx = RequestContext::capture(&parts, Bytes::new(), None, &TrustedProxyConfig::default());
        assert_eq!(ctx.auth_message.as_deref(), Some("Login first"));
    }
}
