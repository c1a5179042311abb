//! Abort reasons, status lines and the terminal response.

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;

/// Reason phrases emitted on aborted responses.
const STATUS_TABLE: [(u16, &str); 15] = [
    (200, "OK"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (402, "Payment Required"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (407, "Proxy Authentication Required"),
    (408, "Request Time-out"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Time-out"),
];

/// Reason phrase for a status code in the table.
pub fn reason_phrase(code: StatusCode) -> Option<&'static str> {
    STATUS_TABLE
        .iter()
        .find(|(c, _)| *c == code.as_u16())
        .map(|(_, phrase)| *phrase)
}

/// Why a request is being cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A plain failure message. Always 403.
    Message(String),
    /// An explicit descriptor. With neither status nor error the response
    /// is a 200 envelope.
    Structured {
        status: Option<StatusCode>,
        error: Option<String>,
        redirect: Option<String>,
    },
}

impl AbortReason {
    /// Structured abort with no status and no error.
    pub fn quiet() -> Self {
        AbortReason::Structured {
            status: None,
            error: None,
            redirect: None,
        }
    }

    pub fn status(status: StatusCode, error: impl Into<String>) -> Self {
        AbortReason::Structured {
            status: Some(status),
            error: Some(error.into()),
            redirect: None,
        }
    }

    pub fn redirect(url: impl Into<String>, status: Option<StatusCode>) -> Self {
        AbortReason::Structured {
            status,
            error: None,
            redirect: Some(url.into()),
        }
    }
}

impl From<&str> for AbortReason {
    fn from(message: &str) -> Self {
        AbortReason::Message(message.to_string())
    }
}

impl From<String> for AbortReason {
    fn from(message: String) -> Self {
        AbortReason::Message(message)
    }
}

/// Marker returned once the pipeline has produced its terminal response.
///
/// Handler code propagates it with `?`; the response itself stays inside
/// the pipeline until [`super::RestPipeline::respond`] takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Aborted {
    pub status: StatusCode,
}

/// `Ok` to continue, `Err(Aborted)` once the request has been closed out.
pub type Outcome<T> = Result<T, Aborted>;

/// Encoded response ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: StatusCode,
    /// HTTP/1 reason phrase override.
    pub reason: Option<String>,
    /// `None` when content headers are suppressed.
    pub content_type: Option<&'static str>,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl RestResponse {
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl IntoResponse for RestResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        if let Some(location) = self.location
            && let Ok(value) = HeaderValue::from_str(&location)
        {
            response.headers_mut().insert(LOCATION, value);
        }

        // Reason phrases must be visible ASCII; anything else keeps the
        // canonical phrase.
        if let Some(reason) = self.reason
            && let Ok(phrase) = ReasonPhrase::try_from(reason.into_bytes())
        {
            response.extensions_mut().insert(phrase);
        }

        response
    }
}
