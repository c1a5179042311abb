//! Response envelope assembly.
//!
//! Every mediated response has the shape
//!
//! ```json
//! {
//!   "data": { "Widget": { "id": 3, "name": "bolt" } },
//!   "meta": {
//!     "status": "ok",
//!     "feedback": [{ "message": "...", "level": "info" }],
//!     "request": { "request_method": "GET", "remote_addr": "10.0.0.1" },
//!     "credentials": { "class": "Customer", "apikey": "...", "username": null },
//!     "time_epoch": 1705315800,
//!     "time_local": "Mon, 15 Jan 2024 10:30:00 +0000",
//!     "version": "0.3"
//!   }
//! }
//! ```
//!
//! `meta` is omitted when metadata is disabled. The builder also copies the
//! inbound payload and the outgoing data into the request log; this is the
//! only place bodies enter the log trail.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Value, json};

use crate::credentials::CredentialExtractor;
use crate::feedback::Feedback;
use crate::restlog::LogAccumulator;

/// Environment fields exposed by default.
pub const DEFAULT_REQUEST_KEYS: [&str; 8] = [
    "HTTP_HOST",
    "HTTP_USER_AGENT",
    "REMOTE_ADDR",
    "REQUEST_METHOD",
    "REQUEST_TIME",
    "REQUEST_URI",
    "SERVER_ADDR",
    "SERVER_PROTOCOL",
];

/// Primary key field injected after a create.
pub const PRIMARY_KEY: &str = "id";

/// What goes into `meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSettings {
    pub enabled: bool,
    /// Environment fields copied into `meta.request`, lower-cased.
    pub request_keys: Vec<String>,
}

impl Default for MetaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            request_keys: DEFAULT_REQUEST_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Per-call inputs to [`EnvelopeBuilder::build`].
#[derive(Debug, Default)]
pub struct EnvelopeInput<'a> {
    /// Handler output.
    pub payload: Value,
    /// Modelized request body, if one was submitted.
    pub postdata: Option<&'a Value>,
    /// Model name the postdata is wrapped in.
    pub model: &'a str,
    /// Identifier assigned by a create, injected into echoed postdata.
    pub new_id: Option<Value>,
    /// Business-rule failures to report at `validate` level.
    pub validation_errors: Vec<String>,
}

/// Builds envelopes from request state.
pub struct EnvelopeBuilder<'a> {
    pub meta: &'a MetaSettings,
    pub version: Option<&'a str>,
    pub credentials: &'a CredentialExtractor,
    /// Environment snapshot keyed by upper-case names (`HTTP_HOST`, ...).
    pub environment: &'a BTreeMap<String, String>,
}

/// PHP-style emptiness: null, false, zero, `""`, `[]` and `{}`.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

impl EnvelopeBuilder<'_> {
    pub fn build(
        &self,
        input: EnvelopeInput<'_>,
        feedback: &mut Feedback,
        log: &mut LogAccumulator,
        now: DateTime<Utc>,
    ) -> Value {
        let EnvelopeInput {
            payload,
            postdata,
            model,
            new_id,
            validation_errors,
        } = input;

        let data = match postdata {
            Some(post) if is_empty_payload(&payload) && !is_empty_payload(post) => {
                echo_postdata(post.clone(), model, new_id)
            }
            _ => payload,
        };

        if !validation_errors.is_empty() {
            feedback.validate(validation_errors.join("; "));
        }

        let mut envelope = Map::new();
        envelope.insert("data".to_string(), data.clone());

        let meta = self.meta.enabled.then(|| self.meta_block(feedback, now));
        if let Some(meta) = &meta {
            envelope.insert("meta".to_string(), meta.clone());
        }

        log.set("data_in", postdata.cloned().unwrap_or(Value::Null));
        log.set("data_out", data);
        if let Some(meta) = meta {
            log.set("meta", meta);
        }

        Value::Object(envelope)
    }

    fn meta_block(&self, feedback: &Feedback, now: DateTime<Utc>) -> Value {
        let status = if feedback.has_errors() { "error" } else { "ok" };

        let request: Map<String, Value> = self
            .meta
            .request_keys
            .iter()
            .filter_map(|key| {
                self.environment
                    .get(key)
                    .map(|v| (key.to_lowercase(), Value::String(v.clone())))
            })
            .collect();

        let credentials: Map<String, Value> = self
            .credentials
            .settings()
            .fields
            .values()
            .map(|field| (field.clone(), json!(self.credentials.field(field))))
            .collect();

        let mut meta = Map::new();
        meta.insert("status".to_string(), json!(status));
        meta.insert("feedback".to_string(), json!(feedback.flatten()));
        meta.insert("request".to_string(), Value::Object(request));
        meta.insert("credentials".to_string(), Value::Object(credentials));
        meta.insert("time_epoch".to_string(), json!(now.timestamp()));
        meta.insert(
            "time_local".to_string(),
            json!(now.with_timezone(&Local).to_rfc2822()),
        );
        if let Some(version) = self.version.filter(|v| !v.is_empty()) {
            meta.insert("version".to_string(), json!(version));
        }
        Value::Object(meta)
    }
}

/// Echo submitted data, adding the new primary key to a single record.
fn echo_postdata(mut post: Value, model: &str, new_id: Option<Value>) -> Value {
    if let Some(id) = new_id
        && let Some(record) = post.get_mut(model).and_then(Value::as_object_mut)
        && record.get(PRIMARY_KEY).is_none_or(is_empty_payload)
    {
        record.insert(PRIMARY_KEY.to_string(), id);
    }
    post
}
