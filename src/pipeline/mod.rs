//! The per-request mediation pipeline.
//!
//! A [`RestMediator`] is shared application-wide and opens one
//! [`RestPipeline`] per request. The pipeline walks a fixed lifecycle:
//!
//! ```text
//! begin ─► startup ─► handler ─► finish
//!          │  credentials, setup log fields, post data, secure transport
//!          │  rate limit, dry run
//!          └──────────── abort ────────────┘
//! ```
//!
//! Any step may abort. Aborting builds and encodes the envelope, records
//! `httpcode`/`error` in the request log, flushes it once, and stores the
//! response. Later aborts and renders are no-ops. [`RestPipeline::finish`]
//! consumes the pipeline and hands the single stored response to the
//! transport, after which nothing else can run for the request.
//!
//! Handlers propagate [`Aborted`] with `?`:
//!
//! ```rust,ignore
//! let mut rest = state.mediator.begin(ctx, "widgets", "view", hooks)?;
//! let outcome = match rest.startup() {
//!     Ok(()) => load_widget(&mut rest, id).await,
//!     Err(aborted) => Err(aborted),
//! };
//! Ok(rest.finish(outcome))
//! ```

pub mod abort;
pub mod hooks;
pub mod postdata;

pub use abort::{AbortReason, Aborted, Outcome, RestResponse, reason_phrase};
pub use hooks::{AuthMessage, NoHooks, RestHooks};

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::credentials::{CredentialExtractor, LOGGED_FIELDS};
use crate::encoding::json::is_valid_callback;
use crate::encoding::{Extension, encoder_for, inflect};
use crate::envelope::{EnvelopeBuilder, EnvelopeInput, is_empty_payload};
use crate::error::{AppError, AppResult};
use crate::feedback::Feedback;
use crate::metrics;
use crate::ratelimit::{RateCheck, RateLimitError, RateLimiter};
use crate::restlog::{LogAccumulator, LogStore, format_log_time};
use postdata::{PostDataError, is_truthy, modelize, parse_body, take_meta};

pub const INVALID_POST_DATA: &str = "Invalid post data";
pub const SECURE_REQUIRED: &str = "A secure connection is required";
pub const XSS_REJECTION: &str = "Prevented request. Your callback is vulnerable to XSS attacks. ";
pub const DRYRUN_WARNING: &str = "Dryrun active, not really executing your command";
pub const REDIRECT_PREVENTED: &str = "Redirect prevented by rest component. ";
pub const UNIDENTIFIED_CALLER: &str = "Unable to establish class or IP, not ratelimiting";

/// Application-wide entry point that opens pipelines.
#[derive(Clone)]
pub struct RestMediator {
    config: Arc<Config>,
    store: Option<Arc<dyn LogStore>>,
}

impl RestMediator {
    /// `store` is `None` when request logging is not configured.
    pub fn new(config: Arc<Config>, store: Option<Arc<dyn LogStore>>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<dyn LogStore>> {
        self.store.as_ref()
    }

    /// Whether mediation applies to a request.
    ///
    /// With `only_active_with_auth` the `Authorization` header must start
    /// with the keyword. Otherwise the path extension must be enabled.
    pub fn is_active(&self, ctx: &RequestContext) -> bool {
        if self.config.only_active_with_auth {
            return ctx
                .authorization()
                .is_some_and(|header| header.starts_with(&self.config.auth.keyword));
        }
        ctx.extension()
            .is_some_and(|ext| self.config.extensions.contains(&ext))
    }

    /// Open a pipeline for `resource`/`action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when mediation is not active for the
    /// request.
    pub fn begin(
        &self,
        ctx: RequestContext,
        resource: &str,
        action: &str,
        hooks: Arc<dyn RestHooks>,
    ) -> AppResult<RestPipeline> {
        if !self.is_active(&ctx) {
            debug!(path = %ctx.path(), "Mediation inactive for request");
            return Err(AppError::NotFound(format!(
                "No REST resource at '{}'",
                ctx.path()
            )));
        }

        let extension = ctx
            .extension()
            .filter(|ext| self.config.extensions.contains(ext))
            .unwrap_or(Extension::Json);
        let credentials = CredentialExtractor::new(self.config.auth.clone(), ctx.authorization());

        Ok(RestPipeline {
            config: Arc::clone(&self.config),
            auth_message: ctx.auth_message.clone(),
            hooks,
            resource: resource.to_string(),
            model: inflect::classify(resource),
            action: action.to_string(),
            model_id: None,
            extension,
            credentials,
            feedback: Feedback::new(),
            log: LogAccumulator::new(self.store.clone()),
            postdata: None,
            request_meta: None,
            new_id: None,
            validation_errors: Vec::new(),
            lifecycle: Lifecycle::Running,
            started: Instant::now(),
            ctx,
        })
    }
}

enum Lifecycle {
    Running,
    Responded(RestResponse),
}

/// State of one mediated request.
pub struct RestPipeline {
    config: Arc<Config>,
    auth_message: Option<String>,
    hooks: Arc<dyn RestHooks>,
    ctx: RequestContext,
    resource: String,
    model: String,
    action: String,
    model_id: Option<String>,
    extension: Extension,
    credentials: CredentialExtractor,
    feedback: Feedback,
    log: LogAccumulator,
    postdata: Option<Value>,
    request_meta: Option<Value>,
    new_id: Option<Value>,
    validation_errors: Vec<String>,
    lifecycle: Lifecycle,
    started: Instant,
}

impl RestPipeline {
    /// Record the addressed record id in the request log.
    pub fn with_model_id(mut self, id: impl ToString) -> Self {
        self.model_id = Some(id.to_string());
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run every check that precedes the handler.
    pub fn startup(&mut self) -> Outcome<()> {
        self.initialize()?;
        self.enforce_rate_limit()?;
        self.check_dryrun()
    }

    fn initialize(&mut self) -> Outcome<()> {
        self.credentials.extract(&mut self.log);
        self.log_ident_field();

        self.log.set("controller", self.resource.clone());
        self.log.set("action", self.action.clone());
        self.log.set("model_id", self.model_id.clone());
        self.log.set("ratelimited", 0);
        self.log.set("requested", format_log_time(self.ctx.received_at));
        self.log.set("ip", self.ctx.ip.clone());
        self.log.set("httpcode", StatusCode::OK.as_u16());
        self.log.set("request_id", self.ctx.request_id.clone());

        let parsed = parse_body(&self.ctx.body, self.ctx.content_type());
        let body = match parsed {
            Ok(body) => body,
            Err(e) => return Err(self.reject_post(e)),
        };
        if let Some(mut body) = body {
            self.request_meta = take_meta(&mut body);
            if !is_empty_payload(&body) {
                match modelize(body, &self.model) {
                    Ok(data) => self.postdata = Some(data),
                    Err(e) => return Err(self.reject_post(e)),
                }
            }
        }

        if self.config.require_secure && !self.ctx.secure {
            return Err(self.abort(SECURE_REQUIRED, Value::Null));
        }
        Ok(())
    }

    /// The limiter counts log records on the ident field, so it must be
    /// logged even when it is not one of the standard credential fields.
    fn log_ident_field(&mut self) {
        let ident = &self.config.rate_limit.ident_field;
        if ident.is_empty() || LOGGED_FIELDS.contains(&ident.as_str()) {
            return;
        }
        if self.credentials.all().is_some() {
            let value = self.credentials.field(ident).map(str::to_string);
            self.log.set(ident.clone(), value);
        }
    }

    fn reject_post(&mut self, error: PostDataError) -> Aborted {
        self.feedback.error(&error);
        self.abort(INVALID_POST_DATA, Value::Null)
    }

    fn enforce_rate_limit(&mut self) -> Outcome<()> {
        if !self.config.rate_limit.enabled {
            return Ok(());
        }

        let config = Arc::clone(&self.config);
        let store = self.log.store().cloned();
        let check = RateLimiter::new(&config.rate_limit).check(
            store.as_deref(),
            &self.credentials,
            self.ctx.ip.as_deref(),
            self.hooks.as_ref(),
            Utc::now(),
        );

        match check {
            Ok(RateCheck::Allowed { .. }) => Ok(()),
            Ok(RateCheck::Unidentified) => {
                self.feedback.warning(UNIDENTIFIED_CALLER);
                Ok(())
            }
            Ok(RateCheck::Exceeded(exceeded)) => {
                self.log.set("ratelimited", 1);
                metrics::record_ratelimited(exceeded.scope.kind());
                warn!(
                    scope = exceeded.scope.kind(),
                    count = exceeded.count,
                    max = exceeded.max,
                    window = %exceeded.window,
                    "Rate limit exceeded"
                );
                Err(self.abort(exceeded.to_string(), Value::Null))
            }
            Err(RateLimitError::Store(e)) => Err(self.abort(
                AbortReason::status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Unable to count prior requests: {e}"),
                ),
                Value::Null,
            )),
            Err(e) => Err(self.abort(e.to_string(), Value::Null)),
        }
    }

    fn check_dryrun(&mut self) -> Outcome<()> {
        let dryrun = self
            .request_meta
            .as_ref()
            .and_then(|meta| meta.get("dryrun"))
            .is_some_and(is_truthy);
        if dryrun {
            self.feedback.warning(DRYRUN_WARNING);
            return Err(self.abort(AbortReason::quiet(), Value::Null));
        }
        Ok(())
    }

    /// Cut the request short. Idempotent: once a response exists, further
    /// calls return the same status and do nothing else.
    pub fn abort(&mut self, reason: impl Into<AbortReason>, data: Value) -> Aborted {
        if let Some(status) = self.responded_status() {
            debug!(status = status.as_u16(), "Already responded, ignoring abort");
            return Aborted { status };
        }

        let (status, error) = match reason.into() {
            AbortReason::Message(message) => (
                StatusCode::FORBIDDEN,
                Some(message).filter(|m| !m.is_empty()),
            ),
            AbortReason::Structured {
                status,
                error,
                redirect,
            } => {
                let mut code = StatusCode::OK;
                let mut message = None;

                if let Some(auth_message) = self.auth_message.take() {
                    code = StatusCode::FORBIDDEN;
                    message = Some(auth_message);
                }
                if let Some(error) = error.filter(|e| !e.is_empty()) {
                    if status.is_none() && code == StatusCode::OK {
                        code = StatusCode::FORBIDDEN;
                    }
                    message = Some(error);
                }
                if let Some(status) = status {
                    code = status;
                }
                if redirect.is_some() && message.is_none() {
                    self.feedback.debug(REDIRECT_PREVENTED);
                }
                (code, message)
            }
        };

        if let Some(error) = &error {
            self.feedback.error(error);
        }
        let reason = match &error {
            Some(error) => Some(error.clone()),
            None => reason_phrase(status).map(str::to_string),
        };

        warn!(
            resource = %self.resource,
            action = %self.action,
            status = status.as_u16(),
            error = error.as_deref().unwrap_or(""),
            "Request aborted"
        );
        metrics::record_abort(status.as_u16());

        let response = self.build_response(data, status, reason);
        self.log.set("httpcode", status.as_u16());
        self.log.set("error", error);
        self.close(response)
    }

    /// Handle a redirect issued by handler code.
    ///
    /// With `catch_redirects` the redirect becomes a structured abort and the
    /// client receives an envelope. Otherwise a bare redirect is sent.
    pub fn redirect(&mut self, url: impl Into<String>, status: Option<StatusCode>) -> Aborted {
        if self.config.catch_redirects {
            return self.abort(AbortReason::redirect(url, status), Value::Null);
        }
        if let Some(status) = self.responded_status() {
            return Aborted { status };
        }

        let status = status.unwrap_or(StatusCode::FOUND);
        let response = RestResponse {
            status,
            reason: None,
            content_type: None,
            location: Some(url.into()),
            body: Vec::new(),
        };
        self.log.set("httpcode", status.as_u16());
        self.close(response)
    }

    /// Encode a handler's payload as the success response.
    pub fn render(&mut self, payload: Value) -> Outcome<()> {
        if let Some(status) = self.responded_status() {
            return Err(Aborted { status });
        }

        if let Some(callback) = self.ctx.callback()
            && !is_valid_callback(callback)
        {
            return Err(self.abort(XSS_REJECTION, Value::Null));
        }

        let response = self.build_response(payload, StatusCode::OK, None);
        info!(
            resource = %self.resource,
            action = %self.action,
            status = response.status.as_u16(),
            "Request mediated"
        );
        let _ = self.close(response);
        Ok(())
    }

    /// Render the handler outcome, if it has not been rendered, and take the
    /// response.
    pub fn finish(mut self, outcome: Outcome<Value>) -> RestResponse {
        if let Ok(payload) = outcome
            && let Err(aborted) = self.render(payload)
        {
            debug!(status = aborted.status.as_u16(), "Render ended in abort");
        }
        self.respond()
    }

    fn respond(mut self) -> RestResponse {
        if matches!(self.lifecycle, Lifecycle::Running) {
            warn!("Handler ended without a response, rendering an empty envelope");
            let _ = self.render(Value::Null);
        }

        let response = match self.lifecycle {
            Lifecycle::Responded(response) => response,
            Lifecycle::Running => RestResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                reason: None,
                content_type: None,
                location: None,
                body: Vec::new(),
            },
        };
        metrics::record_request(&self.resource, &self.action, response.status.as_u16());
        response
    }

    fn build_response(
        &mut self,
        payload: Value,
        status: StatusCode,
        reason: Option<String>,
    ) -> RestResponse {
        let validation_errors = std::mem::take(&mut self.validation_errors);
        let callback = self
            .ctx
            .callback()
            .filter(|cb| is_valid_callback(cb))
            .map(str::to_string);

        let builder = EnvelopeBuilder {
            meta: &self.config.meta,
            version: self.config.version.as_deref(),
            credentials: &self.credentials,
            environment: &self.ctx.environment,
        };
        let input = EnvelopeInput {
            payload,
            postdata: self.postdata.as_ref(),
            model: &self.model,
            new_id: self.new_id.clone(),
            validation_errors,
        };
        let envelope = builder.build(input, &mut self.feedback, &mut self.log, Utc::now());

        let encoder = encoder_for(self.extension, &self.resource, self.config.pretty, callback);
        RestResponse {
            status,
            reason,
            content_type: self
                .config
                .content_headers_enabled()
                .then(|| encoder.content_type()),
            location: None,
            body: encoder.encode(&envelope),
        }
    }

    /// Record the response time, flush the log and store the response.
    fn close(&mut self, response: RestResponse) -> Aborted {
        let status = response.status;
        self.log.set("responded", format_log_time(Utc::now()));
        self.log.flush(self.hooks.as_ref());

        if let Some(count) = self.log.store().and_then(|store| store.record_count()) {
            metrics::set_log_records(count);
        }
        metrics::record_duration(
            &self.resource,
            &self.action,
            self.started.elapsed().as_secs_f64(),
        );

        self.lifecycle = Lifecycle::Responded(response);
        Aborted { status }
    }

    fn responded_status(&self) -> Option<StatusCode> {
        match &self.lifecycle {
            Lifecycle::Responded(response) => Some(response.status),
            Lifecycle::Running => None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_responded(&self) -> bool {
        self.responded_status().is_some()
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Model name derived from the resource (`widgets` → `Widget`).
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn extension(&self) -> Extension {
        self.extension
    }

    pub fn credentials(&self) -> &CredentialExtractor {
        &self.credentials
    }

    /// One credential field, directly or through the alias table.
    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.field(name)
    }

    pub fn feedback(&mut self) -> &mut Feedback {
        &mut self.feedback
    }

    pub fn log(&mut self) -> &mut LogAccumulator {
        &mut self.log
    }

    /// Modelized body, `{Model: data}`.
    pub fn postdata(&self) -> Option<&Value> {
        self.postdata.as_ref()
    }

    /// The submitted record(s) without the model wrapper.
    pub fn model_data(&self) -> Option<&Value> {
        self.postdata.as_ref().and_then(|p| p.get(&self.model))
    }

    /// The `meta` block of the submitted body.
    pub fn request_meta(&self) -> Option<&Value> {
        self.request_meta.as_ref()
    }

    /// Leave an authorization message for the next structured abort of this
    /// request, typically a caught redirect to a login page.
    pub fn leave_auth_message(&mut self, message: impl Into<String>) {
        self.auth_message = Some(message.into());
    }

    /// Identifier assigned by a create, echoed into the response data.
    pub fn set_new_id(&mut self, id: impl Into<Value>) {
        self.new_id = Some(id.into());
    }

    /// Business-rule failures, reported at `validate` level in the envelope.
    pub fn add_validation_errors<I, S>(&mut self, errors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_errors
            .extend(errors.into_iter().map(Into::into));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::ip::TrustedProxyConfig;
    use crate::ratelimit::RatePolicy;
    use crate::restlog::MemoryLogStore;
    use axum::body::Bytes;
    use axum::http::Request;
    use serde_json::json;

    fn context(uri: &str, auth: Option<&str>, body: &str) -> RequestContext {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        RequestContext::capture(
            &parts,
            Bytes::from(body.to_string()),
            Some("10.0.0.9:4000".parse().unwrap()),
            &TrustedProxyConfig::default(),
        )
    }

    fn mediator(config: Config) -> (RestMediator, Arc<MemoryLogStore>) {
        let store = Arc::new(MemoryLogStore::new());
        let mediator = RestMediator::new(
            Arc::new(config),
            Some(store.clone() as Arc<dyn LogStore>),
        );
        (mediator, store)
    }

    fn open(mediator: &RestMediator, uri: &str, body: &str) -> RestPipeline {
        mediator
            .begin(context(uri, None, body), "widgets", "add", Arc::new(NoHooks))
            .unwrap()
    }

    fn body_json(response: &RestResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_inactive_without_extension() {
        let (mediator, _) = mediator(Config::default());
        let result = mediator.begin(
            context("/widgets", None, ""),
            "widgets",
            "index",
            Arc::new(NoHooks),
        );
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_only_active_with_auth() {
        let config = Config {
            only_active_with_auth: true,
            ..Config::default()
        };
        let (mediator, _) = mediator(config);

        assert!(!mediator.is_active(&context("/widgets.json", None, "")));
        assert!(mediator.is_active(&context("/widgets", Some("TRUEREST apikey=a"), "")));
        assert!(!mediator.is_active(&context("/widgets.json", Some("Bearer x"), "")));
    }

    #[test]
    fn test_abort_twice_responds_and_flushes_once() {
        let (mediator, store) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();

        let first = rest.abort("nope", Value::Null);
        let second = rest.abort(AbortReason::status(StatusCode::NOT_FOUND, "gone"), Value::Null);
        assert_eq!(first.status, StatusCode::FORBIDDEN);
        assert_eq!(second.status, StatusCode::FORBIDDEN);

        let response = rest.finish(Err(second));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.reason.as_deref(), Some("nope"));
        assert_eq!(store.len(), 1);

        let record = &store.records()[0];
        assert_eq!(record.get("httpcode"), Some(&json!(403)));
        assert_eq!(record.get("error"), Some(&json!("nope")));
    }

    #[test]
    fn test_quiet_abort_is_200_with_table_phrase() {
        let (mediator, _) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();

        let aborted = rest.abort(AbortReason::quiet(), json!({"partial": true}));
        let response = rest.finish(Err(aborted));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.reason.as_deref(), Some("OK"));
        assert_eq!(body_json(&response)["data"], json!({"partial": true}));
        assert_eq!(body_json(&response)["meta"]["status"], "ok");
    }

    #[test]
    fn test_auth_message_turns_abort_into_403() {
        let (mediator, _) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();
        rest.leave_auth_message("You are not authorized to access that location.");

        let aborted = rest.abort(AbortReason::quiet(), Value::Null);
        assert_eq!(aborted.status, StatusCode::FORBIDDEN);

        let response = rest.finish(Err(aborted));
        let envelope = body_json(&response);
        assert_eq!(envelope["meta"]["status"], "error");
        assert_eq!(
            envelope["meta"]["feedback"][0]["message"],
            "You are not authorized to access that location."
        );
    }

    #[test]
    fn test_auth_message_stays_with_its_request() {
        let config = Config {
            rate_limit: RatePolicy {
                enabled: false,
                ..RatePolicy::default()
            },
            ..Config::default()
        };
        let (mediator, _) = mediator(config);

        let mut turned_away = open(&mediator, "/widgets.json", "");
        turned_away.leave_auth_message("You are not authorized to access that location.");

        let mut other = open(&mediator, "/widgets.json", r#"{"meta": {"dryrun": 1}}"#);
        let aborted = other.startup().unwrap_err();
        assert_eq!(aborted.status, StatusCode::OK);

        let response = other.finish(Err(aborted));
        let envelope = body_json(&response);
        assert_eq!(envelope["meta"]["status"], "ok");
        assert_eq!(envelope["meta"]["feedback"][0]["message"], DRYRUN_WARNING);
    }

    #[test]
    fn test_empty_message_is_not_an_error() {
        let (mediator, store) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();

        let aborted = rest.abort("", Value::Null);
        let response = rest.finish(Err(aborted));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.reason.as_deref(), Some("Forbidden"));

        let envelope = body_json(&response);
        assert_eq!(envelope["meta"]["status"], "ok");
        assert_eq!(envelope["meta"]["feedback"], json!([]));
        assert_eq!(store.records()[0].get("error"), Some(&Value::Null));
    }

    #[test]
    fn test_caught_redirect_records_debug_note() {
        let config = Config {
            catch_redirects: true,
            ..Config::default()
        };
        let (mediator, _) = mediator(config);
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();

        let aborted = rest.redirect("/login", None);
        let response = rest.finish(Err(aborted));
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.location.is_none());
        let feedback = &body_json(&response)["meta"]["feedback"];
        assert_eq!(feedback[0]["message"], REDIRECT_PREVENTED);
        assert_eq!(feedback[0]["level"], "debug");
    }

    #[test]
    fn test_uncaught_redirect_sends_location() {
        let (mediator, store) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", "");
        rest.startup().unwrap();

        let aborted = rest.redirect("/widgets/1.json", Some(StatusCode::SEE_OTHER));
        let response = rest.finish(Err(aborted));
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location.as_deref(), Some("/widgets/1.json"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_post_data_aborts() {
        let (mediator, _) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", r#"{"1":{"a":{"b":1}}}"#);

        let aborted = rest.startup().unwrap_err();
        assert_eq!(aborted.status, StatusCode::FORBIDDEN);

        let response = rest.finish(Err(aborted));
        let messages: Vec<String> = body_json(&response)["meta"]["feedback"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            messages,
            ["You may only send 1 dimensional posts", INVALID_POST_DATA]
        );
    }

    #[test]
    fn test_dryrun_aborts_quietly() {
        let (mediator, store) = mediator(Config::default());
        let mut rest = open(
            &mediator,
            "/widgets.json",
            r#"{"name":"bolt","meta":{"dryrun":1}}"#,
        );

        let aborted = rest.startup().unwrap_err();
        assert_eq!(aborted.status, StatusCode::OK);

        let response = rest.finish(Err(aborted));
        let body = body_json(&response);
        assert_eq!(body["data"], json!({"Widget": {"name": "bolt"}}));
        assert_eq!(body["meta"]["feedback"][0]["message"], DRYRUN_WARNING);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_require_secure() {
        let config = Config {
            require_secure: true,
            ..Config::default()
        };
        let (mediator, _) = mediator(config);
        let mut rest = open(&mediator, "/widgets.json", "");
        assert_eq!(rest.startup().unwrap_err().status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_rate_limit_requires_logging() {
        let mediator = RestMediator::new(Arc::new(Config::default()), None);
        let mut rest = mediator
            .begin(context("/widgets.json", None, ""), "widgets", "index", Arc::new(NoHooks))
            .unwrap();

        let aborted = rest.startup().unwrap_err();
        let response = rest.finish(Err(aborted));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(
            response.reason.as_deref(),
            Some("Logging is required for any ratelimiting to work")
        );
    }

    #[test]
    fn test_jsonp_wraps_and_rejects() {
        let (mediator, _) = mediator(Config::default());

        let mut rest = open(&mediator, "/widgets.json?callback=cb_1", "");
        rest.startup().unwrap();
        let response = rest.finish(Ok(json!({"n": 1})));
        let body = response.body_str();
        assert!(body.starts_with("cb_1({"));
        assert!(body.ends_with(");"));

        let mut rest = open(&mediator, "/widgets.json?callback=alert(1)", "");
        rest.startup().unwrap();
        let response = rest.finish(Ok(json!({"secret": 1})));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert!(!response.body_str().contains("secret"));
        assert!(response.body_str().contains("vulnerable to XSS"));
    }

    #[test]
    fn test_content_headers_suppressed_at_high_debug() {
        let config = Config {
            debug: 3,
            ..Config::default()
        };
        let (mediator, _) = mediator(config);
        let mut rest = open(&mediator, "/widgets.xml", "");
        rest.startup().unwrap();
        let response = rest.finish(Ok(json!({})));
        assert!(response.content_type.is_none());
        assert!(response.body_str().contains("<widgets_response>"));
    }

    #[test]
    fn test_new_id_echo_and_validation_errors() {
        let (mediator, store) = mediator(Config::default());
        let mut rest = open(&mediator, "/widgets.json", r#"{"name":"bolt"}"#);
        rest.startup().unwrap();

        rest.set_new_id(7);
        rest.add_validation_errors(["size must be positive"]);
        let response = rest.finish(Ok(Value::Null));

        let body = body_json(&response);
        assert_eq!(body["data"], json!({"Widget": {"name": "bolt", "id": 7}}));
        assert_eq!(body["meta"]["status"], "error");
        assert_eq!(body["meta"]["feedback"][0]["level"], "validate");

        let record = &store.records()[0];
        assert_eq!(record.get("data_in"), Some(&json!({"Widget": {"name": "bolt"}})));
        assert_eq!(record.get("controller"), Some(&json!("widgets")));
        assert_eq!(record.get("ip"), Some(&json!("10.0.0.9")));
        assert!(record.get("responded").is_some());
    }
}
