//! Lifecycle tests for the mediation pipeline against an in-memory log store.
//!
//! These drive `RestMediator` directly, without a router, so every request
//! detail (client IP, headers, body) is under the test's control.
//!
//! Run with: `cargo test --test pipeline_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use rest_mediator::Config;
use rest_mediator::context::RequestContext;
use rest_mediator::middleware::TrustedProxyConfig;
use rest_mediator::pipeline::{
    AbortReason, NoHooks, Outcome, RestHooks, RestMediator, RestPipeline,
    RestResponse,
};
use rest_mediator::ratelimit::{RateScope, RateWindow};
use rest_mediator::restlog::{LogRecord, LogStore, MemoryLogStore, format_log_time};

struct Harness {
    mediator: RestMediator,
    store: Arc<MemoryLogStore>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let store = Arc::new(MemoryLogStore::new());
        let mediator = RestMediator::new(
            Arc::new(config),
            Some(store.clone() as Arc<dyn LogStore>),
        );
        Self { mediator, store }
    }

    /// Seed `count` records for an API key, spread over the last half hour.
    fn seed(&self, apikey: &str, count: usize) {
        let now = Utc::now();
        for i in 0..count {
            let mut record = LogRecord::new();
            record.insert("apikey", apikey);
            record.insert("ip", "10.1.1.1");
            let offset = Duration::seconds((i % 1800) as i64 + 1);
            record.insert("requested", format_log_time(now - offset));
            self.store.save(record).unwrap();
        }
    }

    fn run(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: &str,
        hooks: Arc<dyn RestHooks>,
        handler: impl FnOnce(&mut RestPipeline) -> Outcome<Value>,
    ) -> RestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        let ctx = RequestContext::capture(
            &parts,
            Bytes::from(body.to_string()),
            Some("10.1.1.1:40000".parse().unwrap()),
            &TrustedProxyConfig::default(),
        );

        let mut rest = self
            .mediator
            .begin(ctx, "widgets", "index", hooks)
            .unwrap();
        let outcome = match rest.startup() {
            Ok(()) => handler(&mut rest),
            Err(aborted) => Err(aborted),
        };
        rest.finish(outcome)
    }
}

fn body(response: &RestResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

fn ok_payload(_: &mut RestPipeline) -> Outcome<Value> {
    Ok(json!([{"Widget": {"id": 1}}]))
}

#[test]
fn test_success_envelope_shape() {
    let harness = Harness::new(Config::default());
    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=k1&username=ann"),
        "",
        Arc::new(NoHooks),
        ok_payload,
    );

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, Some("application/json"));

    let envelope = body(&response);
    assert_eq!(envelope["data"], json!([{"Widget": {"id": 1}}]));
    assert_eq!(envelope["meta"]["status"], "ok");
    assert_eq!(envelope["meta"]["feedback"], json!([]));
    assert_eq!(envelope["meta"]["version"], "0.3");
    assert_eq!(envelope["meta"]["credentials"]["apikey"], "k1");
    assert_eq!(envelope["meta"]["request"]["remote_addr"], "10.1.1.1");
    assert!(envelope["meta"]["time_epoch"].is_i64());

    let records = harness.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("apikey"), Some(&json!("k1")));
    assert_eq!(records[0].get("httpcode"), Some(&json!(200)));
    assert_eq!(records[0].get("ratelimited"), Some(&json!(0)));
}

#[test]
fn test_rate_limit_allows_up_to_max() {
    let harness = Harness::new(Config::default());
    harness.seed("busy", 99);

    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=busy"),
        "",
        Arc::new(NoHooks),
        ok_payload,
    );
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(harness.store.len(), 100);
}

#[test]
fn test_rate_limit_exceeded_aborts_with_403() {
    let harness = Harness::new(Config::default());
    harness.seed("busy", 100);

    let mut handler_ran = false;
    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=busy"),
        "",
        Arc::new(NoHooks),
        |_| {
            handler_ran = true;
            Ok(Value::Null)
        },
    );

    assert!(!handler_ran);
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let envelope = body(&response);
    assert_eq!(envelope["meta"]["status"], "error");
    let message = envelope["meta"]["feedback"][0]["message"].as_str().unwrap();
    assert!(message.contains("101 is more than the allowed 100 requests in 1 hour"));

    let last = harness.store.records().pop().unwrap();
    assert_eq!(last.get("ratelimited"), Some(&json!(1)));
    assert_eq!(last.get("httpcode"), Some(&json!(403)));
}

#[test]
fn test_custom_ident_field_is_logged_and_counted() {
    let mut config = Config::default();
    config.rate_limit.ident_field = "token".to_string();
    config
        .rate_limit
        .classes
        .insert("Customer".to_string(), RateWindow::new("-1 hour", 2).unwrap());
    let harness = Harness::new(config);

    let statuses: Vec<StatusCode> = (0..4)
        .map(|_| {
            harness
                .run(
                    "GET",
                    "/widgets.json",
                    Some("TRUEREST token=t1"),
                    "",
                    Arc::new(NoHooks),
                    ok_payload,
                )
                .status
        })
        .collect();
    assert_eq!(
        statuses,
        [
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::FORBIDDEN,
            StatusCode::FORBIDDEN
        ]
    );

    let records = harness.store.records();
    assert_eq!(records[0].get("token"), Some(&json!("t1")));
    assert_eq!(records[2].get("ratelimited"), Some(&json!(1)));
}

#[test]
fn test_employee_class_has_larger_window() {
    let harness = Harness::new(Config::default());
    harness.seed("staff", 150);

    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=staff&class=Employee"),
        "",
        Arc::new(NoHooks),
        ok_payload,
    );
    assert_eq!(response.status, StatusCode::OK);
}

#[test]
fn test_old_records_fall_outside_window() {
    let harness = Harness::new(Config::default());
    for _ in 0..120 {
        let mut record = LogRecord::new();
        record.insert("apikey", "old");
        record.insert("requested", format_log_time(Utc::now() - Duration::hours(2)));
        harness.store.save(record).unwrap();
    }

    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=old"),
        "",
        Arc::new(NoHooks),
        ok_payload,
    );
    assert_eq!(response.status, StatusCode::OK);
}

struct Generous;

impl RestHooks for Generous {
    fn ratelimit_max(&self, _scope: &RateScope, window: &RateWindow) -> Option<u64> {
        Some(window.max() * 10)
    }
}

#[test]
fn test_hook_overrides_max() {
    let harness = Harness::new(Config::default());
    harness.seed("busy", 100);

    let response = harness.run(
        "GET",
        "/widgets.json",
        Some("TRUEREST apikey=busy"),
        "",
        Arc::new(Generous),
        ok_payload,
    );
    assert_eq!(response.status, StatusCode::OK);
}

struct Redacting;

impl RestHooks for Redacting {
    fn filter(&self, mut record: LogRecord) -> Option<LogRecord> {
        record.remove("data_out");
        Some(record)
    }
}

#[test]
fn test_filter_hook_shapes_saved_record() {
    let harness = Harness::new(Config::default());
    harness.run(
        "GET",
        "/widgets.json",
        None,
        "",
        Arc::new(Redacting),
        ok_payload,
    );

    let record = harness.store.records().pop().unwrap();
    assert!(record.get("data_out").is_none());
    assert!(record.get("meta").is_some());
}

#[test]
fn test_handler_abort_with_explicit_status() {
    let harness = Harness::new(Config::default());
    let response = harness.run(
        "GET",
        "/widgets.json",
        None,
        "",
        Arc::new(NoHooks),
        |rest| {
            let reason = AbortReason::status(StatusCode::NOT_FOUND, "Widget 9 not found");
            Err(rest.abort(reason, Value::Null))
        },
    );

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.reason.as_deref(), Some("Widget 9 not found"));
    assert_eq!(body(&response)["meta"]["feedback"][0]["level"], "error");
}

#[test]
fn test_validation_errors_keep_http_200() {
    let harness = Harness::new(Config::default());
    let response = harness.run(
        "POST",
        "/widgets.json",
        None,
        r#"{"size": "big"}"#,
        Arc::new(NoHooks),
        |rest| {
            rest.add_validation_errors(["name is required", "size must be a whole number"]);
            Ok(Value::Null)
        },
    );

    assert_eq!(response.status, StatusCode::OK);
    let envelope = body(&response);
    assert_eq!(envelope["meta"]["status"], "error");
    assert_eq!(
        envelope["meta"]["feedback"][0]["message"],
        "name is required; size must be a whole number"
    );
}

#[test]
fn test_jsonp_callback_names() {
    let harness = Harness::new(Config::default());

    let response = harness.run(
        "GET",
        "/widgets.json?jsoncallback=render_widgets",
        None,
        "",
        Arc::new(NoHooks),
        ok_payload,
    );
    let text = response.body_str();
    assert!(text.starts_with("render_widgets("));
    assert!(text.ends_with(");"));

    let response = harness.run(
        "GET",
        "/widgets.json?callback=x%3Dalert",
        None,
        "",
        Arc::new(NoHooks),
        ok_payload,
    );
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body_str().starts_with('{'));
}

#[test]
fn test_xml_rendering() {
    let harness = Harness::new(Config::default());
    let response = harness.run(
        "GET",
        "/widgets.xml",
        None,
        "",
        Arc::new(NoHooks),
        ok_payload,
    );

    assert_eq!(response.content_type, Some("application/xml"));
    let text = response.body_str();
    assert!(text.contains("<widgets_response>"));
    assert!(text.contains("<status>ok</status>"));
}

#[test]
fn test_logging_disabled_with_rate_limit_off() {
    let config = Config {
        log_enabled: false,
        rate_limit: rest_mediator::ratelimit::RatePolicy {
            enabled: false,
            ..Default::default()
        },
        ..Config::default()
    };
    let mediator = RestMediator::new(Arc::new(config), None);
    let (parts, ()) = Request::builder()
        .uri("/widgets.json")
        .body(())
        .unwrap()
        .into_parts();
    let ctx = RequestContext::capture(&parts, Bytes::new(), None, &TrustedProxyConfig::default());

    let mut rest = mediator.begin(ctx, "widgets", "index", Arc::new(NoHooks)).unwrap();
    rest.startup().unwrap();
    let response = rest.finish(Ok(json!({"ok": true})));
    assert_eq!(response.status, StatusCode::OK);
}
