//! Fuzz target for the text-facing parts of the mediation layer.
//!
//! Arbitrary bytes are fed to:
//!
//! - `credentials::parse`: the `Authorization` header grammar
//! - `json::pretty_print`: the textual pretty printer, which must either
//!   return valid JSON or its input unchanged
//! - `XmlEncoder`, `postdata::parse_body` and `validate_widget` on whatever
//!   JSON the bytes happen to decode to
//!
//! # Running
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_encoding -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use rest_mediator::credentials::{AuthSettings, parse};
use rest_mediator::encoding::json::{encode, is_valid_callback, pretty_print};
use rest_mediator::encoding::xml::XmlEncoder;
use rest_mediator::pipeline::postdata::{modelize, parse_body};
use rest_mediator::validation::validate_widget;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let settings = AuthSettings::default();

    let _ = parse(&text, &settings);
    let _ = is_valid_callback(&text);

    let pretty = pretty_print(&text);
    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        assert!(serde_json::from_str::<serde_json::Value>(&pretty).is_ok());
    }

    if let Ok(Some(body)) = parse_body(data, None) {
        let compact = encode(&body);
        assert!(serde_json::from_str::<serde_json::Value>(&compact).is_ok());

        let _ = XmlEncoder::for_resource("widgets", true).encode_str(&body);
        let _ = validate_widget(&body, true);
        let _ = modelize(body, "Widget");
    }
});
