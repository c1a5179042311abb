//! JSON encoding with optional pretty printing and JSONP wrapping.
//!
//! The writer is deliberately small and deterministic:
//!
//! - Strings escape `\\`, `/`, `"`, `\n`, `\t`, `\r`, `\b`, `\f` and emit any
//!   other control character as `\u00XX`. Non-ASCII text passes through.
//! - An object whose keys are exactly `"0"`, `"1"`, ... `"n-1"` in order is
//!   emitted as an array. Empty objects stay `{}`.
//! - Numbers use their shortest round-trip form, booleans are
//!   `true`/`false`, null is `null`.

use serde_json::{Map, Value};

use super::{ContentEncoder, Extension};

const INDENT: &str = "  ";

/// Encode a value as compact JSON.
pub fn encode(value: &Value) -> String {
    let mut out = String::with_capacity(128);
    write_value(&mut out, value);
    out
}

/// True when `map` is a non-empty sequence keyed `"0"` to `"n-1"` in order.
pub fn is_sequential(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .keys()
            .enumerate()
            .all(|(i, key)| *key == i.to_string())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => write_array(out, items.iter()),
        Value::Object(map) if is_sequential(map) => write_array(out, map.values()),
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_array<'a>(out: &mut String, items: impl Iterator<Item = &'a Value>) {
    out.push('[');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_value(out, item);
    }
    out.push(']');
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Re-indent compact JSON with two-space indentation.
///
/// String contents are copied verbatim, escapes included. If the result
/// does not parse as JSON the input is returned unchanged.
pub fn pretty_print(json: &str) -> String {
    let mut out = String::with_capacity(json.len() * 2);
    let mut level: usize = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = json.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '{' | '[' if matches!(chars.peek(), Some('}' | ']')) => {
                out.push(c);
                out.extend(chars.next());
            }
            '{' | '[' => {
                out.push(c);
                out.push('\n');
                level += 1;
                push_indent(&mut out, level);
            }
            '}' | ']' => {
                level = level.saturating_sub(1);
                out.push('\n');
                push_indent(&mut out, level);
                out.push(c);
            }
            ',' => {
                out.push_str(",\n");
                push_indent(&mut out, level);
            }
            ':' => out.push_str(": "),
            '"' => {
                in_string = true;
                out.push(c);
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }

    if serde_json::from_str::<serde::de::IgnoredAny>(&out).is_ok() {
        out
    } else {
        json.to_string()
    }
}

fn push_indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

/// JSON encoder, optionally pretty and optionally wrapped as JSONP.
#[derive(Debug, Clone, Default)]
pub struct JsonEncoder {
    pretty: bool,
    callback: Option<String>,
}

impl JsonEncoder {
    pub fn new(pretty: bool) -> Self {
        Self {
            pretty,
            callback: None,
        }
    }

    /// Wrap output as `callback(<json>);`. The name must already be validated
    /// with [`is_valid_callback`].
    pub fn with_callback(mut self, callback: Option<String>) -> Self {
        self.callback = callback;
        self
    }

    pub fn encode_str(&self, envelope: &Value) -> String {
        let mut body = encode(envelope);
        if self.pretty {
            body = pretty_print(&body);
        }
        match &self.callback {
            Some(callback) => format!("{callback}({body});"),
            None => body,
        }
    }
}

impl ContentEncoder for JsonEncoder {
    fn extension(&self) -> Extension {
        Extension::Json
    }

    fn encode(&self, envelope: &Value) -> Vec<u8> {
        self.encode_str(envelope).into_bytes()
    }
}

/// A JSONP callback may only contain word characters.
pub fn is_valid_callback(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(encode(&json!(null)), "null");
        assert_eq!(encode(&json!(true)), "true");
        assert_eq!(encode(&json!(false)), "false");
        assert_eq!(encode(&json!(42)), "42");
        assert_eq!(encode(&json!(-1.5)), "-1.5");
    }

    #[test]
    fn test_string_escapes() {
        let s = "a\"b\\c/d\ne\tf\rg\u{8}h\u{c}i\u{1}";
        assert_eq!(
            encode(&json!(s)),
            r#""a\"b\\c\/d\ne\tf\rg\bh\fi\u0001""#
        );
    }

    #[test]
    fn test_non_ascii_passes_through() {
        assert_eq!(encode(&json!("café")), "\"café\"");
    }

    #[test]
    fn test_sequential_object_becomes_array() {
        let value = json!({"0": "a", "1": "b"});
        assert_eq!(encode(&value), r#"["a","b"]"#);
    }

    #[test]
    fn test_non_sequential_object_stays_object() {
        assert_eq!(encode(&json!({"1": "a", "0": "b"})), r#"{"1":"a","0":"b"}"#);
        assert_eq!(encode(&json!({"00": "a"})), r#"{"00":"a"}"#);
        assert_eq!(encode(&json!({})), "{}");
    }

    #[test]
    fn test_nested() {
        let value = json!({"data": {"Widget": [{"id": 1}, {"id": 2}]}, "meta": null});
        assert_eq!(
            encode(&value),
            r#"{"data":{"Widget":[{"id":1},{"id":2}]},"meta":null}"#
        );
    }

    #[test]
    fn test_output_parses_back() {
        let value = json!({"s": "q\"uo/te\\", "n": [1, 2.5, null]});
        let parsed: Value = serde_json::from_str(&encode(&value)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_pretty_print_layout() {
        let pretty = pretty_print(r#"{"a":1,"b":[true,null]}"#);
        assert_eq!(
            pretty,
            "{\n  \"a\": 1,\n  \"b\": [\n    true,\n    null\n  ]\n}"
        );
    }

    #[test]
    fn test_pretty_print_empty_containers() {
        assert_eq!(pretty_print(r#"{"a":[],"b":{}}"#), "{\n  \"a\": [],\n  \"b\": {}\n}");
    }

    #[test]
    fn test_pretty_print_keeps_string_contents() {
        let compact = r#"{"k":"a, {b}: [c] \"q\""}"#;
        let pretty = pretty_print(compact);
        let a: Value = serde_json::from_str(compact).unwrap();
        let b: Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(a, b);
        assert!(pretty.contains(r#""a, {b}: [c] \"q\"""#));
    }

    #[test]
    fn test_list_versus_map_literals() {
        assert_eq!(encode(&json!([10, 20, 30])), "[10,20,30]");
        assert_eq!(encode(&json!({"0": 10, "1": 20, "2": 30})), "[10,20,30]");
        assert_eq!(encode(&json!({"0": 10, "2": 20})), r#"{"0":10,"2":20}"#);
    }

    #[test]
    fn test_envelope_survives_encode_and_pretty_print() {
        let envelope = json!({
            "data": {
                "Widget": {
                    "id": 7,
                    "name": "say \"hi\"\nthen leave",
                    "price": 12.75,
                    "active": true,
                    "retired": false,
                    "notes": null,
                    "tags": ["a", "b"]
                }
            },
            "meta": {
                "status": "ok",
                "feedback": [{"message": "Widget 7 saved", "level": "info"}],
                "request": {"REQUEST_URI": "/widgets/7.json?x=[1]"},
                "time_epoch": 1700000000
            }
        });

        let pretty = pretty_print(&encode(&envelope));
        assert!(pretty.contains('\n'));
        let decoded: Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_pretty_print_falls_back_on_invalid() {
        assert_eq!(pretty_print("{\"a\":"), "{\"a\":");
        assert_eq!(pretty_print("not json"), "not json");
    }

    #[test]
    fn test_jsonp_wrapping() {
        let encoder = JsonEncoder::new(false).with_callback(Some("cb_1".to_string()));
        assert_eq!(encoder.encode_str(&json!({"data": 1})), r#"cb_1({"data":1});"#);
    }

    #[test]
    fn test_callback_validation() {
        assert!(is_valid_callback("jQuery1234_5678"));
        assert!(!is_valid_callback("alert(1)"));
        assert!(!is_valid_callback("a.b"));
        assert!(!is_valid_callback(""));
    }
}
