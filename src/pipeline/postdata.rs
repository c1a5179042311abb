//! Parsing and shaping of submitted request bodies.
//!
//! Bodies are accepted as JSON or as form-encoded pairs with bracketed keys
//! (`Widget[name]=bolt&meta[dryrun]=1`). The result is wrapped in the model
//! name, so handlers always see `{"Widget": {...}}` or, for mass updates,
//! `{"Widget": {"1": {...}, "2": {...}}}`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::encoding::normalize_utf8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostDataError {
    #[error("Malformed request body: {0}")]
    Malformed(String),

    #[error("2 dimensional can only begin with numeric index")]
    NonNumericIndex,

    #[error("You may only send 1 dimensional posts")]
    TooDeep,
}

/// Decode a request body. Empty bodies yield `None`.
pub fn parse_body(bytes: &[u8], content_type: Option<&str>) -> Result<Option<Value>, PostDataError> {
    let text = normalize_utf8(bytes);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let is_json = content_type.is_some_and(|ct| ct.contains("json"))
        || text.starts_with('{')
        || text.starts_with('[');

    if is_json {
        return serde_json::from_str(text)
            .map(Some)
            .map_err(|e| PostDataError::Malformed(e.to_string()));
    }

    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(text).map_err(|e| PostDataError::Malformed(e.to_string()))?;
    let mut root = Map::new();
    for (key, value) in pairs {
        insert_bracketed(&mut root, &key, Value::String(value));
    }
    Ok(Some(Value::Object(root)))
}

/// Insert `a[b][c] = value` into a nested map. `a[]` appends.
fn insert_bracketed(root: &mut Map<String, Value>, key: &str, value: Value) {
    let (head, rest) = match key.find('[') {
        Some(pos) if key.ends_with(']') => (&key[..pos], &key[pos + 1..key.len() - 1]),
        _ => (key, ""),
    };
    let mut path: Vec<&str> = vec![head];
    if !rest.is_empty() || key.ends_with("[]") {
        path.extend(rest.split("]["));
    }

    let mut node = root;
    for (i, segment) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        let segment = if segment.is_empty() {
            node.len().to_string()
        } else {
            (*segment).to_string()
        };

        if last {
            node.insert(segment, value);
            return;
        }

        let child = node
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        let Value::Object(map) = child else {
            return;
        };
        node = map;
    }
}

/// Depth of the deepest container nesting. Scalars are 0.
pub fn count_dim(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(count_dim).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(count_dim).max().unwrap_or(0),
        _ => 0,
    }
}

/// True when every key of a container is an integer index.
pub fn is_numeric_indexed(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Object(map) => map.keys().all(|k| k.parse::<i64>().is_ok()),
        _ => false,
    }
}

/// Split off the `meta` block clients use for request options.
pub fn take_meta(body: &mut Value) -> Option<Value> {
    body.as_object_mut().and_then(|map| map.shift_remove("meta"))
}

/// Wrap submitted data in the model name.
///
/// Data already wrapped in the model name is unwrapped first. One level of
/// fields is accepted, or two levels when the outer keys are numeric.
pub fn modelize(data: Value, model: &str) -> Result<Value, PostDataError> {
    if !data.is_object() && !data.is_array() {
        return Ok(data);
    }

    let data = match data {
        Value::Object(mut map) if map.contains_key(model) => {
            map.shift_remove(model).unwrap_or(Value::Null)
        }
        other => other,
    };

    match count_dim(&data) {
        0 | 1 => {}
        2 if is_numeric_indexed(&data) => {}
        2 => return Err(PostDataError::NonNumericIndex),
        _ => return Err(PostDataError::TooDeep),
    }

    let mut wrapped = Map::new();
    wrapped.insert(model.to_string(), data);
    Ok(Value::Object(wrapped))
}

/// Truthiness of a submitted option value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_body() {
        let body = parse_body(br#"{"name":"bolt"}"#, Some("application/json")).unwrap();
        assert_eq!(body, Some(json!({"name": "bolt"})));
    }

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(parse_body(b"  ", None).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = parse_body(b"{\"name\":", Some("application/json")).unwrap_err();
        assert!(matches!(err, PostDataError::Malformed(_)));
    }

    #[test]
    fn test_parse_form_with_brackets() {
        let body = parse_body(b"Widget[name]=bolt&Widget[size]=3&meta[dryrun]=1", None)
            .unwrap()
            .unwrap();
        assert_eq!(
            body,
            json!({"Widget": {"name": "bolt", "size": "3"}, "meta": {"dryrun": "1"}})
        );
    }

    #[test]
    fn test_parse_form_appends_empty_brackets() {
        let body = parse_body(b"tags[]=a&tags[]=b", None).unwrap().unwrap();
        assert_eq!(body, json!({"tags": {"0": "a", "1": "b"}}));
    }

    #[test]
    fn test_parse_latin1_form() {
        let body = parse_body(&[b'n', b'=', 0xE9], None).unwrap().unwrap();
        assert_eq!(body, json!({"n": "é"}));
    }

    #[test]
    fn test_count_dim() {
        assert_eq!(count_dim(&json!("x")), 0);
        assert_eq!(count_dim(&json!({"a": 1})), 1);
        assert_eq!(count_dim(&json!({"1": {"a": 1}})), 2);
        assert_eq!(count_dim(&json!({"a": 1, "b": {"c": {"d": 1}}})), 3);
    }

    #[test]
    fn test_modelize_flat() {
        let out = modelize(json!({"name": "bolt"}), "Widget").unwrap();
        assert_eq!(out, json!({"Widget": {"name": "bolt"}}));
    }

    #[test]
    fn test_modelize_unwraps_existing_model() {
        let out = modelize(json!({"Widget": {"name": "bolt"}}), "Widget").unwrap();
        assert_eq!(out, json!({"Widget": {"name": "bolt"}}));
    }

    #[test]
    fn test_modelize_numeric_mass_update() {
        let out = modelize(json!({"1": {"name": "a"}, "2": {"name": "b"}}), "Widget").unwrap();
        assert_eq!(out["Widget"]["2"]["name"], "b");
    }

    #[test]
    fn test_modelize_rejects_named_second_level() {
        let err = modelize(json!({"Other": {"name": "a"}}), "Widget").unwrap_err();
        assert_eq!(err, PostDataError::NonNumericIndex);
        assert_eq!(err.to_string(), "2 dimensional can only begin with numeric index");
    }

    #[test]
    fn test_modelize_rejects_deep_posts() {
        let err = modelize(json!({"1": {"a": {"b": 1}}}), "Widget").unwrap_err();
        assert_eq!(err, PostDataError::TooDeep);
    }

    #[test]
    fn test_take_meta() {
        let mut body = json!({"name": "bolt", "meta": {"dryrun": "1"}});
        let meta = take_meta(&mut body).unwrap();
        assert!(is_truthy(&meta["dryrun"]));
        assert_eq!(body, json!({"name": "bolt"}));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("yes")));
    }
}
