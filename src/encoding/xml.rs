//! XML encoding of response envelopes.
//!
//! The root element is named after the resource (`widgets_response`). Object
//! keys become child elements; list items are named after the singular of
//! their parent, or `item` when the parent has no distinct singular.

use serde_json::Value;

use super::json::is_sequential;
use super::{ContentEncoder, Extension, inflect};

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// XML encoder rooted at `<{resource}_response>`.
#[derive(Debug, Clone)]
pub struct XmlEncoder {
    root: String,
    pretty: bool,
}

impl XmlEncoder {
    pub fn for_resource(resource: &str, pretty: bool) -> Self {
        let table = inflect::tableize(resource);
        let root = if table.is_empty() {
            "response".to_string()
        } else {
            format!("{}_response", element_name(&table))
        };
        Self { root, pretty }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn encode_str(&self, envelope: &Value) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(DECLARATION);
        out.push('\n');
        self.write_element(&mut out, &self.root, envelope, 0);
        out
    }

    fn write_element(&self, out: &mut String, name: &str, value: &Value, depth: usize) {
        self.indent(out, depth);
        match value {
            Value::Null => {
                out.push('<');
                out.push_str(name);
                out.push_str("/>");
            }
            Value::Bool(b) => write_text(out, name, if *b { "1" } else { "0" }),
            Value::Number(n) => write_text(out, name, &n.to_string()),
            Value::String(s) => write_text(out, name, s),
            Value::Array(items) => self.write_list(out, name, items.iter(), depth),
            Value::Object(map) if is_sequential(map) => {
                self.write_list(out, name, map.values(), depth)
            }
            Value::Object(map) => {
                self.open(out, name, map.is_empty());
                if map.is_empty() {
                    return;
                }
                for (key, child) in map {
                    self.write_element(out, &element_name(key), child, depth + 1);
                }
                self.close(out, name, depth);
            }
        }
    }

    fn write_list<'a>(
        &self,
        out: &mut String,
        name: &str,
        items: impl ExactSizeIterator<Item = &'a Value>,
        depth: usize,
    ) {
        let empty = items.len() == 0;
        self.open(out, name, empty);
        if empty {
            return;
        }
        let item_name = item_name(name);
        for item in items {
            self.write_element(out, &item_name, item, depth + 1);
        }
        self.close(out, name, depth);
    }

    fn open(&self, out: &mut String, name: &str, empty: bool) {
        out.push('<');
        out.push_str(name);
        out.push_str(if empty { "/>" } else { ">" });
    }

    fn close(&self, out: &mut String, name: &str, depth: usize) {
        self.indent(out, depth);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }

    fn indent(&self, out: &mut String, depth: usize) {
        if self.pretty && !out.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        if self.pretty {
            for _ in 0..depth {
                out.push_str("  ");
            }
        }
    }
}

impl ContentEncoder for XmlEncoder {
    fn extension(&self) -> Extension {
        Extension::Xml
    }

    fn encode(&self, envelope: &Value) -> Vec<u8> {
        self.encode_str(envelope).into_bytes()
    }
}

fn write_text(out: &mut String, name: &str, text: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    escape_into(out, text);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
}

/// Turn an arbitrary key into a legal element name.
pub fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match name.chars().next() {
        None => "item".to_string(),
        Some(first) if !(first.is_alphabetic() || first == '_') => {
            name.insert(0, '_');
            name
        }
        Some(_) => name,
    }
}

fn item_name(parent: &str) -> String {
    let singular = inflect::singularize(parent);
    if singular == parent || singular.is_empty() {
        "item".to_string()
    } else {
        singular
    }
}
