//! Content encoders for response envelopes.
//!
//! Both encoders are pure functions of the envelope tree: no I/O and no
//! mutation. The negotiated [`Extension`] picks the encoder and the
//! `Content-Type` header.

pub mod inflect;
pub mod json;
pub mod xml;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

pub use json::JsonEncoder;
pub use xml::XmlEncoder;

/// Content extensions the mediation layer can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Json,
    Xml,
}

impl Extension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extension::Json => "json",
            Extension::Xml => "xml",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Extension::Json => "application/json",
            Extension::Xml => "application/xml",
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Extension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Extension::Json),
            "xml" => Ok(Extension::Xml),
            other => Err(format!("unsupported extension '{other}'")),
        }
    }
}

/// Serializes an envelope tree to bytes.
pub trait ContentEncoder: Send + Sync {
    fn extension(&self) -> Extension;

    fn content_type(&self) -> &'static str {
        self.extension().content_type()
    }

    fn encode(&self, envelope: &Value) -> Vec<u8>;
}

/// Build the encoder for an extension.
///
/// `resource` names the XML root element; `callback` is a JSONP function
/// name that has already been validated by the caller.
pub fn encoder_for(
    extension: Extension,
    resource: &str,
    pretty: bool,
    callback: Option<String>,
) -> Box<dyn ContentEncoder> {
    match extension {
        Extension::Json => Box::new(JsonEncoder::new(pretty).with_callback(callback)),
        Extension::Xml => Box::new(XmlEncoder::for_resource(resource, pretty)),
    }
}

/// Decode bytes as UTF-8, treating invalid input as Latin-1.
///
/// Clients that send ISO-8859-1 bodies or header values end up with the
/// same characters re-encoded as UTF-8 instead of replacement characters.
pub fn normalize_utf8(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
