//! Credential extraction from the custom authorization scheme.
//!
//! Clients authenticate with a header of the form
//!
//! ```text
//! Authorization: TRUEREST username=john&apikey=0123abc&class=Employee
//! ```
//!
//! The first whitespace-separated token must equal the configured keyword
//! exactly. The remainder is parsed as a URL query string. A missing keyword
//! is not an error: the caller is simply anonymous.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::restlog::LogAccumulator;

/// Logical credential fields recorded in the request log.
pub const LOGGED_FIELDS: [&str; 3] = ["username", "apikey", "class"];

/// Keyword and field names of the authorization scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub keyword: String,
    /// Logical field name → field name used in the header.
    pub fields: BTreeMap<String, String>,
    /// Class assigned when the header does not carry one.
    pub default_class: String,
}

impl AuthSettings {
    /// Header field holding the caller's class.
    pub fn class_field(&self) -> &str {
        self.fields.get("class").map(String::as_str).unwrap_or("class")
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        let fields = ["class", "apikey", "username"]
            .into_iter()
            .map(|f| (f.to_string(), f.to_string()))
            .collect();
        Self {
            keyword: "TRUEREST".to_string(),
            fields,
            default_class: "Customer".to_string(),
        }
    }
}

/// Parsed credential fields. Always contains the class field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse a raw authorization header value.
///
/// Returns `None` when the header does not start with the keyword.
pub fn parse(header: &str, settings: &AuthSettings) -> Option<Credentials> {
    let mut tokens = header.split_whitespace();
    if tokens.next()? != settings.keyword {
        return None;
    }
    let query = tokens.collect::<Vec<_>>().join(" ");

    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(&query) {
        Ok(pairs) => pairs,
        Err(e) => {
            debug!(error = %e, "Unparseable credential string");
            Vec::new()
        }
    };

    let mut fields: BTreeMap<String, String> = pairs.into_iter().collect();
    let class_field = settings.class_field();
    if fields.get(class_field).is_none_or(|c| c.is_empty()) {
        fields.insert(class_field.to_string(), settings.default_class.clone());
    }

    Some(Credentials(fields))
}

/// Per-request credential accessor.
///
/// Parsing happens at most once; later calls reuse the cached result.
#[derive(Debug)]
pub struct CredentialExtractor {
    settings: AuthSettings,
    header: Option<String>,
    parsed: Option<Option<Credentials>>,
}

impl CredentialExtractor {
    pub fn new(settings: AuthSettings, header: Option<String>) -> Self {
        Self {
            settings,
            header,
            parsed: None,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Parse the header once, recording identity fields in the request log
    /// on the first successful parse.
    pub fn extract(&mut self, log: &mut LogAccumulator) -> Option<&Credentials> {
        if self.parsed.is_none() {
            let parsed = self
                .header
                .as_deref()
                .and_then(|h| parse(h, &self.settings));

            if let Some(credentials) = &parsed {
                for logical in LOGGED_FIELDS {
                    let value = self.resolve(credentials, logical).map(str::to_string);
                    log.set(logical, value);
                }
                debug!(fields = credentials.len(), "Credentials extracted");
            }
            self.parsed = Some(parsed);
        }
        self.all()
    }

    /// The full field map, if extraction has run and found credentials.
    pub fn all(&self) -> Option<&Credentials> {
        self.parsed.as_ref().and_then(Option::as_ref)
    }

    /// One field, directly or through the alias table.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.all().and_then(|c| self.resolve(c, name))
    }

    fn resolve<'a>(&self, credentials: &'a Credentials, name: &str) -> Option<&'a str> {
        credentials.get(name).or_else(|| {
            self.settings
                .fields
                .get(name)
                .and_then(|alias| credentials.get(alias))
        })
    }
}
