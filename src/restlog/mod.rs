//! Request log accumulation and persistence.
//!
//! A [`LogAccumulator`] builds one [`LogRecord`] across the whole request
//! lifecycle and writes it through a [`LogStore`] exactly once per flush.
//! Logging is optional infrastructure: with no store configured a flush is a
//! successful no-op, and a failing store never fails the response.
//!
//! # Record Fields
//!
//! The pipeline fills these fields in the course of a request:
//!
//! | Field | Set by |
//! |-------|--------|
//! | `controller`, `action`, `model_id`, `ip`, `request_id` | setup |
//! | `requested` / `responded` | setup / shutdown (UTC, `Y-m-d H:i:s`) |
//! | `username`, `apikey`, `class` | credential extraction |
//! | `ratelimited` | rate limiter (`0` or `1`) |
//! | `data_in`, `data_out`, `meta` | envelope builder |
//! | `httpcode`, `error` | abort controller |

mod files;
mod store;

pub use files::{FieldFileStore, render_log_path};
pub use store::{LogStore, LogStoreError, MemoryLogStore};

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::metrics;
use crate::pipeline::RestHooks;

/// Timestamp layout used for `requested` / `responded`.
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way log records store it.
pub fn format_log_time(at: DateTime<Utc>) -> String {
    at.format(LOG_TIME_FORMAT).to_string()
}

/// Parse a timestamp stored with [`LOG_TIME_FORMAT`].
pub fn parse_log_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LOG_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Ordered field map describing one request/response lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field value rendered as a plain string (numbers and bools included).
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// When the request was received, from the `requested` field.
    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.0.get("requested")?.as_str().and_then(parse_log_time)
    }
}

impl From<Map<String, Value>> for LogRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Key/value record builder for one request.
pub struct LogAccumulator {
    record: LogRecord,
    store: Option<Arc<dyn LogStore>>,
}

impl LogAccumulator {
    /// Create an accumulator. `None` means logging is not configured.
    pub fn new(store: Option<Arc<dyn LogStore>>) -> Self {
        Self {
            record: LogRecord::new(),
            store,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&Arc<dyn LogStore>> {
        self.store.as_ref()
    }

    /// Store or overwrite one field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.record.insert(key, value);
    }

    /// Store every pair of a batch, in iteration order.
    pub fn set_all<K, V, I>(&mut self, fields: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in fields {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    pub fn record(&self) -> &LogRecord {
        &self.record
    }

    /// Write the accumulated record.
    ///
    /// Hooks fire as `before_save` → `filter` → write → `after_save`. A filter
    /// returning `None` skips the write and still reports success. Store
    /// failures are logged and reported as `false`, never raised.
    pub fn flush(&self, hooks: &dyn RestHooks) -> bool {
        let Some(store) = &self.store else {
            return true;
        };

        hooks.before_save(&self.record);

        let (ok, saved) = match hooks.filter(self.record.clone()) {
            Some(record) => match store.save(record) {
                Ok(id) => {
                    debug!(log_id = id, "Request log saved");
                    (true, Some(id))
                }
                Err(e) => {
                    warn!(error = %e, "Failed to save request log");
                    metrics::record_log_flush_failure();
                    (false, None)
                }
            },
            None => {
                debug!("Request log rejected by filter hook, skipping write");
                (true, None)
            }
        };

        hooks.after_save(saved);
        ok
    }
}
