//! Divert selected log fields to files on disk.
//!
//! Bulky fields such as `data_in`, `meta` and `data_out` can be kept out of
//! the log store and written to per-request files instead. Paths come from
//! templates with these placeholders:
//!
//! - `{LOGS}` - configured log directory (with trailing separator)
//! - `{date_Y}`, `{date_m}` - year and month of the write
//! - `{username}` - username of the record, sanitized for paths
//! - `{id}` - id assigned by the wrapped store
//! - `{field}` - the diverted field name
//!
//! Inside a Tokio runtime the files are written on the blocking pool, so
//! `save` returns once the wrapped store has the record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{LogRecord, LogStore, LogStoreError};
use crate::encoding::json;

/// A [`LogStore`] wrapper that writes configured fields to files.
pub struct FieldFileStore<S> {
    inner: S,
    templates: BTreeMap<String, String>,
    logs_dir: PathBuf,
    pretty: bool,
}

impl<S: LogStore> FieldFileStore<S> {
    pub fn new(
        inner: S,
        templates: BTreeMap<String, String>,
        logs_dir: impl Into<PathBuf>,
        pretty: bool,
    ) -> Self {
        Self {
            inner,
            templates,
            logs_dir: logs_dir.into(),
            pretty,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn encode(&self, value: &Value) -> String {
        let encoded = json::encode(value);
        if self.pretty {
            json::pretty_print(&encoded)
        } else {
            encoded
        }
    }
}

fn write_files(files: Vec<(PathBuf, String)>) {
    if files.is_empty() {
        return;
    }
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                for (path, contents) in &files {
                    write_field_file(path, contents);
                }
            });
        }
        Err(_) => {
            for (path, contents) in &files {
                write_field_file(path, contents);
            }
        }
    }
}

fn write_field_file(path: &Path, contents: &str) {
    let result = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(path, contents));

    match result {
        Ok(()) => debug!(path = %path.display(), "Wrote log field file"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to write log field file"),
    }
}

impl<S: LogStore> LogStore for FieldFileStore<S> {
    fn save(&self, mut record: LogRecord) -> Result<u64, LogStoreError> {
        let diverted: Vec<(String, Value)> = self
            .templates
            .keys()
            .filter_map(|field| record.remove(field).map(|v| (field.clone(), v)))
            .collect();
        let username = record.get_str("username").unwrap_or_default();

        let id = self.inner.save(record)?;

        let now = Utc::now();
        let files = diverted
            .into_iter()
            .filter_map(|(field, value)| {
                let template = self.templates.get(&field)?;
                let path = render_log_path(template, &self.logs_dir, &username, id, &field, now);
                Some((PathBuf::from(path), self.encode(&value)))
            })
            .collect();
        write_files(files);

        Ok(id)
    }

    fn count_since(
        &self,
        field: &str,
        value: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, LogStoreError> {
        self.inner.count_since(field, value, since)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, LogStoreError> {
        self.inner.prune_before(cutoff)
    }

    fn record_count(&self) -> Option<u64> {
        self.inner.record_count()
    }
}

/// Render a log file path template.
pub fn render_log_path(
    template: &str,
    logs_dir: &Path,
    username: &str,
    id: u64,
    field: &str,
    at: DateTime<Utc>,
) -> String {
    let mut logs = logs_dir.display().to_string();
    if !logs.ends_with(std::path::MAIN_SEPARATOR) && !logs.ends_with('/') {
        logs.push(std::path::MAIN_SEPARATOR);
    }

    template
        .replace("{LOGS}", &logs)
        .replace("{date_Y}", &at.format("%Y").to_string())
        .replace("{date_m}", &at.format("%m").to_string())
        .replace("{username}", &sanitize_segment(username))
        .replace("{id}", &id.to_string())
        .replace("{field}", &sanitize_segment(field))
}

/// Keep path segments free of separators and traversal sequences.
fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
