//! Extension points a resource handler can implement.

use crate::ratelimit::{RateScope, RateWindow};
use crate::restlog::LogRecord;

/// Named hooks invoked by the pipeline.
///
/// Every method has a no-op default, so handlers override only what they
/// need.
pub trait RestHooks: Send + Sync {
    /// Runs before the request log is written.
    fn before_save(&self, _record: &LogRecord) {}

    /// Transform the log record just before the write. Returning `None`
    /// skips the write; the flush still succeeds.
    fn filter(&self, record: LogRecord) -> Option<LogRecord> {
        Some(record)
    }

    /// Runs after the write attempt with the new record id, if any.
    fn after_save(&self, _saved: Option<u64>) {}

    /// Override the allowed request count for a caller.
    fn ratelimit_max(&self, _scope: &RateScope, _window: &RateWindow) -> Option<u64> {
        None
    }

    /// Runs before prior requests are counted.
    fn before_count(&self, _scope: &RateScope) {}

    /// Runs after prior requests are counted.
    fn after_count(&self, _scope: &RateScope, _count: u64) {}
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RestHooks for NoHooks {}

/// Message an authorization layer leaves for the request it turned away.
///
/// Insert it as a request extension, or set it on the pipeline with
/// `RestPipeline::leave_auth_message`. The first structured abort of that
/// request consumes it and becomes a 403 carrying the message. Other
/// requests never see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMessage(pub String);
