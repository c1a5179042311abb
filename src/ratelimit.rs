//! Sliding-window rate limiting on top of the request log.
//!
//! There is no separate counter store: the number of prior requests is the
//! number of log records for the caller newer than `now - span`. That makes
//! the limit approximate under concurrent requests from one identity, which
//! is accepted.
//!
//! # Identity
//!
//! Callers presenting the identity credential field (the API key by default)
//! are limited per identity using their class window. Everyone else is
//! limited per IP address using the IP window.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::CredentialExtractor;
use crate::pipeline::RestHooks;
use crate::restlog::{LogStore, LogStoreError};

/// Errors parsing a window expression such as `-1 hour/100`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowParseError {
    #[error("window '{0}' must look like '<span>/<max>'")]
    Format(String),

    #[error("invalid span '{0}', expected e.g. '-1 hour' or '-30 minutes'")]
    Span(String),

    #[error("invalid max '{0}'")]
    Max(String),
}

/// Parse a relative span like `-1 hour`, `2 days` or `-1 hour 30 minutes`.
///
/// The sign is ignored: every span looks back from now.
pub fn parse_span(expr: &str) -> Result<Duration, WindowParseError> {
    let err = || WindowParseError::Span(expr.to_string());
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(err());
    }

    let mut total = Duration::zero();
    for pair in tokens.chunks(2) {
        let amount: i64 = pair[0]
            .trim_start_matches(['-', '+'])
            .parse()
            .map_err(|_| err())?;
        let unit = match pair[1].trim_end_matches('s') {
            "sec" | "second" => Duration::try_seconds(amount),
            "min" | "minute" => Duration::try_minutes(amount),
            "hour" => Duration::try_hours(amount),
            "day" => Duration::try_days(amount),
            "week" => Duration::try_weeks(amount),
            _ => None,
        }
        .ok_or_else(err)?;
        total = total.checked_add(&unit).ok_or_else(err)?;
    }

    if total <= Duration::zero() {
        return Err(err());
    }
    Ok(total)
}

/// A `(span, max)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    span: Duration,
    label: String,
    max: u64,
}

impl RateWindow {
    pub fn new(span: &str, max: u64) -> Result<Self, WindowParseError> {
        Ok(Self {
            span: parse_span(span)?,
            label: span.replace('-', "").trim().to_string(),
            max,
        })
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Human-readable span, e.g. `1 hour`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start of the window ending at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span
    }
}

impl FromStr for RateWindow {
    type Err = WindowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (span, max) = s
            .rsplit_once('/')
            .ok_or_else(|| WindowParseError::Format(s.to_string()))?;
        let max = max
            .trim()
            .parse()
            .map_err(|_| WindowParseError::Max(max.trim().to_string()))?;
        Self::new(span.trim(), max)
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requests in {}", self.max, self.label)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub enabled: bool,
    pub default_class: String,
    pub classes: BTreeMap<String, RateWindow>,
    /// Credential field identifying a caller, also the log field counted on.
    pub ident_field: String,
    pub ip_window: RateWindow,
}

impl RatePolicy {
    /// Window for a class, falling back to the default class.
    pub fn class_window(&self, class: &str) -> Option<&RateWindow> {
        self.classes
            .get(class)
            .or_else(|| self.classes.get(&self.default_class))
    }

    /// Longest span any caller is counted over.
    pub fn longest_span(&self) -> Duration {
        self.classes
            .values()
            .map(RateWindow::span)
            .fold(self.ip_window.span(), Ord::max)
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        let window = |span: &str, max| RateWindow {
            span: parse_span(span).unwrap_or_else(|_| Duration::hours(1)),
            label: span.replace('-', ""),
            max,
        };
        let classes = [
            ("Employee".to_string(), window("-1 hour", 1000)),
            ("Customer".to_string(), window("-1 hour", 100)),
        ]
        .into_iter()
        .collect();

        Self {
            enabled: true,
            default_class: "Customer".to_string(),
            classes,
            ident_field: "apikey".to_string(),
            ip_window: window("-1 hour", 60),
        }
    }
}

/// Who a check is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateScope {
    Identity {
        field: String,
        value: String,
        class: String,
    },
    Ip(String),
}

impl RateScope {
    /// Log field and value the count query filters on.
    pub fn log_filter(&self) -> (&str, &str) {
        match self {
            RateScope::Identity { field, value, .. } => (field, value),
            RateScope::Ip(ip) => ("ip", ip),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RateScope::Identity { .. } => "identity",
            RateScope::Ip(_) => "ip",
        }
    }
}

/// A caller over its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitExceeded {
    /// Requests in the window including the current one.
    pub count: u64,
    pub max: u64,
    pub window: String,
    pub scope: RateScope,
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "You have reached your ratelimit ({} is more than the allowed {} requests in {})",
            self.count, self.max, self.window
        )
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateCheck {
    Allowed { count: u64, max: u64 },
    Exceeded(LimitExceeded),
    /// Neither an identity nor an IP was available.
    Unidentified,
}

/// Configuration failures of the rate limiter. These abort the request.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Logging is required for any ratelimiting to work")]
    LoggingRequired,

    #[error("Need a identfield or I will not know what to ratelimit on")]
    MissingIdentField,

    #[error("No rate window configured for class '{0}'")]
    UnknownClass(String),

    #[error(transparent)]
    Store(#[from] LogStoreError),
}

/// Sliding-window limiter bound to a policy.
#[derive(Debug, Clone)]
pub struct RateLimiter<'a> {
    policy: &'a RatePolicy,
}

impl<'a> RateLimiter<'a> {
    pub fn new(policy: &'a RatePolicy) -> Self {
        Self { policy }
    }

    /// Pick the scope and window for a caller.
    pub fn resolve(
        &self,
        credentials: &CredentialExtractor,
        ip: Option<&str>,
    ) -> Result<Option<(RateScope, &'a RateWindow)>, RateLimitError> {
        if self.policy.ident_field.is_empty() {
            return Err(RateLimitError::MissingIdentField);
        }

        if let Some(value) = credentials
            .field(&self.policy.ident_field)
            .filter(|v| !v.is_empty())
        {
            let class = credentials
                .field("class")
                .unwrap_or(&self.policy.default_class)
                .to_string();
            let window = self
                .policy
                .class_window(&class)
                .ok_or_else(|| RateLimitError::UnknownClass(class.clone()))?;
            let scope = RateScope::Identity {
                field: self.policy.ident_field.clone(),
                value: value.to_string(),
                class,
            };
            return Ok(Some((scope, window)));
        }

        Ok(ip
            .filter(|ip| !ip.is_empty())
            .map(|ip| (RateScope::Ip(ip.to_string()), &self.policy.ip_window)))
    }

    /// Count prior requests for the caller and compare against the limit.
    ///
    /// `store` is `None` when logging is not configured, which makes rate
    /// limiting impossible.
    pub fn check(
        &self,
        store: Option<&dyn LogStore>,
        credentials: &CredentialExtractor,
        ip: Option<&str>,
        hooks: &dyn RestHooks,
        now: DateTime<Utc>,
    ) -> Result<RateCheck, RateLimitError> {
        let store = store.ok_or(RateLimitError::LoggingRequired)?;

        let Some((scope, window)) = self.resolve(credentials, ip)? else {
            warn!("No identity or IP available, skipping rate limit");
            return Ok(RateCheck::Unidentified);
        };

        let max = hooks
            .ratelimit_max(&scope, window)
            .unwrap_or_else(|| window.max());

        let (field, value) = scope.log_filter();
        hooks.before_count(&scope);
        let prior = store.count_since(field, value, window.since(now))?;
        hooks.after_count(&scope, prior);

        debug!(scope = scope.kind(), prior, max, window = window.label(), "Rate limit checked");

        if prior >= max {
            return Ok(RateCheck::Exceeded(LimitExceeded {
                count: prior + 1,
                max,
                window: window.label().to_string(),
                scope,
            }));
        }
        Ok(RateCheck::Allowed { count: prior, max })
    }
}
