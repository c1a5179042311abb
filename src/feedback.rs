//! Leveled diagnostic messages collected during one request.
//!
//! Feedback is append-only: entries are never mutated or removed, and
//! reading them (for the envelope or the log) does not clear them.
//!
//! Messages are plain strings. Callers that need substitution format at the
//! call site, which covers the printf-style templates of other REST stacks:
//!
//! ```rust
//! use rest_mediator::feedback::{Feedback, FeedbackLevel};
//!
//! let mut feedback = Feedback::new();
//! assert!(!feedback.error(format_args!("{} is not a valid id", "abc")));
//! assert!(feedback.info("cache warm"));
//! assert!(feedback.has_errors());
//! assert_eq!(feedback.count(FeedbackLevel::Error), 1);
//! ```

use std::fmt;

use serde::Serialize;

/// Severity of a feedback entry.
///
/// `Validate` is reserved for business-rule rejections (model validation),
/// kept apart from `Error`, which signals system or input failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Error,
    Validate,
    Debug,
    Info,
    Warning,
}

impl FeedbackLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLevel::Error => "error",
            FeedbackLevel::Validate => "validate",
            FeedbackLevel::Debug => "debug",
            FeedbackLevel::Info => "info",
            FeedbackLevel::Warning => "warning",
        }
    }

    /// Whether adding a message at this level reports success to the caller.
    pub fn is_success(&self) -> bool {
        matches!(self, FeedbackLevel::Debug | FeedbackLevel::Info)
    }
}

impl fmt::Display for FeedbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened feedback entry as it appears in `meta.feedback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEntry {
    pub message: String,
    pub level: FeedbackLevel,
}

/// Feedback accumulator for a single request.
///
/// Levels are kept in the order they were first used; messages within a
/// level keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct Feedback {
    levels: Vec<(FeedbackLevel, Vec<String>)>,
}

impl Feedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns `false` for failure levels (`error`,
    /// `validate`, `warning`) and `true` for `debug`/`info`.
    pub fn add(&mut self, level: FeedbackLevel, message: impl fmt::Display) -> bool {
        let message = message.to_string();
        match self.levels.iter_mut().find(|(l, _)| *l == level) {
            Some((_, messages)) => messages.push(message),
            None => self.levels.push((level, vec![message])),
        }
        level.is_success()
    }

    pub fn error(&mut self, message: impl fmt::Display) -> bool {
        self.add(FeedbackLevel::Error, message)
    }

    pub fn validate(&mut self, message: impl fmt::Display) -> bool {
        self.add(FeedbackLevel::Validate, message)
    }

    pub fn debug(&mut self, message: impl fmt::Display) -> bool {
        self.add(FeedbackLevel::Debug, message)
    }

    pub fn info(&mut self, message: impl fmt::Display) -> bool {
        self.add(FeedbackLevel::Info, message)
    }

    pub fn warning(&mut self, message: impl fmt::Display) -> bool {
        self.add(FeedbackLevel::Warning, message)
    }

    /// Raw level → messages view.
    pub fn by_level(&self) -> &[(FeedbackLevel, Vec<String>)] {
        &self.levels
    }

    /// Messages recorded at one level.
    pub fn messages(&self, level: FeedbackLevel) -> &[String] {
        self.levels
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or_default()
    }

    pub fn count(&self, level: FeedbackLevel) -> usize {
        self.messages(level).len()
    }

    /// True when any `error` or `validate` entry exists; drives `meta.status`.
    pub fn has_errors(&self) -> bool {
        self.count(FeedbackLevel::Error) > 0 || self.count(FeedbackLevel::Validate) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Flattened entries in level-then-insertion order.
    pub fn flatten(&self) -> Vec<FeedbackEntry> {
        self.levels
            .iter()
            .flat_map(|(level, messages)| {
                messages.iter().map(|message| FeedbackEntry {
                    message: message.clone(),
                    level: *level,
                })
            })
            .collect()
    }
}
