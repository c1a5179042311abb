//! Business-rule validation for submitted widgets.
//!
//! Failures are returned as plain messages. The pipeline reports them at
//! `validate` level, which flips the envelope status to `error` without
//! changing the HTTP status.

use serde_json::Value;

use crate::models::WidgetInput;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for widget names.
pub const MAX_NAME_LENGTH: usize = 255;

/// Allowed widget sizes.
pub const MIN_SIZE: i64 = 1;
pub const MAX_SIZE: i64 = 10_000;

/// Maximum length for color names.
pub const MAX_COLOR_LENGTH: usize = 32;

/// Validate a widget name.
///
/// Rules:
/// - Must be between 1 and 255 characters
/// - Must start and end with an alphanumeric character
/// - Can contain alphanumeric characters, spaces, dots, underscores, and hyphens
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!("name cannot exceed {MAX_NAME_LENGTH} characters"));
    }

    let chars: Vec<char> = name.chars().collect();

    if !chars.first().is_some_and(|c| c.is_alphanumeric()) {
        return Err("name must start with an alphanumeric character".to_string());
    }

    if !chars.last().is_some_and(|c| c.is_alphanumeric()) {
        return Err("name must end with an alphanumeric character".to_string());
    }

    for (i, &c) in chars.iter().enumerate() {
        let allowed = c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-');
        if !allowed {
            return Err(format!(
                "name contains invalid character '{c}' at position {i}"
            ));
        }
    }

    Ok(())
}

/// Validate a widget size.
pub fn validate_size(size: i64) -> Result<(), String> {
    if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
        return Err(format!("size must be between {MIN_SIZE} and {MAX_SIZE}"));
    }
    Ok(())
}

/// Validate a color name: short, lowercase ASCII letters only.
pub fn validate_color(color: &str) -> Result<(), String> {
    if color.is_empty() || color.len() > MAX_COLOR_LENGTH {
        return Err(format!(
            "color must be between 1 and {MAX_COLOR_LENGTH} characters"
        ));
    }
    if !color.chars().all(|c| c.is_ascii_lowercase()) {
        return Err("color may only contain lowercase letters".to_string());
    }
    Ok(())
}

/// Read a size from JSON or form input, where numbers arrive as strings.
fn parse_size(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check a submitted record and convert it to [`WidgetInput`].
///
/// `require_name` is set for creates. Every rule is checked so callers can
/// report all failures at once.
pub fn validate_widget(data: &Value, require_name: bool) -> Result<WidgetInput, Vec<String>> {
    let Some(fields) = data.as_object() else {
        return Err(vec!["widget data must be a set of fields".to_string()]);
    };

    let mut errors = Vec::new();
    let mut input = WidgetInput::default();

    match fields.get("name") {
        Some(Value::String(name)) => match validate_name(name.trim()) {
            Ok(()) => input.name = Some(name.trim().to_string()),
            Err(e) => errors.push(e),
        },
        Some(_) => errors.push("name must be a string".to_string()),
        None if require_name => errors.push("name is required".to_string()),
        None => {}
    }

    if let Some(raw) = fields.get("size") {
        match parse_size(raw) {
            Some(size) => match validate_size(size) {
                Ok(()) => input.size = Some(size),
                Err(e) => errors.push(e),
            },
            None => errors.push("size must be a whole number".to_string()),
        }
    }

    match fields.get("color") {
        Some(Value::String(color)) => match validate_color(color) {
            Ok(()) => input.color = Some(color.clone()),
            Err(e) => errors.push(e),
        },
        Some(Value::Null) | None => {}
        Some(_) => errors.push("color must be a string".to_string()),
    }

    if errors.is_empty() {
        Ok(input)
    } else {
        Err(errors)
    }
}
