use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Demo record served through the mediation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: u64,
    pub name: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Widget {
    /// Build a widget from validated input. Missing fields take defaults.
    pub fn create(id: u64, input: WidgetInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: input.name.unwrap_or_default(),
            size: input.size.unwrap_or(1),
            color: input.color,
            created: now,
            modified: now,
        }
    }

    /// Overwrite the fields present in `input`.
    pub fn apply(&mut self, input: WidgetInput, now: DateTime<Utc>) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if let Some(size) = input.size {
            self.size = size;
        }
        if input.color.is_some() {
            self.color = input.color;
        }
        self.modified = now;
    }

    /// Record wrapped in its model name.
    pub fn to_value(&self) -> Value {
        json!({ "Widget": self })
    }
}

/// Submitted widget fields, already type-checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetInput {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub color: Option<String>,
}
