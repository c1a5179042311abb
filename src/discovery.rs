//! Discovery of the handlers that expose the mediation layer.
//!
//! Each resource handler registers a [`HandlerDescriptor`] naming the
//! actions it declares and the ones it actually implements. Discovery turns
//! those into `{handler: {action: {variable: value}}}`, filling every exposed
//! variable from the declaration or the per-action defaults. The result is
//! cached in a [`HandlerCache`] owned by the application state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Variables exposed by `*` (every action) and by specific actions, with an
/// example value shown to maintainers.
pub type ExposeTable = Vec<(String, Vec<(String, String)>)>;

/// Action → exposed variables of one handler.
pub type HandlerMap = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error(
        "Rest maintainer needs to set \"{var}\" for {action} using {handler}->components->Rest.Rest->actions['{action}']['{var}'] = {example}"
    )]
    MissingExposedVar {
        handler: String,
        action: String,
        var: String,
        example: String,
    },
}

/// Actions a handler declares and implements.
#[derive(Debug, Clone, Default)]
pub struct HandlerDescriptor {
    pub name: String,
    /// Declared action → explicitly set variables.
    pub actions: Vec<(String, Map<String, Value>)>,
    /// Actions the handler has code for.
    pub implemented: Vec<String>,
}

impl HandlerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare and implement an action.
    pub fn action(mut self, action: &str, vars: Value) -> Self {
        self = self.declare(action, vars);
        self.implemented.push(action.to_string());
        self
    }

    /// Declare an action without marking it implemented.
    pub fn declare(mut self, action: &str, vars: Value) -> Self {
        let vars = match vars {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.actions.push((action.to_string(), vars));
        self
    }
}

/// Exposure rules.
#[derive(Debug, Clone)]
pub struct ExposureSettings {
    /// Handlers never listed.
    pub skip_handlers: Vec<String>,
    /// `*` applies to every action; other keys add to one action.
    pub expose_vars: ExposeTable,
    /// Action → variable → default value.
    pub default_vars: BTreeMap<String, Map<String, Value>>,
}

impl ExposureSettings {
    fn exposed_for(&self, action: &str) -> Vec<(&str, &str)> {
        let mut vars: Vec<(&str, &str)> = Vec::new();
        for scope in ["*", action] {
            let Some((_, table)) = self.expose_vars.iter().find(|(name, _)| name == scope) else {
                continue;
            };
            for (var, example) in table {
                match vars.iter_mut().find(|slot| slot.0 == var.as_str()) {
                    Some(slot) => slot.1 = example.as_str(),
                    None => vars.push((var.as_str(), example.as_str())),
                }
            }
        }
        vars
    }
}

impl Default for ExposureSettings {
    fn default() -> Self {
        let pairs = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        };
        let defaults = |method: &str, id: bool| {
            let mut map = Map::new();
            map.insert("scopeVar".to_string(), json!("scope"));
            map.insert("method".to_string(), json!(method));
            map.insert("id".to_string(), json!(id));
            map
        };

        Self {
            skip_handlers: vec!["App".to_string(), "Defaults".to_string()],
            expose_vars: vec![
                (
                    "*".to_string(),
                    pairs(&[("method", "get|post|put|delete"), ("id", "true|false")]),
                ),
                (
                    "index".to_string(),
                    pairs(&[("scopeVar", "scope|rack_name|any_other_varname_to_specify_scope")]),
                ),
            ],
            default_vars: BTreeMap::from([
                ("index".to_string(), defaults("get", false)),
                ("view".to_string(), defaults("get", true)),
                ("edit".to_string(), defaults("put", true)),
                ("add".to_string(), defaults("put", false)),
                ("delete".to_string(), defaults("delete", true)),
            ]),
        }
    }
}

/// Discovery result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovered {
    pub handlers: BTreeMap<String, HandlerMap>,
    /// Declared actions with no implementation.
    pub notes: Vec<String>,
}

impl Discovered {
    pub fn to_value(&self) -> Value {
        json!(self.handlers)
    }
}

/// Build the exposure listing for a set of handlers.
pub fn discover(
    candidates: &[HandlerDescriptor],
    settings: &ExposureSettings,
) -> Result<Discovered, DiscoveryError> {
    let mut found = Discovered::default();

    for handler in candidates {
        if settings.skip_handlers.contains(&handler.name) {
            continue;
        }

        let mut exposed = Map::new();
        for (action, declared) in &handler.actions {
            if !handler.implemented.contains(action) {
                found.notes.push(format!(
                    "Rest component is expecting a \"{0}\" action but got \"{1}\" instead. \
                     You probably did not implement the \"{1}\" action in the \"{0}\" handler yet",
                    handler.name, action
                ));
                continue;
            }

            let mut vars = Map::new();
            for (var, example) in settings.exposed_for(action) {
                let value = declared.get(var).cloned().or_else(|| {
                    settings
                        .default_vars
                        .get(action)
                        .and_then(|defaults| defaults.get(var))
                        .cloned()
                });
                let Some(value) = value else {
                    return Err(DiscoveryError::MissingExposedVar {
                        handler: handler.name.clone(),
                        action: action.clone(),
                        var: var.to_string(),
                        example: example.to_string(),
                    });
                };
                vars.insert(var.to_string(), value);
            }
            exposed.insert(action.clone(), Value::Object(vars));
        }

        found.handlers.insert(handler.name.clone(), exposed);
    }

    Ok(found)
}

/// Shared, explicitly invalidated discovery snapshot.
///
/// Readers get an `Arc` to an immutable snapshot; rebuilding swaps in a new
/// one, so iteration over an old snapshot is never disturbed.
#[derive(Debug, Default)]
pub struct HandlerCache {
    snapshot: RwLock<Option<Arc<Discovered>>>,
}

impl HandlerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, if one has been built.
    pub fn get(&self) -> Option<Arc<Discovered>> {
        self.snapshot.read().ok().and_then(|guard| guard.clone())
    }

    /// Cached snapshot, building it first when missing. Failed builds are
    /// not cached.
    pub fn get_or_build(
        &self,
        build: impl FnOnce() -> Result<Discovered, DiscoveryError>,
    ) -> Result<Arc<Discovered>, DiscoveryError> {
        if let Some(snapshot) = self.get() {
            debug!("Handler discovery served from cache");
            return Ok(snapshot);
        }

        let snapshot = Arc::new(build()?);
        match self.snapshot.write() {
            Ok(mut slot) => *slot = Some(Arc::clone(&snapshot)),
            Err(_) => warn!("Handler cache lock poisoned, serving uncached discovery"),
        }
        info!(handlers = snapshot.handlers.len(), "Handler discovery rebuilt");
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn widgets() -> HandlerDescriptor {
        HandlerDescriptor::new("Widgets")
            .action("index", json!({}))
            .action("view", json!({"method": "get"}))
            .action("add", json!({"method": "post"}))
    }

    #[test]
    fn test_defaults_fill_exposed_vars() {
        let found = discover(&[widgets()], &ExposureSettings::default()).unwrap();
        let widgets = &found.handlers["Widgets"];

        assert_eq!(
            widgets["index"],
            json!({"method": "get", "id": false, "scopeVar": "scope"})
        );
        assert_eq!(widgets["add"], json!({"method": "post", "id": false}));
        assert!(found.notes.is_empty());
    }

    #[test]
    fn test_skip_handlers() {
        let found = discover(
            &[HandlerDescriptor::new("App").action("index", json!({})), widgets()],
            &ExposureSettings::default(),
        )
        .unwrap();
        assert!(!found.handlers.contains_key("App"));
        assert!(found.handlers.contains_key("Widgets"));
    }

    #[test]
    fn test_unimplemented_action_becomes_note() {
        let handler = widgets().declare("export", json!({"method": "get", "id": false}));
        let found = discover(&[handler], &ExposureSettings::default()).unwrap();

        assert!(!found.handlers["Widgets"].contains_key("export"));
        assert_eq!(found.notes.len(), 1);
        assert!(found.notes[0].contains("\"export\""));
    }

    #[test]
    fn test_missing_var_without_default() {
        let handler = HandlerDescriptor::new("Gadgets").action("export", json!({"method": "get"}));
        let err = discover(&[handler], &ExposureSettings::default()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Rest maintainer needs to set \"id\" for export using \
             Gadgets->components->Rest.Rest->actions['export']['id'] = true|false"
        );
    }

    #[test]
    fn test_result_sorted_by_handler() {
        let found = discover(
            &[
                HandlerDescriptor::new("Zebras").action("index", json!({})),
                HandlerDescriptor::new("Apples").action("index", json!({})),
            ],
            &ExposureSettings::default(),
        )
        .unwrap();
        let names: Vec<&String> = found.handlers.keys().collect();
        assert_eq!(names, ["Apples", "Zebras"]);
    }

    #[test]
    fn test_cache_builds_once_until_invalidated() {
        let cache = HandlerCache::new();
        let mut builds = 0;

        for _ in 0..3 {
            cache
                .get_or_build(|| {
                    builds += 1;
                    discover(&[widgets()], &ExposureSettings::default())
                })
                .unwrap();
        }
        assert_eq!(builds, 1);

        let before = cache.get().unwrap();
        cache.invalidate();
        assert!(cache.get().is_none());
        assert!(before.handlers.contains_key("Widgets"));
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = HandlerCache::new();
        let bad = HandlerDescriptor::new("Gadgets").action("export", json!({}));
        assert!(cache.get_or_build(|| discover(&[bad], &ExposureSettings::default())).is_err());
        assert!(cache.get().is_none());
    }
}
