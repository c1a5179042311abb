//! The `widgets` demo resource.
//!
//! Every action opens a pipeline, runs startup, does its work against the
//! in-memory [`WidgetService`] and hands the outcome back to the pipeline.
//!
//! | Action | Route | Payload |
//! |--------|-------|---------|
//! | index  | `GET /widgets.json?color=red` | `[{"Widget": {...}}, ...]` |
//! | view   | `GET /widgets/{id}.json` | `{"Widget": {...}}` |
//! | add    | `POST /widgets.json` | echoed post data with the new `id` |
//! | edit   | `PUT /widgets/{id}.json` | `{"Widget": {...}}` |
//! | delete | `DELETE /widgets/{id}.json` | `null` |

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::context::RequestContext;
use crate::error::AppResult;
use crate::models::Widget;
use crate::pipeline::{
    AbortReason, Aborted, Outcome, RestHooks, RestPipeline, RestResponse,
};
use crate::ratelimit::RateScope;
use crate::restlog::LogRecord;
use crate::services::WidgetService;
use crate::state::AppState;
use crate::validation::validate_widget;

pub const RESOURCE: &str = "widgets";

/// Query parameter that scopes the index, as declared in the registry.
pub const SCOPE_VAR: &str = "color";

/// Message left for the caught redirect when an anonymous caller tries to
/// delete.
pub const DELETE_REQUIRES_KEY: &str = "You are not authorized to access that location.";

/// Hooks for the widgets resource.
#[derive(Debug, Default)]
pub struct WidgetHooks;

impl RestHooks for WidgetHooks {
    fn before_save(&self, record: &LogRecord) {
        debug!(action = ?record.get_str("action"), "Saving widget request log");
    }

    fn after_save(&self, saved: Option<u64>) {
        debug!(?saved, "Widget request log saved");
    }

    fn after_count(&self, scope: &RateScope, count: u64) {
        debug!(scope = scope.kind(), count, "Counted prior widget requests");
    }
}

fn hooks() -> Arc<dyn RestHooks> {
    Arc::new(WidgetHooks)
}

/// Strip a content extension from an id segment (`3.json` → `3`).
fn id_segment(segment: &str) -> &str {
    segment.split_once('.').map_or(segment, |(id, _)| id)
}

fn parse_id(rest: &mut RestPipeline, segment: &str) -> Outcome<u64> {
    id_segment(segment).parse().map_err(|_| {
        rest.abort(
            AbortReason::status(
                StatusCode::BAD_REQUEST,
                format!("Invalid widget id '{}'", id_segment(segment)),
            ),
            Value::Null,
        )
    })
}

fn not_found(rest: &mut RestPipeline, id: u64) -> Aborted {
    rest.abort(
        AbortReason::status(StatusCode::NOT_FOUND, format!("Widget {id} not found")),
        Value::Null,
    )
}

// =============================================================================
// Actions
// =============================================================================

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn index(state: &AppState, ctx: RequestContext) -> AppResult<RestResponse> {
    let mut rest = state.mediator.begin(ctx, RESOURCE, "index", hooks())?;
    let outcome = match rest.startup() {
        Ok(()) => list(&state.widgets, &rest).await,
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn view(state: &AppState, ctx: RequestContext, id: &str) -> AppResult<RestResponse> {
    let mut rest = state
        .mediator
        .begin(ctx, RESOURCE, "view", hooks())?
        .with_model_id(id_segment(id));
    let outcome = match rest.startup() {
        Ok(()) => load(&state.widgets, &mut rest, id).await,
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn add(state: &AppState, ctx: RequestContext) -> AppResult<RestResponse> {
    let mut rest = state.mediator.begin(ctx, RESOURCE, "add", hooks())?;
    let outcome = match rest.startup() {
        Ok(()) => create(&state.widgets, &mut rest).await,
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn edit(state: &AppState, ctx: RequestContext, id: &str) -> AppResult<RestResponse> {
    let mut rest = state
        .mediator
        .begin(ctx, RESOURCE, "edit", hooks())?
        .with_model_id(id_segment(id));
    let outcome = match rest.startup() {
        Ok(()) => update(&state.widgets, &mut rest, id).await,
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn delete(state: &AppState, ctx: RequestContext, id: &str) -> AppResult<RestResponse> {
    let mut rest = state
        .mediator
        .begin(ctx, RESOURCE, "delete", hooks())?
        .with_model_id(id_segment(id));
    let outcome = match rest.startup() {
        Ok(()) => remove(state, &mut rest, id).await,
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

// =============================================================================
// Handler bodies
// =============================================================================

async fn list(widgets: &WidgetService, rest: &RestPipeline) -> Outcome<Value> {
    let scope = rest.context().query_param(SCOPE_VAR).filter(|s| !s.is_empty());
    let found = widgets.list(scope).await;
    Ok(Value::Array(found.iter().map(Widget::to_value).collect()))
}

async fn load(widgets: &WidgetService, rest: &mut RestPipeline, segment: &str) -> Outcome<Value> {
    let id = parse_id(rest, segment)?;
    match widgets.get(id).await {
        Some(widget) => Ok(widget.to_value()),
        None => Err(not_found(rest, id)),
    }
}

/// Create one widget, or several when the body is numerically indexed.
async fn create(widgets: &WidgetService, rest: &mut RestPipeline) -> Outcome<Value> {
    let Some(data) = rest.model_data().cloned() else {
        rest.add_validation_errors(["No widget data submitted"]);
        return Ok(Value::Null);
    };

    let batch = match &data {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_object) => {
            Some(map.values().cloned().collect())
        }
        _ => None,
    };

    let Some(items) = batch else {
        return match validate_widget(&data, true) {
            Ok(input) => {
                let widget = widgets.create(input).await;
                info!(id = widget.id, "Widget created");
                rest.set_new_id(widget.id);
                rest.feedback().info(format!("Widget {} created", widget.id));
                Ok(Value::Null)
            }
            Err(errors) => {
                rest.add_validation_errors(errors);
                Ok(Value::Null)
            }
        };
    };

    // Validate the whole batch before creating anything.
    let mut inputs = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match validate_widget(item, true) {
            Ok(input) => inputs.push(input),
            Err(item_errors) => {
                errors.extend(item_errors.into_iter().map(|e| format!("#{index}: {e}")))
            }
        }
    }
    if !errors.is_empty() {
        rest.add_validation_errors(errors);
        return Ok(Value::Null);
    }

    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        created.push(widgets.create(input).await);
    }
    info!(count = created.len(), "Widgets created");
    rest.feedback()
        .info(format!("{} widgets created", created.len()));
    Ok(Value::Array(created.iter().map(Widget::to_value).collect()))
}

async fn update(widgets: &WidgetService, rest: &mut RestPipeline, segment: &str) -> Outcome<Value> {
    let id = parse_id(rest, segment)?;
    if widgets.get(id).await.is_none() {
        return Err(not_found(rest, id));
    }

    let data = rest.model_data().cloned().unwrap_or(Value::Null);
    let input = match validate_widget(&data, false) {
        Ok(input) => input,
        Err(errors) => {
            rest.add_validation_errors(errors);
            return Ok(Value::Null);
        }
    };

    match widgets.update(id, input).await {
        Some(widget) => {
            rest.feedback().info(format!("Widget {id} saved"));
            Ok(widget.to_value())
        }
        None => Err(not_found(rest, id)),
    }
}

/// Deleting needs an API key. Anonymous callers are sent to the login page,
/// which the pipeline reports as an authorization failure.
async fn remove(state: &AppState, rest: &mut RestPipeline, segment: &str) -> Outcome<Value> {
    if rest.credential("apikey").is_none() {
        rest.leave_auth_message(DELETE_REQUIRES_KEY);
        return Err(rest.redirect("/login", None));
    }

    let id = parse_id(rest, segment)?;
    if !state.widgets.delete(id).await {
        return Err(not_found(rest, id));
    }
    rest.feedback().info(format!("Widget {id} deleted"));
    Ok(Value::Null)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_segment_strips_extension() {
        assert_eq!(id_segment("3.json"), "3");
        assert_eq!(id_segment("3"), "3");
        assert_eq!(id_segment("abc.xml"), "abc");
    }
}
