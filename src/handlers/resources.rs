//! `GET /resources.json`: handlers that expose the mediation layer.
//!
//! The listing is built by [`discover`] and kept in the shared
//! [`HandlerCache`](crate::discovery::HandlerCache). `?refresh=1` drops the
//! cached snapshot before reading.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::context::RequestContext;
use crate::discovery::{ExposureSettings, discover};
use crate::error::AppResult;
use crate::pipeline::{NoHooks, Outcome, RestPipeline, RestResponse, postdata::is_truthy};
use crate::state::AppState;

pub const RESOURCE: &str = "resources";

#[instrument(skip(state, ctx), fields(path = %ctx.path()))]
pub async fn index(state: &AppState, ctx: RequestContext) -> AppResult<RestResponse> {
    let mut rest = state
        .mediator
        .begin(ctx, RESOURCE, "index", Arc::new(NoHooks))?;
    let outcome = match rest.startup() {
        Ok(()) => listing(state, &mut rest),
        Err(aborted) => Err(aborted),
    };
    Ok(rest.finish(outcome))
}

fn listing(state: &AppState, rest: &mut RestPipeline) -> Outcome<Value> {
    let refresh = rest
        .context()
        .query_param("refresh")
        .is_some_and(|v| is_truthy(&Value::String(v.to_string())));
    if refresh {
        info!("Handler cache invalidated on request");
        state.handler_cache.invalidate();
    }

    let found = state
        .handler_cache
        .get_or_build(|| discover(&state.registry, &ExposureSettings::default()));
    match found {
        Ok(found) => {
            for note in &found.notes {
                rest.feedback().debug(note);
            }
            Ok(found.to_value())
        }
        Err(e) => Err(rest.abort(e.to_string(), Value::Null)),
    }
}
