//! HTTP handlers.
//!
//! Mediated resources are addressed as `/{resource}.{ext}` and
//! `/{resource}/{id}.{ext}`. The functions here pick the resource from the
//! first path segment and call its action; each action opens its own
//! pipeline.

mod health;
pub mod resources;
pub mod widgets;

pub use health::{health_check, readiness_check};

use axum::extract::{Path, State};
use tracing::debug;

use crate::context::RestRequest;
use crate::error::{AppError, AppResult};
use crate::pipeline::RestResponse;
use crate::state::AppState;

/// Resources served through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Widgets,
    Resources,
}

impl Resource {
    /// Resolve a path segment, ignoring any content extension.
    pub fn from_segment(segment: &str) -> AppResult<Self> {
        let name = segment.split_once('.').map_or(segment, |(name, _)| name);
        match name {
            widgets::RESOURCE => Ok(Self::Widgets),
            resources::RESOURCE => Ok(Self::Resources),
            other => {
                debug!(resource = other, "Unknown resource requested");
                Err(AppError::NotFound(format!("Unknown resource '{other}'")))
            }
        }
    }
}

fn no_action(segment: &str, action: &str) -> AppError {
    AppError::NotFound(format!("No '{action}' action on '{segment}'"))
}

/// `GET /{resource}`
pub async fn index(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    RestRequest(ctx): RestRequest,
) -> AppResult<RestResponse> {
    match Resource::from_segment(&segment)? {
        Resource::Widgets => widgets::index(&state, ctx).await,
        Resource::Resources => resources::index(&state, ctx).await,
    }
}

/// `POST /{resource}`
pub async fn add(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    RestRequest(ctx): RestRequest,
) -> AppResult<RestResponse> {
    match Resource::from_segment(&segment)? {
        Resource::Widgets => widgets::add(&state, ctx).await,
        Resource::Resources => Err(no_action(&segment, "add")),
    }
}

/// `GET /{resource}/{id}`
pub async fn view(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    RestRequest(ctx): RestRequest,
) -> AppResult<RestResponse> {
    match Resource::from_segment(&segment)? {
        Resource::Widgets => widgets::view(&state, ctx, &id).await,
        Resource::Resources => Err(no_action(&segment, "view")),
    }
}

/// `PUT /{resource}/{id}`
pub async fn edit(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    RestRequest(ctx): RestRequest,
) -> AppResult<RestResponse> {
    match Resource::from_segment(&segment)? {
        Resource::Widgets => widgets::edit(&state, ctx, &id).await,
        Resource::Resources => Err(no_action(&segment, "edit")),
    }
}

/// `DELETE /{resource}/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    RestRequest(ctx): RestRequest,
) -> AppResult<RestResponse> {
    match Resource::from_segment(&segment)? {
        Resource::Widgets => widgets::delete(&state, ctx, &id).await,
        Resource::Resources => Err(no_action(&segment, "delete")),
    }
}
