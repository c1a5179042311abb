mod api;
mod widget;

pub use api::{HealthResponse, ReadinessResponse};
pub use widget::{Widget, WidgetInput};
