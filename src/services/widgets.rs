use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::models::{Widget, WidgetInput};

/// In-memory widget repository backing the demo resource.
///
/// Ids are assigned from a monotonic counter and never reused.
#[derive(Clone, Default)]
pub struct WidgetService {
    widgets: Arc<RwLock<BTreeMap<u64, Widget>>>,
    next_id: Arc<AtomicU64>,
}

impl WidgetService {
    pub fn new() -> Self {
        Self::default()
    }

    /// All widgets in id order, optionally limited to one color.
    pub async fn list(&self, color: Option<&str>) -> Vec<Widget> {
        self.widgets
            .read()
            .await
            .values()
            .filter(|w| color.is_none_or(|c| w.color.as_deref() == Some(c)))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: u64) -> Option<Widget> {
        self.widgets.read().await.get(&id).cloned()
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: WidgetInput) -> Widget {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let widget = Widget::create(id, input, Utc::now());
        self.widgets.write().await.insert(id, widget.clone());
        debug!(id, "Widget created");
        widget
    }

    /// Apply an update. Returns `None` when the widget does not exist.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: u64, input: WidgetInput) -> Option<Widget> {
        let mut widgets = self.widgets.write().await;
        let widget = widgets.get_mut(&id)?;
        widget.apply(input, Utc::now());
        Some(widget.clone())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> bool {
        self.widgets.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.widgets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
