mod widgets;

pub use widgets::WidgetService;
