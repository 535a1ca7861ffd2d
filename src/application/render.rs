// Widget render dispatcher - Turns a widget into a typed view model
use crate::domain::widget::{ChartKind, Widget, WidgetKind, WidgetPatch};
use serde::Serialize;
use serde_json::{Map, Value};

/// A field that was present but had the wrong shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeIssue {
    pub field: String,
    pub expected: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesView {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ViewBody {
    Chart {
        chart: &'static str,
        title: String,
        x_field: Option<String>,
        y_field: Option<String>,
        categories: Vec<Value>,
        series: Vec<SeriesView>,
        show_legend: bool,
        legend_position: String,
    },
    Text {
        title: String,
        content: String,
    },
    Image {
        src: String,
        alt: String,
        fit: String,
    },
    Table {
        title: String,
        columns: Vec<String>,
        rows: Vec<Value>,
    },
    Metric {
        title: String,
        value: Option<f64>,
        unit: Option<String>,
        change: Option<f64>,
    },
    Filter {
        title: String,
        field: String,
        filter_type: String,
        options: Vec<Value>,
    },
    Placeholder {
        widget_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub widget_id: String,
    pub body: ViewBody,
    pub issues: Vec<ShapeIssue>,
}

/// Callbacks a rendered widget can fire.
pub trait WidgetActions {
    fn on_config_update(&self, widget_id: &str, patch: WidgetPatch);
    fn on_select(&self, widget_id: &str);
    fn on_delete(&self, widget_id: &str);
    fn on_duplicate(&self, widget_id: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetInteraction {
    Select,
    Delete,
    Duplicate,
    Edit(WidgetPatch),
}

pub fn dispatch_interaction(
    widget_id: &str,
    interaction: WidgetInteraction,
    actions: &dyn WidgetActions,
) {
    match interaction {
        WidgetInteraction::Select => actions.on_select(widget_id),
        WidgetInteraction::Delete => actions.on_delete(widget_id),
        WidgetInteraction::Duplicate => actions.on_duplicate(widget_id),
        WidgetInteraction::Edit(patch) => actions.on_config_update(widget_id, patch),
    }
}

/// Reads typed fields out of a widget and records every shape mismatch.
struct Reader<'a> {
    widget: &'a Widget,
    issues: Vec<ShapeIssue>,
}

impl<'a> Reader<'a> {
    fn new(widget: &'a Widget) -> Self {
        let mut reader = Self {
            widget,
            issues: Vec::new(),
        };
        for (name, value) in [("config", &widget.config), ("data", &widget.data)] {
            if !value.is_object() {
                reader.flag(name, "object");
            }
        }
        reader
    }

    fn flag(&mut self, field: &str, expected: &'static str) {
        self.issues.push(ShapeIssue {
            field: field.to_string(),
            expected,
        });
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&'a Value> {
        let widget: &'a Widget = self.widget;
        let source = match section {
            "data" => &widget.data,
            _ => &widget.config,
        };
        source.get(key).filter(|v| !v.is_null())
    }

    fn string(&mut self, section: &str, key: &str) -> Option<String> {
        match self.lookup(section, key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.flag(&format!("{}.{}", section, key), "string");
                None
            }
        }
    }

    fn number(&mut self, section: &str, key: &str) -> Option<f64> {
        let value = self.lookup(section, key)?;
        match value.as_f64() {
            Some(n) => Some(n),
            None => {
                self.flag(&format!("{}.{}", section, key), "number");
                None
            }
        }
    }

    fn bool(&mut self, section: &str, key: &str) -> Option<bool> {
        let value = self.lookup(section, key)?;
        match value.as_bool() {
            Some(b) => Some(b),
            None => {
                self.flag(&format!("{}.{}", section, key), "boolean");
                None
            }
        }
    }

    fn array(&mut self, section: &str, key: &str) -> Vec<Value> {
        match self.lookup(section, key) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                self.flag(&format!("{}.{}", section, key), "array");
                Vec::new()
            }
        }
    }

    /// A nested object, flagged once if it has the wrong shape.
    fn object(&mut self, section: &str, object: &str) -> Option<&'a Map<String, Value>> {
        match self.lookup(section, object)? {
            Value::Object(map) => Some(map),
            _ => {
                self.flag(&format!("{}.{}", section, object), "object");
                None
            }
        }
    }

    fn title(&mut self, fallback: &str) -> String {
        self.string("config", "title")
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Build the view model for a widget by dispatching on its type.
///
/// Malformed fields still render with defaults, but each one is listed in
/// `issues` instead of being silently dropped.
pub fn render_widget(widget: &Widget) -> WidgetView {
    let mut reader = Reader::new(widget);
    let body = match widget.kind() {
        WidgetKind::Chart(kind) => render_chart(&mut reader, kind),
        WidgetKind::Text => render_text(&mut reader),
        WidgetKind::Image => render_image(&mut reader),
        WidgetKind::Table => render_table(&mut reader),
        WidgetKind::Metric => render_metric(&mut reader),
        WidgetKind::Filter => render_filter(&mut reader),
        WidgetKind::Unknown => ViewBody::Placeholder {
            widget_type: widget.widget_type.clone(),
        },
    };

    if !reader.issues.is_empty() {
        tracing::debug!(
            "Widget {} rendered with {} shape issues",
            widget.id,
            reader.issues.len()
        );
    }

    WidgetView {
        widget_id: widget.id.clone(),
        body,
        issues: reader.issues,
    }
}

fn render_chart(reader: &mut Reader<'_>, kind: ChartKind) -> ViewBody {
    let title = reader.title("Chart");
    let x_field = reader.string("config", "xAxisField");
    let y_field = reader.string("config", "yAxisField");
    let categories = reader.array("data", "categories");

    let mut series = Vec::new();
    for (idx, item) in reader.array("data", "series").into_iter().enumerate() {
        match item {
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Series {}", idx + 1));
                let values = match map.get("data") {
                    Some(Value::Array(values)) => values.clone(),
                    _ => {
                        reader.flag(&format!("data.series[{}].data", idx), "array");
                        Vec::new()
                    }
                };
                series.push(SeriesView { name, values });
            }
            _ => reader.flag(&format!("data.series[{}]", idx), "object"),
        }
    }

    let legend = reader.object("config", "legend");
    let show_legend = legend
        .and_then(|l| l.get("show"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let legend_position = legend
        .and_then(|l| l.get("position"))
        .and_then(Value::as_str)
        .unwrap_or("top")
        .to_string();

    ViewBody::Chart {
        chart: kind.tag(),
        title,
        x_field,
        y_field,
        categories,
        series,
        show_legend,
        legend_position,
    }
}

fn render_text(reader: &mut Reader<'_>) -> ViewBody {
    ViewBody::Text {
        title: reader.title(""),
        content: reader.string("config", "content").unwrap_or_default(),
    }
}

fn render_image(reader: &mut Reader<'_>) -> ViewBody {
    ViewBody::Image {
        src: reader.string("config", "src").unwrap_or_default(),
        alt: reader.string("config", "alt").unwrap_or_default(),
        fit: reader
            .string("config", "fit")
            .unwrap_or_else(|| "contain".to_string()),
    }
}

fn render_table(reader: &mut Reader<'_>) -> ViewBody {
    let title = reader.title("Table");
    let mut columns: Vec<String> = reader
        .array("data", "columns")
        .iter()
        .filter_map(|c| c.as_str().map(str::to_string))
        .collect();
    let rows = reader.array("data", "rows");

    // Derive columns from the first row when the data carries none.
    if columns.is_empty() {
        if let Some(Value::Object(first)) = rows.first() {
            columns = first.keys().cloned().collect();
        }
    }

    ViewBody::Table {
        title,
        columns,
        rows,
    }
}

fn render_metric(reader: &mut Reader<'_>) -> ViewBody {
    let title = reader.title("Metric");
    let value = reader.number("data", "value");
    let previous = reader.number("data", "previousValue");
    let unit = reader.string("data", "unit");
    let show_trend = reader.bool("config", "showTrend").unwrap_or(true);

    let change = match (value, previous) {
        (Some(current), Some(prev)) if show_trend && prev != 0.0 => {
            Some((current - prev) / prev.abs())
        }
        _ => None,
    };

    ViewBody::Metric {
        title,
        value,
        unit,
        change,
    }
}

fn render_filter(reader: &mut Reader<'_>) -> ViewBody {
    ViewBody::Filter {
        title: reader.title("Filter"),
        field: reader.string("config", "field").unwrap_or_default(),
        filter_type: reader
            .string("config", "filterType")
            .unwrap_or_else(|| "select".to_string()),
        options: reader.array("config", "options"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::defaults::seed_widget;
    use crate::domain::widget::Position;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn test_default_widgets_render_cleanly() {
        for tag in ["bar", "pie", "table", "metric", "text", "image", "filter"] {
            let widget = seed_widget(tag, Position::default());
            let view = render_widget(&widget);
            assert!(view.issues.is_empty(), "{} had issues: {:?}", tag, view.issues);
        }
    }

    #[test]
    fn test_chart_view() {
        let widget = seed_widget("line", Position::default());
        match render_widget(&widget).body {
            ViewBody::Chart {
                chart,
                x_field,
                series,
                categories,
                ..
            } => {
                assert_eq!(chart, "line");
                assert_eq!(x_field.as_deref(), Some("category"));
                assert_eq!(series.len(), 1);
                assert_eq!(categories.len(), 7);
            }
            other => panic!("expected chart, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_placeholder() {
        let widget = seed_widget("hologram", Position::default());
        let view = render_widget(&widget);
        assert_eq!(
            view.body,
            ViewBody::Placeholder {
                widget_type: "hologram".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_fields_are_reported() {
        let mut widget = seed_widget("bar", Position::default());
        widget.data = json!({"series": "oops", "categories": ["a"]});
        widget.config["legend"] = json!(true);

        let view = render_widget(&widget);
        let fields: Vec<_> = view.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["data.series", "config.legend"]);
        match view.body {
            ViewBody::Chart {
                show_legend,
                legend_position,
                ..
            } => {
                assert!(show_legend);
                assert_eq!(legend_position, "top");
            }
            other => panic!("expected a chart, got {:?}", other),
        }

        let mut metric = seed_widget("metric", Position::default());
        metric.data = json!("125");
        let view = render_widget(&metric);
        assert_eq!(view.issues[0].field, "data");
    }

    #[test]
    fn test_metric_change() {
        let mut widget = seed_widget("metric", Position::default());
        widget.data = json!({"value": 110, "previousValue": 100, "unit": "USD"});
        match render_widget(&widget).body {
            ViewBody::Metric { change, .. } => {
                let change = change.unwrap();
                assert!((change - 0.1).abs() < 1e-9);
            }
            other => panic!("expected metric, got {:?}", other),
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl WidgetActions for Recorder {
        fn on_config_update(&self, widget_id: &str, _patch: WidgetPatch) {
            self.calls.borrow_mut().push(format!("update:{}", widget_id));
        }
        fn on_select(&self, widget_id: &str) {
            self.calls.borrow_mut().push(format!("select:{}", widget_id));
        }
        fn on_delete(&self, widget_id: &str) {
            self.calls.borrow_mut().push(format!("delete:{}", widget_id));
        }
        fn on_duplicate(&self, widget_id: &str) {
            self.calls.borrow_mut().push(format!("duplicate:{}", widget_id));
        }
    }

    #[test]
    fn test_dispatch_interaction() {
        let recorder = Recorder::default();
        dispatch_interaction("w1", WidgetInteraction::Select, &recorder);
        dispatch_interaction("w1", WidgetInteraction::Edit(WidgetPatch::new()), &recorder);
        dispatch_interaction("w1", WidgetInteraction::Duplicate, &recorder);
        dispatch_interaction("w1", WidgetInteraction::Delete, &recorder);
        assert_eq!(
            *recorder.calls.borrow(),
            vec!["select:w1", "update:w1", "duplicate:w1", "delete:w1"]
        );
    }
}
