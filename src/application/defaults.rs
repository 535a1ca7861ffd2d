// Default configuration and seed data for newly created widgets
use crate::domain::widget::{ChartKind, Position, Widget, WidgetKind};
use serde::Serialize;
use serde_json::{json, Value};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    pub tag: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub size: (u32, u32),
}

/// Palette of widgets that can be dragged onto the canvas.
pub fn library() -> Vec<LibraryEntry> {
    let mut entries: Vec<LibraryEntry> = ChartKind::ALL
        .iter()
        .map(|kind| LibraryEntry {
            tag: kind.tag(),
            label: chart_title(*kind),
            category: "charts",
            size: (6, 4),
        })
        .collect();

    entries.extend([
        LibraryEntry { tag: "table", label: "Table", category: "data", size: (8, 5) },
        LibraryEntry { tag: "metric", label: "Metric", category: "data", size: (3, 2) },
        LibraryEntry { tag: "text", label: "Text", category: "content", size: (4, 2) },
        LibraryEntry { tag: "image", label: "Image", category: "content", size: (4, 3) },
        LibraryEntry { tag: "filter", label: "Filter", category: "controls", size: (3, 1) },
    ]);
    entries
}

/// Default grid size for a widget type.
pub fn default_size(tag: &str) -> (u32, u32) {
    let kind = WidgetKind::from_tag(tag);
    library()
        .into_iter()
        .find(|entry| WidgetKind::from_tag(entry.tag) == kind)
        .map(|entry| entry.size)
        .unwrap_or((4, 3))
}

fn chart_title(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar => "Bar Chart",
        ChartKind::Line => "Line Chart",
        ChartKind::Area => "Area Chart",
        ChartKind::Pie => "Pie Chart",
        ChartKind::Donut => "Donut Chart",
        ChartKind::Scatter => "Scatter Plot",
        ChartKind::Heatmap => "Heatmap",
        ChartKind::Gauge => "Gauge",
        ChartKind::Funnel => "Funnel",
        ChartKind::Radar => "Radar Chart",
    }
}

fn chart_config(kind: ChartKind) -> Value {
    let title = chart_title(kind);
    let tooltip_trigger = if kind.is_radial() || kind == ChartKind::Scatter {
        "item"
    } else {
        "axis"
    };
    let legend_position = match kind {
        ChartKind::Pie | ChartKind::Donut | ChartKind::Funnel => "right",
        ChartKind::Gauge => "none",
        _ => "top",
    };

    let mut config = json!({
        "title": title,
        "subtitle": "",
        "chartType": kind.tag(),
        "legend": { "show": kind != ChartKind::Gauge, "position": legend_position },
        "tooltip": { "show": true, "trigger": tooltip_trigger },
        "animation": true,
        "animationDuration": 1000,
        "colors": ["#5470c6", "#91cc75", "#fac858", "#ee6666", "#73c0de"],
    });

    let specifics = match kind {
        ChartKind::Bar => json!({
            "xAxisField": "category", "yAxisField": "value",
            "orientation": "vertical", "stacked": false, "showGrid": true,
        }),
        ChartKind::Line => json!({
            "xAxisField": "category", "yAxisField": "value",
            "smooth": false, "showPoints": true, "showGrid": true,
        }),
        ChartKind::Area => json!({
            "xAxisField": "category", "yAxisField": "value",
            "smooth": true, "stacked": false, "areaOpacity": 0.4, "showGrid": true,
        }),
        ChartKind::Pie => json!({
            "labelField": "name", "valueField": "value", "showLabels": true,
        }),
        ChartKind::Donut => json!({
            "labelField": "name", "valueField": "value", "showLabels": true,
            "innerRadius": "45%", "outerRadius": "70%",
        }),
        ChartKind::Scatter => json!({
            "xAxisField": "x", "yAxisField": "y", "sizeField": null, "symbolSize": 10,
        }),
        ChartKind::Heatmap => json!({
            "xAxisField": "x", "yAxisField": "y", "valueField": "value",
            "colorRange": ["#f7fbff", "#08306b"],
        }),
        ChartKind::Gauge => json!({
            "valueField": "value", "min": 0, "max": 100, "unit": "%",
        }),
        ChartKind::Funnel => json!({
            "labelField": "name", "valueField": "value", "sort": "descending",
        }),
        ChartKind::Radar => json!({
            "indicatorField": "name", "valueField": "value", "shape": "polygon",
        }),
    };

    if let (Some(base), Value::Object(extra)) = (config.as_object_mut(), specifics) {
        base.extend(extra);
    }
    config
}

fn chart_data(kind: ChartKind) -> Value {
    match kind {
        ChartKind::Bar | ChartKind::Line | ChartKind::Area => json!({
            "categories": WEEKDAYS,
            "series": [
                { "name": "Series 1", "data": [120, 200, 150, 80, 70, 110, 130] },
            ],
        }),
        ChartKind::Pie | ChartKind::Donut | ChartKind::Funnel => json!({
            "categories": ["Direct", "Email", "Search", "Social", "Video"],
            "series": [
                { "name": "Traffic", "data": [335, 310, 234, 135, 154] },
            ],
        }),
        ChartKind::Scatter => json!({
            "categories": [],
            "series": [
                { "name": "Samples", "data": [[10, 8.04], [8, 6.95], [13, 7.58], [9, 8.81], [11, 8.33]] },
            ],
        }),
        ChartKind::Heatmap => json!({
            "categories": WEEKDAYS,
            "series": [
                { "name": "Activity", "data": [[0, 0, 5], [1, 0, 7], [2, 0, 3], [0, 1, 1], [1, 1, 9]] },
            ],
        }),
        ChartKind::Gauge => json!({
            "categories": [],
            "series": [ { "name": "Progress", "data": [68] } ],
        }),
        ChartKind::Radar => json!({
            "categories": ["Sales", "Marketing", "Development", "Support", "Admin"],
            "series": [
                { "name": "Budget", "data": [4200, 3000, 20000, 35000, 50000] },
            ],
        }),
    }
}

/// Configuration seeded into a new widget of type `tag`.
///
/// Unknown tags get a generic `{title: "Widget"}` object rather than an error.
pub fn default_config(tag: &str) -> Value {
    match WidgetKind::from_tag(tag) {
        WidgetKind::Chart(kind) => chart_config(kind),
        WidgetKind::Table => json!({
            "title": "Data Table",
            "pageSize": 10,
            "showHeader": true,
            "striped": true,
            "sortable": true,
            "columns": ["name", "value", "change"],
        }),
        WidgetKind::Metric => json!({
            "title": "Total Revenue",
            "valueField": "value",
            "format": "number",
            "prefix": "",
            "suffix": "",
            "showTrend": true,
            "precision": 0,
        }),
        WidgetKind::Text => json!({
            "title": "Text",
            "content": "Add your text here",
            "markdown": true,
        }),
        WidgetKind::Image => json!({
            "title": "Image",
            "src": "",
            "alt": "",
            "fit": "contain",
        }),
        WidgetKind::Filter => json!({
            "title": "Filter",
            "filterType": "select",
            "field": "",
            "options": [],
            "multiple": false,
        }),
        WidgetKind::Unknown => json!({ "title": "Widget" }),
    }
}

/// Seed data for a new widget of type `tag`. Unknown tags get `{}`.
pub fn default_data(tag: &str) -> Value {
    match WidgetKind::from_tag(tag) {
        WidgetKind::Chart(kind) => chart_data(kind),
        WidgetKind::Table => json!({
            "columns": ["name", "value", "change"],
            "rows": [
                { "name": "North", "value": 1200, "change": 0.12 },
                { "name": "South", "value": 860, "change": -0.04 },
                { "name": "West", "value": 1430, "change": 0.08 },
            ],
        }),
        WidgetKind::Metric => json!({
            "value": 125430,
            "previousValue": 118200,
            "unit": "USD",
        }),
        WidgetKind::Text | WidgetKind::Image | WidgetKind::Filter | WidgetKind::Unknown => {
            json!({})
        }
    }
}

/// Build a widget of type `tag` at `position` with its defaults.
pub fn seed_widget(tag: &str, position: Position) -> Widget {
    Widget::new(
        tag.to_string(),
        position,
        default_config(tag),
        default_data(tag),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_chart_has_title_axes_and_series() {
        for kind in ChartKind::ALL {
            let config = default_config(kind.tag());
            let data = default_data(kind.tag());

            assert!(config["title"].is_string(), "{:?} has no title", kind);
            assert!(config["legend"]["position"].is_string());
            assert!(config["tooltip"]["trigger"].is_string());
            assert_eq!(config["animation"], json!(true));
            assert!(
                data["series"].as_array().is_some_and(|s| !s.is_empty()),
                "{:?} has no series",
                kind
            );
        }
    }

    #[test]
    fn test_non_chart_defaults() {
        assert!(default_data("table")["rows"].is_array());
        assert!(default_data("metric")["value"].is_number());
        assert_eq!(default_config("text")["content"], json!("Add your text here"));
        assert_eq!(default_config("filter")["filterType"], json!("select"));
        for tag in ["table", "metric", "text", "image", "filter"] {
            assert!(default_config(tag)["title"].is_string());
            assert!(default_data(tag).is_object());
        }
    }

    #[test]
    fn test_unknown_type_falls_back() {
        assert_eq!(default_config("hologram"), json!({"title": "Widget"}));
        assert_eq!(default_data("hologram"), json!({}));
        assert_eq!(default_size("hologram"), (4, 3));
    }

    #[test]
    fn test_pie_uses_item_tooltip() {
        assert_eq!(default_config("pie")["tooltip"]["trigger"], json!("item"));
        assert_eq!(default_config("bar")["tooltip"]["trigger"], json!("axis"));
        assert_eq!(default_config("bar-chart"), default_config("bar"));
    }

    #[test]
    fn test_seed_widget() {
        let widget = seed_widget("metric", Position::new(0, 0, 3, 2));
        assert_eq!(widget.widget_type, "metric");
        assert_eq!(widget.data["unit"], json!("USD"));
        assert!(widget.config.get("data").is_none());
        assert_eq!(default_size("metric"), (3, 2));
    }
}
