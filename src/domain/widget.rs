// Widget domain model
use super::merge::deep_merge;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Position {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// First row below the widget. Clamps instead of wrapping on huge backend values.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Area,
    Pie,
    Donut,
    Scatter,
    Heatmap,
    Gauge,
    Funnel,
    Radar,
}

impl ChartKind {
    pub const ALL: [ChartKind; 10] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Area,
        ChartKind::Pie,
        ChartKind::Donut,
        ChartKind::Scatter,
        ChartKind::Heatmap,
        ChartKind::Gauge,
        ChartKind::Funnel,
        ChartKind::Radar,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
            ChartKind::Donut => "donut",
            ChartKind::Scatter => "scatter",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Gauge => "gauge",
            ChartKind::Funnel => "funnel",
            ChartKind::Radar => "radar",
        }
    }

    /// Pie-like charts show one value per category instead of axes.
    pub fn is_radial(&self) -> bool {
        matches!(
            self,
            ChartKind::Pie | ChartKind::Donut | ChartKind::Gauge | ChartKind::Funnel
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Chart(ChartKind),
    Table,
    Metric,
    Text,
    Image,
    Filter,
    Unknown,
}

impl WidgetKind {
    /// Parse a widget type tag. Accepts "bar", "bar-chart", "barChart" and so on.
    pub fn from_tag(tag: &str) -> Self {
        let lowered = tag.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        let base = lowered
            .strip_suffix("chart")
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&lowered);

        if let Some(kind) = ChartKind::ALL.iter().find(|k| k.tag() == base) {
            return WidgetKind::Chart(*kind);
        }

        match base {
            "column" => WidgetKind::Chart(ChartKind::Bar),
            "doughnut" => WidgetKind::Chart(ChartKind::Donut),
            "table" | "datatable" => WidgetKind::Table,
            "metric" | "kpi" => WidgetKind::Metric,
            "text" | "markdown" => WidgetKind::Text,
            "image" => WidgetKind::Image,
            "filter" => WidgetKind::Filter,
            _ => WidgetKind::Unknown,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WidgetKind::Chart(kind) => kind.tag(),
            WidgetKind::Table => "table",
            WidgetKind::Metric => "metric",
            WidgetKind::Text => "text",
            WidgetKind::Image => "image",
            WidgetKind::Filter => "filter",
            WidgetKind::Unknown => "unknown",
        }
    }
}

/// The sub-objects of a widget that a patch can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Config,
    Style,
    Behavior,
    Layout,
    Data,
    Position,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Config,
        Section::Style,
        Section::Behavior,
        Section::Layout,
        Section::Data,
        Section::Position,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Config => "config",
            Section::Style => "style",
            Section::Behavior => "behavior",
            Section::Layout => "layout",
            Section::Data => "data",
            Section::Position => "position",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Section::ALL.iter().copied().find(|s| s.as_str() == name)
    }
}

/// A partial update to a widget, grouped by section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetPatch {
    sections: Map<String, Value>,
}

impl WidgetPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, section: Section) -> Option<&Map<String, Value>> {
        self.sections.get(section.as_str()).and_then(Value::as_object)
    }

    /// Deep-merge `value` into one section of the patch.
    pub fn merge_section(&mut self, section: Section, value: Value) {
        let slot = self
            .sections
            .entry(section.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(slot, &value);
    }

    /// Set a nested value inside a section, creating intermediate objects.
    pub fn set_path(&mut self, section: Section, path: &[&str], value: Value) {
        let nested = path
            .iter()
            .rev()
            .fold(value, |acc, key| {
                let mut map = Map::new();
                map.insert((*key).to_string(), acc);
                Value::Object(map)
            });
        self.merge_section(section, nested);
    }

    /// Fold another patch into this one. Later values win.
    pub fn absorb(&mut self, other: WidgetPatch) {
        for (name, value) in other.sections {
            if let Some(section) = Section::parse(&name) {
                self.merge_section(section, value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, &Value)> {
        self.sections
            .iter()
            .filter_map(|(name, value)| Section::parse(name).map(|s| (s, value)))
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default = "empty_object")]
    pub style: Value,
    #[serde(default = "empty_object")]
    pub behavior: Value,
    #[serde(default = "empty_object")]
    pub layout: Value,
}

impl Widget {
    pub fn new(widget_type: String, position: Position, config: Value, data: Value) -> Self {
        let mut widget = Self {
            id: uuid::Uuid::new_v4().to_string(),
            widget_type,
            position,
            data,
            config,
            style: empty_object(),
            behavior: empty_object(),
            layout: empty_object(),
        };
        widget.hoist_config_data();
        widget
    }

    pub fn kind(&self) -> WidgetKind {
        WidgetKind::from_tag(&self.widget_type)
    }

    pub fn title(&self) -> Option<&str> {
        self.config.get("title").and_then(Value::as_str)
    }

    /// Apply a patch section by section. Returns `false` when nothing changed.
    pub fn apply_patch(&mut self, patch: &WidgetPatch) -> bool {
        let before = self.clone();

        for (section, value) in patch.iter() {
            match section {
                Section::Position => {
                    let mut position = serde_json::to_value(self.position).unwrap_or_default();
                    deep_merge(&mut position, value);
                    match serde_json::from_value::<Position>(position) {
                        Ok(p) => self.position = p,
                        Err(e) => {
                            tracing::warn!("Ignoring malformed position patch for {}: {}", self.id, e)
                        }
                    }
                }
                Section::Config => deep_merge(&mut self.config, value),
                Section::Style => deep_merge(&mut self.style, value),
                Section::Behavior => deep_merge(&mut self.behavior, value),
                Section::Layout => deep_merge(&mut self.layout, value),
                Section::Data => deep_merge(&mut self.data, value),
            }
        }

        self.hoist_config_data();
        *self != before
    }

    /// `data` is the only copy of the widget's values; a `config.data` key is moved there.
    pub fn hoist_config_data(&mut self) {
        let moved = self
            .config
            .as_object_mut()
            .and_then(|config| config.remove("data"));
        if let Some(data) = moved {
            deep_merge(&mut self.data, &data);
        }
    }

    /// Copy with a fresh id, shifted down by its own height.
    pub fn duplicated(&self) -> Self {
        let mut copy = self.clone();
        copy.id = uuid::Uuid::new_v4().to_string();
        copy.position.y = self.position.bottom();
        if let Some(title) = self.title() {
            copy.config["title"] = Value::String(format!("{} (Copy)", title));
        }
        copy
    }
}
