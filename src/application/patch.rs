// Config patch engine - Routes form changes into widget sections
use crate::domain::widget::{Section, WidgetPatch};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Keys holding free text. Their edits wait for a quiet period before applying.
pub const TEXT_KEYS: [&str; 4] = ["title", "subtitle", "content", "tooltipFormatter"];

/// Keys that belong to `style` even though they arrive unprefixed.
pub const STYLE_KEYS: [&str; 14] = [
    "padding",
    "margin",
    "backgroundColor",
    "borderColor",
    "borderWidth",
    "borderRadius",
    "borderStyle",
    "boxShadow",
    "opacity",
    "fontSize",
    "fontFamily",
    "fontWeight",
    "textColor",
    "textAlign",
];

const BREAKPOINTS: [&str; 5] = ["xs", "sm", "md", "lg", "xl"];

pub const DEFAULT_TEXT_DEBOUNCE: Duration = Duration::from_millis(500);

pub fn is_text_key(key: &str) -> bool {
    TEXT_KEYS.contains(&key)
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `behaviorClickable` -> `Clickable`, but `behaviors` -> None.
fn strip_camel_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
        .filter(|rest| rest.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
}

/// Color pickers hand back `{hex}` or `{r,g,b,a}` objects; keep only the string.
fn unwrap_color(value: Value) -> Value {
    let Value::Object(map) = &value else {
        return value;
    };
    if let Some(hex) = map.get("hex").and_then(Value::as_str) {
        return Value::String(hex.to_string());
    }

    let channel = |name: &str| map.get(name).and_then(Value::as_u64);
    if let (Some(r), Some(g), Some(b)) = (channel("r"), channel("g"), channel("b")) {
        if map.len() <= 4 {
            return match map.get("a").and_then(Value::as_f64) {
                Some(a) if a < 1.0 => Value::String(format!("rgba({}, {}, {}, {})", r, g, b, a)),
                _ => Value::String(format!("rgb({}, {}, {})", r, g, b)),
            };
        }
    }
    value
}

/// Decides which widget section each changed form field belongs to.
#[derive(Debug, Clone)]
pub struct PatchRouter {
    roots: Vec<Section>,
}

impl Default for PatchRouter {
    fn default() -> Self {
        Self {
            roots: Section::ALL.to_vec(),
        }
    }
}

impl PatchRouter {
    /// Restrict which section names may be patched wholesale.
    pub fn with_roots(roots: Vec<Section>) -> Self {
        Self { roots }
    }

    pub fn route(&self, changes: &Map<String, Value>) -> WidgetPatch {
        let mut patch = WidgetPatch::new();
        for (key, value) in changes {
            self.route_key(key, value.clone(), &mut patch);
        }
        patch
    }

    fn route_key(&self, key: &str, value: Value, patch: &mut WidgetPatch) {
        if let Some(section) = Section::parse(key).filter(|s| self.roots.contains(s)) {
            tracing::debug!("Routing root key {} as a section merge", key);
            patch.merge_section(section, value);
            return;
        }

        let value = unwrap_color(value);
        if let Some(rest) = strip_camel_prefix(key, "behavior") {
            patch.set_path(Section::Behavior, &[lower_first(rest).as_str()], value);
        } else if let Some(rest) = strip_camel_prefix(key, "layout") {
            route_layout(rest, value, patch);
        } else if STYLE_KEYS.contains(&key) {
            patch.set_path(Section::Style, &[key], value);
        } else {
            patch.set_path(Section::Config, &[key], value);
        }
    }
}

/// `Breakpoints`, `BreakpointMd` and `BreakpointMdCols` nest under `layout.breakpoints`.
fn route_layout(rest: &str, value: Value, patch: &mut WidgetPatch) {
    if rest == "Breakpoints" {
        patch.set_path(Section::Layout, &["breakpoints"], value);
        return;
    }

    if let Some(after) = rest.strip_prefix("Breakpoint") {
        let name = after.get(..2).map(str::to_ascii_lowercase);
        if let Some(name) = name.filter(|n| BREAKPOINTS.contains(&n.as_str())) {
            let prop = lower_first(&after[2..]);
            if prop.is_empty() {
                patch.set_path(Section::Layout, &["breakpoints", name.as_str()], value);
            } else {
                patch.set_path(Section::Layout, &["breakpoints", name.as_str(), prop.as_str()], value);
            }
            return;
        }
    }

    patch.set_path(Section::Layout, &[lower_first(rest).as_str()], value);
}

/// Receives routed patches, usually the widget store.
pub trait ConfigSink: Send + Sync {
    fn on_config_update(&self, widget_id: &str, patch: WidgetPatch);
}

struct PendingEdit {
    patch: WidgetPatch,
    ticket: u64,
}

/// Routes form change-sets and forwards them to a [`ConfigSink`].
///
/// Text keys are held back until no further edit for the same widget has
/// arrived within the debounce window, so only the last value is applied.
/// Every other key is forwarded immediately.
pub struct PatchEngine {
    router: PatchRouter,
    sink: Arc<dyn ConfigSink>,
    debounce: Duration,
    pending: Arc<Mutex<HashMap<String, PendingEdit>>>,
    tickets: AtomicU64,
}

impl PatchEngine {
    pub fn new(sink: Arc<dyn ConfigSink>, debounce: Duration) -> Self {
        Self {
            router: PatchRouter::default(),
            sink,
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn with_router(mut self, router: PatchRouter) -> Self {
        self.router = router;
        self
    }

    pub fn router(&self) -> &PatchRouter {
        &self.router
    }

    pub fn apply_changes(&self, widget_id: &str, changes: Map<String, Value>) {
        let (text, immediate): (Map<String, Value>, Map<String, Value>) =
            changes.into_iter().partition(|(key, _)| is_text_key(key));

        if !immediate.is_empty() {
            let patch = self.router.route(&immediate);
            self.sink.on_config_update(widget_id, patch);
        }

        if !text.is_empty() {
            let patch = self.router.route(&text);
            self.schedule(widget_id, patch);
        }
    }

    fn schedule(&self, widget_id: &str, patch: WidgetPatch) {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut pending = self.pending.lock();
            let entry = pending
                .entry(widget_id.to_string())
                .or_insert_with(|| PendingEdit {
                    patch: WidgetPatch::new(),
                    ticket,
                });
            entry.patch.absorb(patch);
            entry.ticket = ticket;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime there is nothing to wait on.
            self.flush(widget_id);
            return;
        };

        let pending = self.pending.clone();
        let sink = self.sink.clone();
        let delay = self.debounce;
        let widget_id = widget_id.to_string();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let ready = {
                let mut pending = pending.lock();
                match pending.get(&widget_id) {
                    Some(edit) if edit.ticket == ticket => pending.remove(&widget_id),
                    _ => None,
                }
            };
            if let Some(edit) = ready {
                tracing::debug!("Applying debounced text edit for {}", widget_id);
                sink.on_config_update(&widget_id, edit.patch);
            }
        });
    }

    /// Apply pending text edits for a widget now. Returns whether anything was pending.
    pub fn flush(&self, widget_id: &str) -> bool {
        let edit = self.pending.lock().remove(widget_id);
        match edit {
            Some(edit) => {
                self.sink.on_config_update(widget_id, edit.patch);
                true
            }
            None => false,
        }
    }

    pub fn flush_all(&self) {
        let drained: Vec<(String, PendingEdit)> = self.pending.lock().drain().collect();
        for (widget_id, edit) in drained {
            self.sink.on_config_update(&widget_id, edit.patch);
        }
    }

    pub fn has_pending(&self, widget_id: &str) -> bool {
        self.pending.lock().contains_key(widget_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("changes must be an object"),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        patches: Mutex<Vec<(String, WidgetPatch)>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.patches.lock().len()
        }

        fn last(&self) -> WidgetPatch {
            self.patches.lock().last().unwrap().1.clone()
        }
    }

    impl ConfigSink for RecordingSink {
        fn on_config_update(&self, widget_id: &str, patch: WidgetPatch) {
            self.patches.lock().push((widget_id.to_string(), patch));
        }
    }

    #[test]
    fn test_field_routing() {
        let router = PatchRouter::default();
        let patch = router.route(&changes(json!({
            "backgroundColor": "#fff",
            "behaviorClickable": true,
            "layoutShowOnMobile": false,
            "xAxisField": "category",
        })));

        assert_eq!(patch.section(Section::Style).unwrap()["backgroundColor"], json!("#fff"));
        assert_eq!(patch.section(Section::Behavior).unwrap()["clickable"], json!(true));
        assert_eq!(patch.section(Section::Layout).unwrap()["showOnMobile"], json!(false));
        assert_eq!(patch.section(Section::Config).unwrap()["xAxisField"], json!("category"));
    }

    #[test]
    fn test_root_keys_merge_whole_sections() {
        let router = PatchRouter::default();
        let patch = router.route(&changes(json!({
            "style": {"padding": 4},
            "config": {"legend": {"show": false}},
        })));
        assert_eq!(patch.section(Section::Style).unwrap()["padding"], json!(4));
        assert_eq!(
            patch.section(Section::Config).unwrap()["legend"],
            json!({"show": false})
        );

        let restricted = PatchRouter::with_roots(vec![Section::Config]);
        let patch = restricted.route(&changes(json!({"style": {"padding": 4}})));
        assert_eq!(
            patch.section(Section::Config).unwrap()["style"],
            json!({"padding": 4})
        );
    }

    #[test]
    fn test_breakpoint_keys() {
        let router = PatchRouter::default();
        let patch = router.route(&changes(json!({
            "layoutBreakpointMdCols": 6,
            "layoutBreakpointSm": {"hidden": true},
            "layoutBreakpoints": {"lg": {"cols": 12}},
        })));
        assert_eq!(
            patch.section(Section::Layout).unwrap()["breakpoints"],
            json!({"md": {"cols": 6}, "sm": {"hidden": true}, "lg": {"cols": 12}})
        );
    }

    #[test]
    fn test_color_picker_values_are_unwrapped() {
        let router = PatchRouter::default();
        let patch = router.route(&changes(json!({
            "borderColor": {"hex": "#112233", "rgb": {"r": 17}},
            "textColor": {"r": 10, "g": 20, "b": 30, "a": 0.5},
            "seriesColor": {"r": 1, "g": 2, "b": 3},
        })));
        let style = patch.section(Section::Style).unwrap();
        assert_eq!(style["borderColor"], json!("#112233"));
        assert_eq!(style["textColor"], json!("rgba(10, 20, 30, 0.5)"));
        assert_eq!(
            patch.section(Section::Config).unwrap()["seriesColor"],
            json!("rgb(1, 2, 3)")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_edits_are_debounced() {
        let sink = Arc::new(RecordingSink::default());
        let engine = PatchEngine::new(sink.clone(), DEFAULT_TEXT_DEBOUNCE);

        engine.apply_changes("w1", changes(json!({"title": "S"})));
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.apply_changes("w1", changes(json!({"title": "Sa", "backgroundColor": "#fff"})));

        // The style change went straight through.
        assert_eq!(sink.count(), 1);
        assert!(sink.last().section(Section::Config).is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.apply_changes("w1", changes(json!({"title": "Sales"})));
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(sink.count(), 1);
        assert!(engine.has_pending("w1"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.count(), 2);
        assert_eq!(
            sink.last().section(Section::Config).unwrap()["title"],
            json!("Sales")
        );
        assert!(!engine.has_pending("w1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_applies_pending_text() {
        let sink = Arc::new(RecordingSink::default());
        let engine = PatchEngine::new(sink.clone(), DEFAULT_TEXT_DEBOUNCE);

        engine.apply_changes("w1", changes(json!({"subtitle": "Q3"})));
        engine.apply_changes("w2", changes(json!({"content": "hello"})));
        assert!(engine.flush("w1"));
        assert!(!engine.flush("w1"));
        assert_eq!(sink.count(), 1);

        engine.flush_all();
        assert_eq!(sink.count(), 2);

        // Timers from the flushed edits must not fire again.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn test_without_runtime_applies_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let engine = PatchEngine::new(sink.clone(), DEFAULT_TEXT_DEBOUNCE);
        engine.apply_changes("w1", changes(json!({"title": "Now"})));
        assert_eq!(sink.count(), 1);
    }
}
