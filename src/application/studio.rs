// Studio session - Canvas state, selection, shortcuts and auto-save
use crate::application::defaults::{default_size, seed_widget};
use crate::application::error::StudioError;
use crate::application::feedback::FailureReporter;
use crate::application::patch::{ConfigSink, PatchEngine, DEFAULT_TEXT_DEBOUNCE};
use crate::application::ports::DashboardRepository;
use crate::application::render::WidgetActions;
use crate::application::store::{WidgetStore, DEFAULT_HISTORY_LIMIT};
use crate::domain::dashboard::Dashboard;
use crate::domain::records::Snapshot;
use crate::domain::widget::{Position, Widget, WidgetPatch};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Editing,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTab {
    Dashboard,
    QueryEditor,
    ChartDesigner,
    Properties,
    Library,
}

/// Notifications for panels observing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    WidgetAdded(String),
    WidgetUpdated(String),
    WidgetRemoved(String),
    SelectionChanged(Option<String>),
    DashboardRefresh,
    Saved(String),
    SaveFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    /// Ctrl on Linux/Windows, Cmd on macOS
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyPress {
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: false,
            shift: false,
        }
    }

    pub fn ctrl(key: &str) -> Self {
        Self {
            ctrl: true,
            ..Self::plain(key)
        }
    }

    pub fn ctrl_shift(key: &str) -> Self {
        Self {
            shift: true,
            ..Self::ctrl(key)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioCommand {
    Save,
    Undo,
    Redo,
    DeleteSelection,
    Deselect,
    ToggleEdit,
}

pub fn shortcut_for(key: &KeyPress) -> Option<StudioCommand> {
    let name = key.key.to_ascii_lowercase();
    match (key.ctrl, key.shift, name.as_str()) {
        (true, false, "s") => Some(StudioCommand::Save),
        (true, false, "z") => Some(StudioCommand::Undo),
        (true, true, "z") | (true, false, "y") => Some(StudioCommand::Redo),
        (false, _, "delete") | (false, _, "backspace") => Some(StudioCommand::DeleteSelection),
        (false, _, "escape") => Some(StudioCommand::Deselect),
        (false, false, " ") | (false, false, "space") => Some(StudioCommand::ToggleEdit),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct StudioSettings {
    pub autosave_interval: Duration,
    pub text_debounce: Duration,
    pub history_limit: usize,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            text_debounce: DEFAULT_TEXT_DEBOUNCE,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

struct SessionState {
    mode: Mode,
    active_tab: ActiveTab,
    selected: Option<String>,
    dragging: bool,
    last_error: Option<String>,
    dashboard_id: Option<String>,
    title: String,
    layout: Value,
    filters: Value,
}

/// Applies routed patches to the store and announces the change.
struct StoreSink {
    store: Arc<Mutex<WidgetStore>>,
    events: broadcast::Sender<StudioEvent>,
}

impl ConfigSink for StoreSink {
    fn on_config_update(&self, widget_id: &str, patch: WidgetPatch) {
        let result = self.store.lock().update(widget_id, &patch);
        match result {
            Ok(true) => {
                let _ = self
                    .events
                    .send(StudioEvent::WidgetUpdated(widget_id.to_string()));
            }
            Ok(false) => tracing::debug!("Patch for {} changed nothing", widget_id),
            Err(e) => tracing::warn!("Dropping patch: {}", e),
        }
    }
}

pub struct StudioSession {
    store: Arc<Mutex<WidgetStore>>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<StudioEvent>,
    patches: PatchEngine,
    dashboards: Arc<dyn DashboardRepository>,
    reporter: FailureReporter,
    settings: StudioSettings,
}

impl StudioSession {
    pub fn new(
        dashboards: Arc<dyn DashboardRepository>,
        reporter: FailureReporter,
        settings: StudioSettings,
    ) -> Self {
        let store = Arc::new(Mutex::new(WidgetStore::new(settings.history_limit)));
        let (events, _) = broadcast::channel(64);
        let sink = Arc::new(StoreSink {
            store: store.clone(),
            events: events.clone(),
        });

        Self {
            store,
            state: Mutex::new(SessionState {
                mode: Mode::Editing,
                active_tab: ActiveTab::Dashboard,
                selected: None,
                dragging: false,
                last_error: None,
                dashboard_id: None,
                title: "Untitled Dashboard".to_string(),
                layout: json!({}),
                filters: json!({}),
            }),
            events,
            patches: PatchEngine::new(sink, settings.text_debounce),
            dashboards,
            reporter,
            settings,
        }
    }

    fn emit(&self, event: StudioEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.events.subscribe()
    }

    /// Load a saved dashboard into the canvas.
    pub fn open(&self, mut dashboard: Dashboard) {
        self.patches.flush_all();
        for widget in &mut dashboard.widgets {
            widget.hoist_config_data();
        }
        self.store.lock().replace_all(dashboard.widgets);
        {
            let mut state = self.state.lock();
            state.dashboard_id = Some(dashboard.id).filter(|id| !id.is_empty());
            state.title = dashboard.title;
            state.layout = dashboard.layout;
            state.filters = dashboard.filters;
            state.selected = None;
            state.last_error = None;
        }
        self.emit(StudioEvent::DashboardRefresh);
    }

    pub fn widgets(&self) -> Vec<Widget> {
        self.store.lock().widgets().to_vec()
    }

    pub fn widget(&self, id: &str) -> Option<Widget> {
        self.store.lock().get(id).cloned()
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn active_tab(&self) -> ActiveTab {
        self.state.lock().active_tab
    }

    pub fn set_tab(&self, tab: ActiveTab) {
        self.state.lock().active_tab = tab;
    }

    pub fn selected(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    pub fn is_dragging(&self) -> bool {
        self.state.lock().dragging
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn dashboard_id(&self) -> Option<String> {
        self.state.lock().dashboard_id.clone()
    }

    pub fn set_title(&self, title: &str) {
        self.state.lock().title = title.to_string();
    }

    pub fn toggle_edit(&self) -> Mode {
        let mode = {
            let mut state = self.state.lock();
            state.mode = match state.mode {
                Mode::Editing => Mode::Preview,
                Mode::Preview => Mode::Editing,
            };
            state.mode
        };
        if mode == Mode::Preview {
            self.deselect();
        }
        mode
    }

    fn insert_widget(&self, widget: Widget) -> String {
        let id = self.store.lock().add(widget);
        self.emit(StudioEvent::WidgetAdded(id.clone()));
        self.set_selection(Some(id.clone()));
        id
    }

    /// Add a widget of type `tag` below the existing ones.
    pub fn add_widget(&self, tag: &str) -> String {
        let (w, h) = default_size(tag);
        let position = self.store.lock().next_free_position(w, h);
        self.insert_widget(seed_widget(tag, position))
    }

    pub fn begin_drag(&self) {
        self.state.lock().dragging = true;
    }

    pub fn end_drag(&self) {
        self.state.lock().dragging = false;
    }

    /// Drop a library widget at a grid cell.
    pub fn drop_widget(&self, tag: &str, x: u32, y: u32) -> String {
        self.end_drag();
        let (w, h) = default_size(tag);
        self.insert_widget(seed_widget(tag, Position::new(x, y, w, h)))
    }

    fn set_selection(&self, selected: Option<String>) {
        let previous = {
            let mut state = self.state.lock();
            if state.selected == selected {
                return;
            }
            std::mem::replace(&mut state.selected, selected.clone())
        };
        if let Some(previous) = previous {
            self.patches.flush(&previous);
        }
        self.emit(StudioEvent::SelectionChanged(selected));
    }

    pub fn select(&self, id: &str) -> Result<(), StudioError> {
        if self.store.lock().get(id).is_none() {
            return Err(StudioError::UnknownWidget(id.to_string()));
        }
        self.set_selection(Some(id.to_string()));
        Ok(())
    }

    pub fn deselect(&self) {
        self.set_selection(None);
    }

    pub fn remove_widget(&self, id: &str) -> Result<(), StudioError> {
        self.patches.flush(id);
        self.store.lock().remove(id)?;
        if self.selected().as_deref() == Some(id) {
            self.set_selection(None);
        }
        self.emit(StudioEvent::WidgetRemoved(id.to_string()));
        Ok(())
    }

    pub fn remove_selected(&self) -> Result<(), StudioError> {
        let selected = self.selected().ok_or(StudioError::NothingSelected)?;
        self.remove_widget(&selected)
    }

    pub fn duplicate_widget(&self, id: &str) -> Result<String, StudioError> {
        self.patches.flush(id);
        let copy = self.store.lock().duplicate(id)?;
        self.emit(StudioEvent::WidgetAdded(copy.clone()));
        self.set_selection(Some(copy.clone()));
        Ok(copy)
    }

    /// Feed a property-form change-set through the patch engine.
    pub fn apply_form_changes(&self, widget_id: &str, changes: Map<String, Value>) {
        self.patches.apply_changes(widget_id, changes);
    }

    /// Apply every debounced text edit now.
    pub fn flush_edits(&self) {
        self.patches.flush_all();
    }

    pub fn apply_patch(&self, widget_id: &str, patch: &WidgetPatch) -> Result<bool, StudioError> {
        let changed = self.store.lock().update(widget_id, patch)?;
        if changed {
            self.emit(StudioEvent::WidgetUpdated(widget_id.to_string()));
        }
        Ok(changed)
    }

    /// Use a saved query result as the widget's data.
    pub fn bind_snapshot(&self, widget_id: &str, snapshot: &Snapshot) -> Result<(), StudioError> {
        let changed = self.store.lock().modify(widget_id, |widget| {
            widget.data = json!({ "columns": snapshot.columns, "rows": snapshot.rows });
            if let Some(config) = widget.config.as_object_mut() {
                config.insert(
                    "dataSource".to_string(),
                    json!({ "type": "snapshot", "snapshotId": snapshot.id }),
                );
            }
        })?;
        if changed {
            self.emit(StudioEvent::WidgetUpdated(widget_id.to_string()));
        }
        Ok(())
    }

    pub fn undo(&self) -> Result<(), StudioError> {
        self.patches.flush_all();
        self.store.lock().undo()?;
        self.emit(StudioEvent::DashboardRefresh);
        Ok(())
    }

    pub fn redo(&self) -> Result<(), StudioError> {
        self.patches.flush_all();
        self.store.lock().redo()?;
        self.emit(StudioEvent::DashboardRefresh);
        Ok(())
    }

    /// Current canvas as a dashboard payload.
    pub fn dashboard(&self) -> Dashboard {
        let widgets = self.widgets();
        let state = self.state.lock();
        Dashboard {
            id: state.dashboard_id.clone().unwrap_or_default(),
            title: state.title.clone(),
            widgets,
            layout: state.layout.clone(),
            filters: state.filters.clone(),
        }
    }

    fn record_failure(&self, message: String) {
        self.state.lock().last_error = Some(message.clone());
        self.emit(StudioEvent::SaveFailed(message));
    }

    pub async fn save(&self) -> Result<(), StudioError> {
        self.patches.flush_all();

        let Some(id) = self.dashboard_id() else {
            self.record_failure(StudioError::MissingDashboardId.to_string());
            return Err(StudioError::MissingDashboardId);
        };
        let dashboard = self.dashboard();
        if let Err(e) = dashboard.validate() {
            self.record_failure(e.to_string());
            return Err(e.into());
        }

        match self.dashboards.save_dashboard(&id, &dashboard).await {
            Ok(()) => {
                tracing::info!("Saved dashboard {} ({} widgets)", id, dashboard.widgets.len());
                self.state.lock().last_error = None;
                self.emit(StudioEvent::Saved(id));
                self.reporter.success("Dashboard saved");
                Ok(())
            }
            Err(e) => {
                self.record_failure(e.to_string());
                self.reporter.report("save dashboard", &e);
                Err(e.into())
            }
        }
    }

    pub async fn execute(&self, command: StudioCommand) -> Result<(), StudioError> {
        match command {
            StudioCommand::Save => self.save().await,
            StudioCommand::Undo => self.undo(),
            StudioCommand::Redo => self.redo(),
            StudioCommand::DeleteSelection => self.remove_selected(),
            StudioCommand::Deselect => {
                self.deselect();
                Ok(())
            }
            StudioCommand::ToggleEdit => {
                self.toggle_edit();
                Ok(())
            }
        }
    }

    /// Run the command bound to a key, if any.
    pub async fn handle_key(&self, key: &KeyPress) -> Result<Option<StudioCommand>, StudioError> {
        let Some(command) = shortcut_for(key) else {
            return Ok(None);
        };
        self.execute(command).await?;
        Ok(Some(command))
    }

    fn should_autosave(&self) -> bool {
        !self.store.lock().is_empty() && self.state.lock().dashboard_id.is_some()
    }

    /// Save periodically while the returned handle is alive.
    pub fn spawn_autosave(self: &Arc<Self>) -> AutosaveHandle {
        let session: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.autosave_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if !session.should_autosave() {
                    tracing::debug!("Skipping auto-save: no widgets or no dashboard id");
                    continue;
                }
                if let Err(e) = session.save().await {
                    tracing::warn!("Auto-save failed: {}", e);
                }
            }
        });

        AutosaveHandle { handle }
    }
}

impl WidgetActions for StudioSession {
    fn on_config_update(&self, widget_id: &str, patch: WidgetPatch) {
        if let Err(e) = self.apply_patch(widget_id, &patch) {
            tracing::warn!("Config update failed: {}", e);
        }
    }

    fn on_select(&self, widget_id: &str) {
        if let Err(e) = self.select(widget_id) {
            tracing::warn!("Select failed: {}", e);
        }
    }

    fn on_delete(&self, widget_id: &str) {
        if let Err(e) = self.remove_widget(widget_id) {
            tracing::warn!("Delete failed: {}", e);
        }
    }

    fn on_duplicate(&self, widget_id: &str) {
        if let Err(e) = self.duplicate_widget(widget_id) {
            tracing::warn!("Duplicate failed: {}", e);
        }
    }
}

/// Stops the auto-save task when dropped.
pub struct AutosaveHandle {
    handle: JoinHandle<()>,
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
