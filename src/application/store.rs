// In-memory widget collection with undo/redo history
use crate::application::error::StudioError;
use crate::domain::widget::{Position, Widget, WidgetPatch};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct WidgetStore {
    widgets: Vec<Widget>,
    undo: Vec<Vec<Widget>>,
    redo: Vec<Vec<Widget>>,
    history_limit: usize,
}

impl Default for WidgetStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl WidgetStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            widgets: Vec::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn get(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize, StudioError> {
        self.widgets
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| StudioError::UnknownWidget(id.to_string()))
    }

    fn checkpoint(&mut self) {
        self.undo.push(self.widgets.clone());
        if self.undo.len() > self.history_limit {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    /// Replace the collection without recording history, e.g. after loading.
    pub fn replace_all(&mut self, widgets: Vec<Widget>) {
        self.widgets = widgets;
        self.undo.clear();
        self.redo.clear();
    }

    pub fn add(&mut self, widget: Widget) -> String {
        self.checkpoint();
        let id = widget.id.clone();
        self.widgets.push(widget);
        id
    }

    pub fn remove(&mut self, id: &str) -> Result<Widget, StudioError> {
        let idx = self.index_of(id)?;
        self.checkpoint();
        Ok(self.widgets.remove(idx))
    }

    pub fn duplicate(&mut self, id: &str) -> Result<String, StudioError> {
        let idx = self.index_of(id)?;
        let mut copy = self.widgets[idx].duplicated();
        copy.position = Position {
            y: self.next_free_row(),
            ..copy.position
        };
        Ok(self.add(copy))
    }

    /// Last write wins per widget id. A patch that changes nothing records no history.
    pub fn update(&mut self, id: &str, patch: &WidgetPatch) -> Result<bool, StudioError> {
        let idx = self.index_of(id)?;
        let mut candidate = self.widgets[idx].clone();
        if !candidate.apply_patch(patch) {
            return Ok(false);
        }
        self.checkpoint();
        self.widgets[idx] = candidate;
        Ok(true)
    }

    /// Edit a widget in place. Records history only if the widget changed.
    pub fn modify<F>(&mut self, id: &str, edit: F) -> Result<bool, StudioError>
    where
        F: FnOnce(&mut Widget),
    {
        let idx = self.index_of(id)?;
        let mut candidate = self.widgets[idx].clone();
        edit(&mut candidate);
        if candidate == self.widgets[idx] {
            return Ok(false);
        }
        self.checkpoint();
        self.widgets[idx] = candidate;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo(&mut self) -> Result<(), StudioError> {
        let previous = self.undo.pop().ok_or(StudioError::HistoryEmpty)?;
        self.redo.push(std::mem::replace(&mut self.widgets, previous));
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), StudioError> {
        let next = self.redo.pop().ok_or(StudioError::HistoryEmpty)?;
        self.undo.push(std::mem::replace(&mut self.widgets, next));
        Ok(())
    }

    fn next_free_row(&self) -> u32 {
        self.widgets
            .iter()
            .map(|w| w.position.bottom())
            .max()
            .unwrap_or(0)
    }

    /// First slot below every existing widget.
    pub fn next_free_position(&self, w: u32, h: u32) -> Position {
        Position::new(0, self.next_free_row(), w, h)
    }
}
