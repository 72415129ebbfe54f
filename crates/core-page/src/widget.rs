//! Script-world editor widget.
//!
//! Models the third-party code-editor libraries that live in the page's own
//! execution context: a text buffer addressed by row/column, its own
//! selection list, focus state, and library-style change/focus observers.
//! Extension-side code never holds one of these; it reaches the widget
//! through the bridge event vocabulary only.

use std::rc::Rc;

/// Row/column coordinate in the widget's own addressing model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorPos {
    pub row: usize,
    pub col: usize,
}

impl CursorPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

type Observer = Rc<dyn Fn()>;

/// In-page editor instance. See the module docs for the isolation rule.
#[derive(Default)]
pub struct EditorWidget {
    text: String,
    selections: Vec<(CursorPos, CursorPos)>,
    focused: bool,
    highlighted: bool,
    on_change: Vec<Observer>,
    on_focus: Vec<Observer>,
}

impl EditorWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(text: &str) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn value(&self) -> String {
        self.text.clone()
    }

    pub fn set_value(&mut self, text: &str) {
        self.text = text.into();
    }

    /// Length of each line, excluding separators. The separator between
    /// adjacent lines counts as one character in flat offsets.
    pub fn line_lengths(&self) -> Vec<usize> {
        self.text.split('\n').map(|line| line.chars().count()).collect()
    }

    pub fn selections(&self) -> Vec<(CursorPos, CursorPos)> {
        self.selections.clone()
    }

    pub fn set_selections(&mut self, selections: Vec<(CursorPos, CursorPos)>) {
        self.selections = selections;
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }

    /// Register a library-style change observer. Observers are notified by
    /// [`crate::Page::widget_edit`] before the buffer settles.
    pub fn on_change(&mut self, observer: Observer) {
        self.on_change.push(observer);
    }

    pub fn on_focus(&mut self, observer: Observer) {
        self.on_focus.push(observer);
    }

    pub(crate) fn change_observers(&self) -> Vec<Observer> {
        self.on_change.clone()
    }

    pub(crate) fn focus_observers(&self) -> Vec<Observer> {
        self.on_focus.clone()
    }
}
