//! Plain editable text control.

use crate::{
    CallbackSlots, InputArea, SelectionCallback, SharedSlots, SurfaceCallback, SurfaceKind,
    TextCallback,
};
use core_page::{EventTarget, ListenerId, NodeId, Page, events};
use core_protocol::{SelectionRange, SelectionSet};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

/// Detail key tagging input events this surface dispatched itself. The
/// input listener filters on it so a remote edit applied via `set_text` is
/// not re-reported as a local change.
pub const SYNTHETIC_INPUT_TAG: &str = "generated-by-textlink";

/// Connected affordance applied to the element while bound.
const HIGHLIGHT_STYLE: &str =
    "transition: box-shadow 1s cubic-bezier(.25,2,.5,1); box-shadow: #00ADEE 0 0 20px 5px inset";

/// A `textarea`-like control: value and selection live on the element
/// itself, edits arrive as input events.
pub struct NativeField {
    page: Page,
    node: NodeId,
    slots: SharedSlots,
    listeners: RefCell<Vec<ListenerId>>,
    bound: RefCell<bool>,
}

impl NativeField {
    pub fn new(page: Page, node: NodeId) -> Self {
        Self {
            page,
            node,
            slots: CallbackSlots::shared(),
            listeners: RefCell::new(Vec::new()),
            bound: RefCell::new(false),
        }
    }

    fn is_synthetic(detail: &Value) -> bool {
        detail
            .get(SYNTHETIC_INPUT_TAG)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl InputArea for NativeField {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::NativeField
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn bind(&self) {
        if *self.bound.borrow() {
            return;
        }
        let target = EventTarget::Node(self.node);
        let mut listeners = self.listeners.borrow_mut();

        let (page, node, slots) = (self.page.clone(), self.node, self.slots.clone());
        listeners.push(self.page.add_listener(
            target,
            events::INPUT,
            Rc::new(move |event| {
                if Self::is_synthetic(&event.detail) {
                    return;
                }
                CallbackSlots::emit_text_changed(&slots, &page.value(node));
            }),
        ));

        let (page, node, slots) = (self.page.clone(), self.node, self.slots.clone());
        listeners.push(self.page.add_listener(
            target,
            events::SELECT,
            Rc::new(move |_| {
                let (start, end) = page.selection(node);
                let set = SelectionSet::single(SelectionRange::new(start, end));
                CallbackSlots::emit_selection_changed(&slots, &set);
            }),
        ));

        let slots = self.slots.clone();
        listeners.push(self.page.add_listener(
            target,
            events::FOCUS,
            Rc::new(move |_| CallbackSlots::emit_focus(&slots)),
        ));

        let slots = self.slots.clone();
        listeners.push(self.page.add_listener(
            target,
            events::REMOVED,
            Rc::new(move |_| CallbackSlots::emit_removed(&slots)),
        ));

        let slots = self.slots.clone();
        listeners.push(self.page.add_listener(
            EventTarget::Document,
            events::BEFORE_UNLOAD,
            Rc::new(move |_| CallbackSlots::emit_unload(&slots)),
        ));

        self.page.set_attr(self.node, "style", HIGHLIGHT_STYLE);
        *self.bound.borrow_mut() = true;
        tracing::debug!(target: "surface.bind", kind = self.kind().as_str(), "bound");
    }

    fn unbind(&self) {
        for id in self.listeners.borrow_mut().drain(..) {
            self.page.remove_listener(id);
        }
        self.page.remove_attr(self.node, "style");
        *self.bound.borrow_mut() = false;
    }

    fn focus(&self) {
        self.page.focus(self.node);
    }

    fn get_text(&self) -> String {
        self.page.value(self.node)
    }

    fn set_text(&self, text: &str) {
        self.page.set_value(self.node, text);
        // Tagged so our own input listener ignores it; host pages that watch
        // the element (live previews) still see an input event.
        self.page.dispatch(
            EventTarget::Node(self.node),
            events::INPUT,
            json!({ SYNTHETIC_INPUT_TAG: true }),
        );
    }

    fn get_selections(&self) -> SelectionSet {
        let (start, end) = self.page.selection(self.node);
        SelectionSet::single(SelectionRange::new(start, end))
    }

    fn set_selections(&self, selections: &SelectionSet) {
        // One contiguous selection on a native control.
        let collapsed = selections.min_max();
        self.page
            .set_selection(self.node, collapsed.start, collapsed.end);
    }

    fn on_text_changed(&self, callback: TextCallback) {
        CallbackSlots::set_text_changed(&self.slots, callback);
    }

    fn on_selection_changed(&self, callback: SelectionCallback) {
        CallbackSlots::set_selection_changed(&self.slots, callback);
    }

    fn on_removed(&self, callback: SurfaceCallback) {
        CallbackSlots::set_removed(&self.slots, callback);
    }

    fn on_focus(&self, callback: SurfaceCallback) {
        CallbackSlots::set_focus(&self.slots, callback);
    }

    fn on_unload(&self, callback: SurfaceCallback) {
        CallbackSlots::set_unload(&self.slots, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn field() -> (Page, NodeId, Rc<NativeField>) {
        let page = Page::new("t", "example.com");
        let node = page.append_element(Page::ROOT, "textarea");
        let surface = Rc::new(NativeField::new(page.clone(), node));
        (page, node, surface)
    }

    #[test]
    fn user_input_reaches_text_changed_callback() {
        let (page, node, surface) = field();
        surface.bind();
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        surface.on_text_changed(Rc::new(move |text| *sink.borrow_mut() = text.to_string()));
        page.user_input(node, "typed");
        assert_eq!(&*seen.borrow(), "typed");
    }

    #[test]
    fn set_text_does_not_echo_into_own_callback() {
        let (page, node, surface) = field();
        surface.bind();
        let fired = Rc::new(Cell::new(0u32));
        let counter = fired.clone();
        surface.on_text_changed(Rc::new(move |_| counter.set(counter.get() + 1)));
        surface.set_text("remote edit");
        assert_eq!(fired.get(), 0, "self-generated input must be filtered");
        assert_eq!(page.value(node), "remote edit");
        // A real user edit afterwards still fires.
        page.user_input(node, "user edit");
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn bind_is_idempotent() {
        let (page, node, surface) = field();
        surface.bind();
        surface.bind();
        let fired = Rc::new(Cell::new(0u32));
        let counter = fired.clone();
        surface.on_text_changed(Rc::new(move |_| counter.set(counter.get() + 1)));
        page.user_input(node, "x");
        assert_eq!(fired.get(), 1, "double bind must not double-deliver");
    }

    #[test]
    fn unbind_without_bind_is_safe_and_detaches() {
        let (page, node, surface) = field();
        surface.unbind(); // never bound

        surface.bind();
        assert!(page.attr(node, "style").is_some());
        let fired = Rc::new(Cell::new(0u32));
        let counter = fired.clone();
        surface.on_text_changed(Rc::new(move |_| counter.set(counter.get() + 1)));
        surface.unbind();
        assert!(page.attr(node, "style").is_none());
        page.user_input(node, "x");
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn selections_collapse_to_min_max_on_apply() {
        let (page, node, surface) = field();
        surface.bind();
        let set: SelectionSet =
            vec![SelectionRange::new(8, 9), SelectionRange::new(2, 4)].into();
        surface.set_selections(&set);
        assert_eq!(page.selection(node), (2, 9));
    }

    #[test]
    fn select_event_reports_selection_change() {
        let (page, node, surface) = field();
        surface.bind();
        let seen = Rc::new(RefCell::new(SelectionSet::new()));
        let sink = seen.clone();
        surface.on_selection_changed(Rc::new(move |set| *sink.borrow_mut() = set.clone()));
        page.user_select(node, 1, 4);
        assert_eq!(seen.borrow().min_max(), SelectionRange::new(1, 4));
    }

    #[test]
    fn removal_and_unload_reach_their_slots() {
        let (page, node, surface) = field();
        surface.bind();
        let removed = Rc::new(Cell::new(false));
        let unloaded = Rc::new(Cell::new(false));
        let (r, u) = (removed.clone(), unloaded.clone());
        surface.on_removed(Rc::new(move || r.set(true)));
        surface.on_unload(Rc::new(move || u.set(true)));
        page.remove(node);
        page.unload();
        assert!(removed.get());
        assert!(unloaded.get());
    }

    #[test]
    fn last_registration_wins() {
        let (page, node, surface) = field();
        surface.bind();
        let first = Rc::new(Cell::new(0u32));
        let second = Rc::new(Cell::new(0u32));
        let (f, s) = (first.clone(), second.clone());
        surface.on_text_changed(Rc::new(move |_| f.set(f.get() + 1)));
        surface.on_text_changed(Rc::new(move |_| s.set(s.get() + 1)));
        page.user_input(node, "x");
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }
}
