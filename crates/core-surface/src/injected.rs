//! Bridged script-world code editor.

use crate::{
    CallbackSlots, InputArea, SelectionCallback, SharedSlots, SurfaceCallback, SurfaceKind,
    TextCallback,
};
use core_bridge::{SelectionsDetail, TextDetail, events as bridge, shim};
use core_page::{EventTarget, ListenerId, NodeId, Page, events};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Wraps an editor library living in the page's own script world. Every
/// operation is indirect: outbound intent travels as bridge events on the
/// editor's root element, inbound state arrives the same way from the shim
/// that `bind` injects (once; injection is marker-keyed and idempotent).
pub struct InjectedEditorBridge {
    page: Page,
    node: NodeId,
    slots: SharedSlots,
    listeners: RefCell<Vec<ListenerId>>,
    bound: RefCell<bool>,
    /// Last text observed from or pushed to the editor.
    current_text: Rc<RefCell<String>>,
    /// One-shot echo guard: content we pushed ourselves and have not yet
    /// seen come back as an editor-input notification.
    pending_echo: Rc<RefCell<Option<String>>>,
}

impl InjectedEditorBridge {
    pub fn new(page: Page, node: NodeId) -> Self {
        Self {
            page,
            node,
            slots: CallbackSlots::shared(),
            listeners: RefCell::new(Vec::new()),
            bound: RefCell::new(false),
            current_text: Rc::new(RefCell::new(String::new())),
            pending_echo: Rc::new(RefCell::new(None)),
        }
    }

    fn dispatch_out(&self, name: &str, detail: Value) {
        self.page
            .dispatch(EventTarget::Node(self.node), name, detail);
    }
}

impl InputArea for InjectedEditorBridge {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::InjectedEditor
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn bind(&self) {
        if *self.bound.borrow() {
            return;
        }
        shim::inject(&self.page, self.node);

        let target = EventTarget::Node(self.node);
        let mut listeners = self.listeners.borrow_mut();

        let slots = self.slots.clone();
        let current = self.current_text.clone();
        let pending = self.pending_echo.clone();
        listeners.push(self.page.add_listener(
            target,
            bridge::EDITOR_INPUT,
            Rc::new(move |event| {
                let text = match TextDetail::from_detail(&event.detail) {
                    Ok(detail) => detail.text,
                    Err(err) => {
                        tracing::warn!(target: "surface.bridge", %err, "editor_input_dropped");
                        return;
                    }
                };
                // Content-equality echo check: a notification carrying
                // exactly what we last pushed is our own edit coming back.
                let is_echo = pending.take().is_some_and(|pushed| pushed == text);
                *current.borrow_mut() = text.clone();
                if !is_echo {
                    CallbackSlots::emit_text_changed(&slots, &text);
                }
            }),
        ));

        let slots = self.slots.clone();
        let current = self.current_text.clone();
        listeners.push(self.page.add_listener(
            target,
            bridge::EDITOR_FOCUS,
            Rc::new(move |event| {
                if let Ok(detail) = TextDetail::from_detail(&event.detail) {
                    *current.borrow_mut() = detail.text;
                }
                CallbackSlots::emit_focus(&slots);
            }),
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

        self.dispatch_out(bridge::DO_HIGHLIGHT, Value::Null);
        *self.bound.borrow_mut() = true;
        tracing::debug!(target: "surface.bind", kind = self.kind().as_str(), "bound");
    }

    fn unbind(&self) {
        for id in self.listeners.borrow_mut().drain(..) {
            self.page.remove_listener(id);
        }
        self.dispatch_out(bridge::REMOVE_HIGHLIGHT, Value::Null);
        *self.bound.borrow_mut() = false;
    }

    fn focus(&self) {
        self.dispatch_out(bridge::DO_FOCUS, Value::Null);
    }

    fn get_text(&self) -> String {
        self.current_text.borrow().clone()
    }

    fn set_text(&self, text: &str) {
        *self.current_text.borrow_mut() = text.to_string();
        *self.pending_echo.borrow_mut() = Some(text.to_string());
        self.dispatch_out(bridge::SERVER_INPUT, TextDetail::to_detail(text));
    }

    fn get_selections(&self) -> core_protocol::SelectionSet {
        // The editor's own selection is not mirrored back over the bridge;
        // report the placeholder caret.
        core_protocol::SelectionSet::placeholder()
    }

    fn set_selections(&self, selections: &core_protocol::SelectionSet) {
        let ranges: Vec<_> = selections.iter().copied().collect();
        self.dispatch_out(
            bridge::SERVER_SELECTION_CHANGED,
            SelectionsDetail::to_detail(&ranges),
        );
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
