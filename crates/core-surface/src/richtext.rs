//! Rich-text (contenteditable-like) region.

use crate::{
    CallbackSlots, InputArea, SelectionCallback, SharedSlots, SurfaceCallback, SurfaceKind,
    TextCallback,
};
use core_page::{EventTarget, ListenerId, NodeId, Page, events};
use core_protocol::SelectionSet;
use std::cell::RefCell;
use std::rc::Rc;

/// Editable region whose content is markup rather than plain text. No
/// usable selection-offset model exists for these, so selection reporting is
/// the placeholder caret and selection application is a no-op.
pub struct RichTextSurface {
    page: Page,
    node: NodeId,
    slots: SharedSlots,
    listeners: RefCell<Vec<ListenerId>>,
    bound: RefCell<bool>,
}

impl RichTextSurface {
    pub fn new(page: Page, node: NodeId) -> Self {
        Self {
            page,
            node,
            slots: CallbackSlots::shared(),
            listeners: RefCell::new(Vec::new()),
            bound: RefCell::new(false),
        }
    }
}

impl InputArea for RichTextSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::RichText
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
            Rc::new(move |_| CallbackSlots::emit_text_changed(&slots, &page.value(node))),
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

        *self.bound.borrow_mut() = true;
        tracing::debug!(target: "surface.bind", kind = self.kind().as_str(), "bound");
    }

    fn unbind(&self) {
        for id in self.listeners.borrow_mut().drain(..) {
            self.page.remove_listener(id);
        }
        *self.bound.borrow_mut() = false;
    }

    fn focus(&self) {
        self.page.focus(self.node);
    }

    fn get_text(&self) -> String {
        self.page.value(self.node)
    }

    fn set_text(&self, text: &str) {
        // Plain value write; no synthetic event, so no echo to suppress.
        self.page.set_value(self.node, text);
    }

    fn get_selections(&self) -> SelectionSet {
        SelectionSet::placeholder()
    }

    fn set_selections(&self, _selections: &SelectionSet) {}

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

    #[test]
    fn reports_placeholder_selection_never_empty() {
        let page = Page::new("t", "example.com");
        let node = page.append_element(Page::ROOT, "div");
        page.set_attr(node, "contenteditable", "true");
        let surface = RichTextSurface::new(page, node);
        let set = surface.get_selections();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn set_text_does_not_fire_own_change() {
        let page = Page::new("t", "example.com");
        let node = page.append_element(Page::ROOT, "div");
        let surface = RichTextSurface::new(page.clone(), node);
        surface.bind();
        let fired = Rc::new(std::cell::Cell::new(false));
        let flag = fired.clone();
        surface.on_text_changed(Rc::new(move |_| flag.set(true)));
        surface.set_text("<p>remote</p>");
        assert!(!fired.get());
        assert_eq!(page.value(node), "<p>remote</p>");
    }
}
