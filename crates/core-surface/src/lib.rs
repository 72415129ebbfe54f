//! Input-surface abstraction.
//!
//! Unifies incompatible editable-widget types behind one capability
//! contract: plain text controls ([`NativeField`]), rich-text regions
//! ([`RichTextSurface`]), and script-world code editors reachable only over
//! the bridge vocabulary ([`InjectedEditorBridge`]). Callers hold an
//! `Rc<dyn InputArea>` and never branch on the concrete variant.
//!
//! Event registration is single-slot: one active callback per event kind,
//! last registration wins. This matches the one-controller-at-a-time design:
//! the detector wires a candidate, and whoever wins arbitration re-wires
//! the survivor. It is not a multi-subscriber list.

mod injected;
mod native;
mod richtext;

pub use injected::InjectedEditorBridge;
pub use native::NativeField;
pub use richtext::RichTextSurface;

use core_page::NodeId;
use core_protocol::SelectionSet;
use std::cell::RefCell;
use std::rc::Rc;

pub type TextCallback = Rc<dyn Fn(&str)>;
pub type SelectionCallback = Rc<dyn Fn(&SelectionSet)>;
pub type SurfaceCallback = Rc<dyn Fn()>;

/// Concrete variant tag, for logging and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    NativeField,
    RichText,
    InjectedEditor,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::NativeField => "native_field",
            SurfaceKind::RichText => "rich_text",
            SurfaceKind::InjectedEditor => "injected_editor",
        }
    }
}

/// The capability contract every editable surface satisfies.
///
/// `bind` is idempotent-safe (no double listener installation), `unbind` is
/// safe even when the surface was never fully bound. `set_text` must not
/// re-trigger the variant's own outbound change notification for the edit
/// it itself caused.
pub trait InputArea {
    fn kind(&self) -> SurfaceKind;
    /// Root element of the surface in its page.
    fn node(&self) -> NodeId;

    fn bind(&self);
    fn unbind(&self);
    /// Bring the surface into foreground editing focus. Indirect (an event
    /// round-trip) for bridged editors.
    fn focus(&self);

    fn get_text(&self) -> String;
    fn set_text(&self, text: &str);

    /// Current selection state. Surfaces with no native selection concept
    /// report the single placeholder caret, never an empty set.
    fn get_selections(&self) -> SelectionSet;
    /// Apply selection state; variants limited to one contiguous range
    /// collapse the set via `min_max` first.
    fn set_selections(&self, selections: &SelectionSet);

    fn on_text_changed(&self, callback: TextCallback);
    fn on_selection_changed(&self, callback: SelectionCallback);
    fn on_removed(&self, callback: SurfaceCallback);
    fn on_focus(&self, callback: SurfaceCallback);
    fn on_unload(&self, callback: SurfaceCallback);
}

/// Shared single-slot callback storage. Slot reads clone the `Rc` out and
/// drop the borrow before invoking, so callbacks may re-enter the surface.
#[derive(Default)]
pub(crate) struct CallbackSlots {
    text_changed: Option<TextCallback>,
    selection_changed: Option<SelectionCallback>,
    removed: Option<SurfaceCallback>,
    focus: Option<SurfaceCallback>,
    unload: Option<SurfaceCallback>,
}

pub(crate) type SharedSlots = Rc<RefCell<CallbackSlots>>;

impl CallbackSlots {
    pub(crate) fn shared() -> SharedSlots {
        Rc::new(RefCell::new(Self::default()))
    }

    pub(crate) fn set_text_changed(slots: &SharedSlots, cb: TextCallback) {
        slots.borrow_mut().text_changed = Some(cb);
    }

    pub(crate) fn set_selection_changed(slots: &SharedSlots, cb: SelectionCallback) {
        slots.borrow_mut().selection_changed = Some(cb);
    }

    pub(crate) fn set_removed(slots: &SharedSlots, cb: SurfaceCallback) {
        slots.borrow_mut().removed = Some(cb);
    }

    pub(crate) fn set_focus(slots: &SharedSlots, cb: SurfaceCallback) {
        slots.borrow_mut().focus = Some(cb);
    }

    pub(crate) fn set_unload(slots: &SharedSlots, cb: SurfaceCallback) {
        slots.borrow_mut().unload = Some(cb);
    }

    pub(crate) fn emit_text_changed(slots: &SharedSlots, text: &str) {
        let cb = slots.borrow().text_changed.clone();
        if let Some(cb) = cb {
            cb(text);
        }
    }

    pub(crate) fn emit_selection_changed(slots: &SharedSlots, selections: &SelectionSet) {
        let cb = slots.borrow().selection_changed.clone();
        if let Some(cb) = cb {
            cb(selections);
        }
    }

    pub(crate) fn emit_removed(slots: &SharedSlots) {
        let cb = slots.borrow().removed.clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    pub(crate) fn emit_focus(slots: &SharedSlots) {
        let cb = slots.borrow().focus.clone();
        if let Some(cb) = cb {
            cb();
        }
    }

    pub(crate) fn emit_unload(slots: &SharedSlots) {
        let cb = slots.borrow().unload.clone();
        if let Some(cb) = cb {
            cb();
        }
    }
}
