//! Page-world shim.
//!
//! The counterpart of [`crate::events`] that runs inside the page: it holds
//! the only direct reference to the editor widget and translates between the
//! event vocabulary and library calls. Injection is keyed by a marker
//! element derived from the editor's id, so repeated detection passes over
//! the same editor install exactly one shim.

use crate::position::offset_to_position;
use crate::{
    EDITOR_INPUT_DEBOUNCE_MS, GENERATED_ID_PREFIX, SelectionsDetail, TextDetail, events,
};
use core_page::{EventTarget, NodeId, Page};
use std::rc::Rc;

/// Marker element id prefix; the editor's id is appended.
const MARKER_ID_PREFIX: &str = "textlink-injected-shim-";

/// Class carried by every marker element.
const MARKER_CLASS: &str = "textlink-injected-shim";

/// Install the shim for the editor rooted at `editor`, if not already
/// present. Returns `true` when a shim was installed, `false` when the
/// marker showed one was already there.
pub fn inject(page: &Page, editor: NodeId) -> bool {
    if !page.has_widget(editor) {
        tracing::warn!(target: "bridge.shim", "no_widget_under_editor_root");
        return false;
    }
    let editor_id = page.ensure_id(editor, GENERATED_ID_PREFIX);
    let marker_id = format!("{MARKER_ID_PREFIX}{editor_id}");
    if page.by_id(&marker_id).is_some() {
        tracing::debug!(target: "bridge.shim", editor = %editor_id, "shim_already_installed");
        return false;
    }
    let marker = page.append_element(Page::ROOT, "script");
    page.set_attr(marker, "id", &marker_id);
    page.set_attr(marker, "class", MARKER_CLASS);

    install_event_handlers(page, editor);
    install_widget_observers(page, editor);

    tracing::debug!(target: "bridge.shim", editor = %editor_id, "shim_installed");
    true
}

/// Outbound vocabulary → widget calls.
fn install_event_handlers(page: &Page, editor: NodeId) {
    let target = EventTarget::Node(editor);

    let p = page.clone();
    page.add_listener(
        target,
        events::SERVER_INPUT,
        Rc::new(move |event| match TextDetail::from_detail(&event.detail) {
            Ok(detail) => p.with_widget(editor, |w| w.set_value(&detail.text)),
            Err(err) => {
                tracing::warn!(target: "bridge.shim", %err, "server_input_detail_dropped");
            }
        }),
    );

    let p = page.clone();
    page.add_listener(
        target,
        events::SERVER_SELECTION_CHANGED,
        Rc::new(move |event| {
            let detail = match SelectionsDetail::from_detail(&event.detail) {
                Ok(detail) => detail,
                Err(err) => {
                    tracing::warn!(target: "bridge.shim", %err, "selection_detail_dropped");
                    return;
                }
            };
            let lengths = p.with_widget(editor, |w| w.line_lengths());
            let positions = detail
                .selections
                .iter()
                .map(|range| {
                    (
                        offset_to_position(&lengths, range.start),
                        offset_to_position(&lengths, range.end),
                    )
                })
                .collect();
            p.with_widget(editor, |w| w.set_selections(positions));
        }),
    );

    let p = page.clone();
    page.add_listener(
        target,
        events::DO_FOCUS,
        Rc::new(move |_| p.widget_focus(editor)),
    );

    let p = page.clone();
    page.add_listener(
        target,
        events::DO_HIGHLIGHT,
        Rc::new(move |_| p.with_widget(editor, |w| w.set_highlighted(true))),
    );

    let p = page.clone();
    page.add_listener(
        target,
        events::REMOVE_HIGHLIGHT,
        Rc::new(move |_| p.with_widget(editor, |w| w.set_highlighted(false))),
    );
}

/// Widget notifications → inbound vocabulary.
fn install_widget_observers(page: &Page, editor: NodeId) {
    // Change notifications can precede the buffer settling; defer the read,
    // then forward whatever the widget holds at that point.
    let p = page.clone();
    page.with_widget(editor, |w| {
        w.on_change(Rc::new(move || {
            let p2 = p.clone();
            p.set_timeout(
                EDITOR_INPUT_DEBOUNCE_MS,
                Rc::new(move || {
                    let text = p2.with_widget(editor, |w| w.value());
                    p2.dispatch(
                        EventTarget::Node(editor),
                        events::EDITOR_INPUT,
                        TextDetail::to_detail(&text),
                    );
                }),
            );
        }))
    });

    let p = page.clone();
    page.with_widget(editor, |w| {
        w.on_focus(Rc::new(move || {
            let text = p.with_widget(editor, |w| w.value());
            p.dispatch(
                EventTarget::Node(editor),
                events::EDITOR_FOCUS,
                TextDetail::to_detail(&text),
            );
        }))
    });
}
