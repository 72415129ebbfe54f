//! Headless page model.
//!
//! This crate is the stand-in for the browser DOM that the real UI
//! collaborators provide: an element tree with focus tracking, per-target
//! event listeners with JSON `detail` payloads, a deterministic timer queue,
//! nested frames (optionally inaccessible, like cross-origin content), and
//! script-world editor widgets that are reachable only from inside the page.
//!
//! The model is single-threaded and callback-driven. Listeners are invoked
//! with no page borrow held (the dispatch path clones the listener list out
//! first), so a listener may freely call back into the page, including
//! dispatching further events.

pub mod widget;

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

pub use widget::{CursorPos, EditorWidget};

/// Event names shared with the surface layer. Bridge-specific event names
/// live in `core-bridge`.
pub mod events {
    /// User (or synthetic) edit of an editable element's value.
    pub const INPUT: &str = "input";
    /// User changed an editable element's selection.
    pub const SELECT: &str = "select";
    /// Element gained editing focus.
    pub const FOCUS: &str = "focus";
    /// Element was detached from the tree.
    pub const REMOVED: &str = "removed";
    /// Document is about to go away (navigation, tab close).
    pub const BEFORE_UNLOAD: &str = "beforeunload";
}

/// Handle to one element of a [`Page`]. Only valid for the page that
/// created it; indexing with a foreign handle is a caller bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where a listener is attached and events are delivered. There is no
/// bubbling: an event dispatched on a node is seen only by that node's
/// listeners, document-level events only by document listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Node(NodeId),
    Document,
}

/// A delivered event: name, target, and a JSON detail payload (mirroring
/// CustomEvent `detail` objects).
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub name: String,
    pub target: EventTarget,
    pub detail: Value,
}

/// Opaque handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Debug, Error)]
pub enum PageError {
    /// The frame exists but its content document cannot be reached
    /// (models cross-origin frames).
    #[error("frame content is not accessible")]
    FrameAccess,
    #[error("element is not a frame")]
    NotAFrame,
}

type Listener = Rc<dyn Fn(&PageEvent)>;

struct Element {
    tag: String,
    attrs: HashMap<String, String>,
    value: String,
    selection: (usize, usize),
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    detached: bool,
    frame: Option<Frame>,
}

struct Frame {
    page: Page,
    accessible: bool,
}

struct Timer {
    due_ms: u64,
    seq: u64,
    callback: Rc<dyn Fn()>,
}

struct PageInner {
    title: String,
    host: String,
    nodes: Vec<Element>,
    focused: Option<NodeId>,
    listeners: HashMap<(EventTarget, String), Vec<(ListenerId, Listener)>>,
    next_listener: u64,
    timers: Vec<Timer>,
    timer_seq: u64,
    now_ms: u64,
    generated_ids: u64,
    widgets: HashMap<NodeId, EditorWidget>,
}

/// A page document. Cheap to clone; clones share the same tree.
#[derive(Clone)]
pub struct Page {
    inner: Rc<RefCell<PageInner>>,
}

impl Page {
    /// Root element id (the body). Always valid.
    pub const ROOT: NodeId = NodeId(0);

    pub fn new(title: &str, host: &str) -> Self {
        let body = Element {
            tag: "body".into(),
            attrs: HashMap::new(),
            value: String::new(),
            selection: (0, 0),
            children: Vec::new(),
            parent: None,
            detached: false,
            frame: None,
        };
        Self {
            inner: Rc::new(RefCell::new(PageInner {
                title: title.into(),
                host: host.into(),
                nodes: vec![body],
                focused: None,
                listeners: HashMap::new(),
                next_listener: 0,
                timers: Vec::new(),
                timer_seq: 0,
                now_ms: 0,
                generated_ids: 0,
                widgets: HashMap::new(),
            })),
        }
    }

    pub fn title(&self) -> String {
        self.inner.borrow().title.clone()
    }

    /// Host component of the page's location.
    pub fn host(&self) -> String {
        self.inner.borrow().host.clone()
    }

    // ---------------------------------------------------------------------
    // Tree construction and queries
    // ---------------------------------------------------------------------

    pub fn append_element(&self, parent: NodeId, tag: &str) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        let id = NodeId(inner.nodes.len());
        inner.nodes.push(Element {
            tag: tag.into(),
            attrs: HashMap::new(),
            value: String::new(),
            selection: (0, 0),
            children: Vec::new(),
            parent: Some(parent),
            detached: false,
            frame: None,
        });
        inner.nodes[parent.0].children.push(id);
        id
    }

    /// Append a frame element whose content document is `child`.
    /// Inaccessible frames model cross-origin content: the element is
    /// visible in the tree but [`Page::frame_page`] fails.
    pub fn append_frame(&self, parent: NodeId, child: Page, accessible: bool) -> NodeId {
        let id = self.append_element(parent, "iframe");
        self.inner.borrow_mut().nodes[id.0].frame = Some(Frame {
            page: child,
            accessible,
        });
        id
    }

    pub fn tag(&self, node: NodeId) -> String {
        self.inner.borrow().nodes[node.0].tag.clone()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.borrow().nodes[node.0].parent
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner.borrow().nodes[node.0].attrs.get(name).cloned()
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        self.inner.borrow_mut().nodes[node.0]
            .attrs
            .insert(name.into(), value.into());
    }

    pub fn remove_attr(&self, node: NodeId, name: &str) {
        self.inner.borrow_mut().nodes[node.0].attrs.remove(name);
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.inner.borrow().nodes[node.0]
            .attrs
            .get("class")
            .is_some_and(|c| c.split_whitespace().any(|part| part == class))
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        let mut inner = self.inner.borrow_mut();
        let attrs = &mut inner.nodes[node.0].attrs;
        let current = attrs.get("class").cloned().unwrap_or_default();
        if current.split_whitespace().any(|part| part == class) {
            return;
        }
        let joined = if current.is_empty() {
            class.to_string()
        } else {
            format!("{current} {class}")
        };
        attrs.insert("class".into(), joined);
    }

    /// Look an element up by its `id` attribute.
    pub fn by_id(&self, dom_id: &str) -> Option<NodeId> {
        self.attached_in_order()
            .into_iter()
            .find(|&n| self.attr(n, "id").as_deref() == Some(dom_id))
    }

    /// Return the element's `id` attribute, generating and assigning
    /// `<prefix><n>` when it has none. Generated ids are stable for the
    /// lifetime of the page.
    pub fn ensure_id(&self, node: NodeId, prefix: &str) -> String {
        if let Some(existing) = self.attr(node, "id") {
            return existing;
        }
        let n = {
            let mut inner = self.inner.borrow_mut();
            inner.generated_ids += 1;
            inner.generated_ids
        };
        let generated = format!("{prefix}{n}");
        self.set_attr(node, "id", &generated);
        generated
    }

    pub fn query_tag(&self, tag: &str) -> Vec<NodeId> {
        self.attached_in_order()
            .into_iter()
            .filter(|&n| self.inner.borrow().nodes[n.0].tag == tag)
            .collect()
    }

    pub fn query_class(&self, class: &str) -> Vec<NodeId> {
        self.attached_in_order()
            .into_iter()
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    pub fn query_attr(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.attached_in_order()
            .into_iter()
            .filter(|&n| self.attr(n, name).as_deref() == Some(value))
            .collect()
    }

    /// Frame elements in document order.
    pub fn frames(&self) -> Vec<NodeId> {
        self.query_tag("iframe")
    }

    /// Content document of a frame element.
    pub fn frame_page(&self, node: NodeId) -> Result<Page, PageError> {
        let inner = self.inner.borrow();
        let frame = inner.nodes[node.0].frame.as_ref().ok_or(PageError::NotAFrame)?;
        if !frame.accessible {
            return Err(PageError::FrameAccess);
        }
        Ok(frame.page.clone())
    }

    /// Detach an element (and its subtree) from the tree. Dispatches
    /// [`events::REMOVED`] on every detached node, subtree root first.
    pub fn remove(&self, node: NodeId) {
        let subtree = {
            let mut inner = self.inner.borrow_mut();
            if inner.nodes[node.0].detached {
                return;
            }
            if let Some(parent) = inner.nodes[node.0].parent {
                inner.nodes[parent.0].children.retain(|&c| c != node);
            }
            let mut subtree = Vec::new();
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                inner.nodes[n.0].detached = true;
                subtree.push(n);
                stack.extend(inner.nodes[n.0].children.iter().copied());
            }
            if inner.focused.is_some_and(|f| subtree.contains(&f)) {
                inner.focused = None;
            }
            subtree
        };
        for n in subtree {
            self.dispatch(EventTarget::Node(n), events::REMOVED, Value::Null);
        }
    }

    fn attached_in_order(&self) -> Vec<NodeId> {
        let inner = self.inner.borrow();
        let mut out = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(n) = stack.pop() {
            if !inner.nodes[n.0].detached {
                out.push(n);
                // Reverse so document order is preserved by the stack pop.
                stack.extend(inner.nodes[n.0].children.iter().rev().copied());
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    // Editable state and focus
    // ---------------------------------------------------------------------

    pub fn value(&self, node: NodeId) -> String {
        self.inner.borrow().nodes[node.0].value.clone()
    }

    /// Programmatic value write. Does not dispatch any event; callers that
    /// need change observers to fire dispatch their own (tagged) event.
    pub fn set_value(&self, node: NodeId, value: &str) {
        self.inner.borrow_mut().nodes[node.0].value = value.into();
    }

    /// Simulate a user edit: write the value, then dispatch an untagged
    /// [`events::INPUT`] on the element.
    pub fn user_input(&self, node: NodeId, value: &str) {
        self.set_value(node, value);
        self.dispatch(EventTarget::Node(node), events::INPUT, Value::Null);
    }

    pub fn selection(&self, node: NodeId) -> (usize, usize) {
        self.inner.borrow().nodes[node.0].selection
    }

    pub fn set_selection(&self, node: NodeId, start: usize, end: usize) {
        self.inner.borrow_mut().nodes[node.0].selection = (start, end);
    }

    /// Simulate a user selection change: write the range, then dispatch
    /// [`events::SELECT`] on the element.
    pub fn user_select(&self, node: NodeId, start: usize, end: usize) {
        self.set_selection(node, start, end);
        self.dispatch(EventTarget::Node(node), events::SELECT, Value::Null);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.inner.borrow().focused
    }

    /// Give the element editing focus and dispatch [`events::FOCUS`] on it.
    pub fn focus(&self, node: NodeId) {
        self.inner.borrow_mut().focused = Some(node);
        self.dispatch(EventTarget::Node(node), events::FOCUS, Value::Null);
    }

    pub fn blur(&self, node: NodeId) {
        let mut inner = self.inner.borrow_mut();
        if inner.focused == Some(node) {
            inner.focused = None;
        }
    }

    /// Dispatch [`events::BEFORE_UNLOAD`] at the document level.
    pub fn unload(&self) {
        self.dispatch(EventTarget::Document, events::BEFORE_UNLOAD, Value::Null);
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn add_listener(
        &self,
        target: EventTarget,
        name: &str,
        listener: Rc<dyn Fn(&PageEvent)>,
    ) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_listener += 1;
        let id = ListenerId(inner.next_listener);
        inner
            .listeners
            .entry((target, name.to_string()))
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        let mut inner = self.inner.borrow_mut();
        for list in inner.listeners.values_mut() {
            list.retain(|(lid, _)| *lid != id);
        }
    }

    /// Deliver an event to the target's listeners for `name`. Listener
    /// closures run with no borrow of the page held.
    pub fn dispatch(&self, target: EventTarget, name: &str, detail: Value) {
        let listeners: Vec<Listener> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .get(&(target, name.to_string()))
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };
        if listeners.is_empty() {
            return;
        }
        tracing::trace!(target: "page.event", name, count = listeners.len(), "dispatch");
        let event = PageEvent {
            name: name.to_string(),
            target,
            detail,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Schedule `callback` to run once `delay_ms` of page time has elapsed.
    pub fn set_timeout(&self, delay_ms: u64, callback: Rc<dyn Fn()>) {
        let mut inner = self.inner.borrow_mut();
        inner.timer_seq += 1;
        let timer = Timer {
            due_ms: inner.now_ms + delay_ms,
            seq: inner.timer_seq,
            callback,
        };
        inner.timers.push(timer);
    }

    /// Advance the page clock, running every timer that falls due, in
    /// schedule order. Callbacks may schedule further timers; those run in
    /// the same call if they fall inside the advanced window.
    pub fn advance(&self, ms: u64) {
        let deadline = {
            let mut inner = self.inner.borrow_mut();
            inner.now_ms += ms;
            inner.now_ms
        };
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let due: Option<usize> = inner
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_ms <= deadline)
                    .min_by_key(|(_, t)| (t.due_ms, t.seq))
                    .map(|(i, _)| i);
                due.map(|i| inner.timers.remove(i).callback)
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    // ---------------------------------------------------------------------
    // Script-world editor widgets
    // ---------------------------------------------------------------------

    /// Attach a script-world editor widget to an element. The widget is
    /// reachable only through the page (the isolation boundary); extension
    /// code is expected to talk to it via events, not via these accessors.
    pub fn attach_widget(&self, node: NodeId, widget: EditorWidget) {
        self.inner.borrow_mut().widgets.insert(node, widget);
    }

    pub fn with_widget<R>(&self, node: NodeId, f: impl FnOnce(&mut EditorWidget) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        let widget = inner
            .widgets
            .get_mut(&node)
            .expect("no editor widget attached to element");
        f(widget)
    }

    pub fn has_widget(&self, node: NodeId) -> bool {
        self.inner.borrow().widgets.contains_key(&node)
    }

    /// Simulate a user edit inside the widget. Mirrors the libraries this
    /// models: change observers are notified *before* the widget's buffer
    /// settles, so an observer that reads the value synchronously sees the
    /// previous text. Readers must defer (the bridge shim does).
    pub fn widget_edit(&self, node: NodeId, text: &str) {
        let observers = self.with_widget(node, |w| w.change_observers());
        for observer in observers {
            observer();
        }
        self.with_widget(node, |w| w.set_value(text));
    }

    /// Simulate the widget gaining focus; notifies its focus observers.
    pub fn widget_focus(&self, node: NodeId) {
        let observers = self.with_widget(node, |w| {
            w.set_focused(true);
            w.focus_observers()
        });
        for observer in observers {
            observer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn queries_follow_document_order() {
        let page = Page::new("t", "example.com");
        let form = page.append_element(Page::ROOT, "form");
        let a = page.append_element(form, "textarea");
        let b = page.append_element(Page::ROOT, "textarea");
        assert_eq!(page.query_tag("textarea"), vec![a, b]);
    }

    #[test]
    fn removed_elements_leave_queries_and_fire_removed() {
        let page = Page::new("t", "example.com");
        let form = page.append_element(Page::ROOT, "form");
        let area = page.append_element(form, "textarea");
        let fired = Rc::new(Cell::new(false));
        let seen = fired.clone();
        page.add_listener(
            EventTarget::Node(area),
            events::REMOVED,
            Rc::new(move |_| seen.set(true)),
        );
        page.remove(form);
        assert!(fired.get(), "removed fires on descendants");
        assert!(page.query_tag("textarea").is_empty());
    }

    #[test]
    fn dispatch_allows_reentrant_page_calls() {
        let page = Page::new("t", "example.com");
        let area = page.append_element(Page::ROOT, "textarea");
        let reentrant = page.clone();
        let observed = Rc::new(RefCell::new(String::new()));
        let sink = observed.clone();
        page.add_listener(
            EventTarget::Node(area),
            events::INPUT,
            Rc::new(move |_| {
                // Reads and writes back into the page from inside dispatch.
                let v = reentrant.value(area);
                reentrant.set_selection(area, 0, v.len());
                *sink.borrow_mut() = v;
            }),
        );
        page.user_input(area, "hello");
        assert_eq!(&*observed.borrow(), "hello");
        assert_eq!(page.selection(area), (0, 5));
    }

    #[test]
    fn listener_removal_stops_delivery() {
        let page = Page::new("t", "example.com");
        let area = page.append_element(Page::ROOT, "textarea");
        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();
        let id = page.add_listener(
            EventTarget::Node(area),
            events::INPUT,
            Rc::new(move |_| c.set(c.get() + 1)),
        );
        page.user_input(area, "a");
        page.remove_listener(id);
        page.user_input(area, "b");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn timers_run_in_schedule_order_on_advance() {
        let page = Page::new("t", "example.com");
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        page.set_timeout(20, Rc::new(move || o1.borrow_mut().push("late")));
        page.set_timeout(5, Rc::new(move || o2.borrow_mut().push("early")));
        page.advance(4);
        assert!(order.borrow().is_empty());
        page.advance(20);
        assert_eq!(&*order.borrow(), &["early", "late"]);
    }

    #[test]
    fn inaccessible_frame_content_errors() {
        let page = Page::new("outer", "example.com");
        let inner = Page::new("inner", "example.com");
        let ok = page.append_frame(Page::ROOT, inner.clone(), true);
        let denied = page.append_frame(Page::ROOT, Page::new("x", "other.org"), false);
        assert!(page.frame_page(ok).is_ok());
        assert!(matches!(
            page.frame_page(denied),
            Err(PageError::FrameAccess)
        ));
    }

    #[test]
    fn ensure_id_generates_once_and_sticks() {
        let page = Page::new("t", "example.com");
        let el = page.append_element(Page::ROOT, "div");
        let generated = page.ensure_id(el, "gen-");
        assert_eq!(page.ensure_id(el, "gen-"), generated);
        assert_eq!(page.by_id(&generated), Some(el));
    }

    #[test]
    fn widget_change_observers_see_stale_value() {
        let page = Page::new("t", "example.com");
        let el = page.append_element(Page::ROOT, "div");
        page.attach_widget(el, EditorWidget::with_value("old"));
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        let reader = page.clone();
        page.with_widget(el, |w| {
            w.on_change(Rc::new(move || {
                *sink.borrow_mut() = reader.with_widget(el, |w| w.value());
            }))
        });
        page.widget_edit(el, "new");
        // Observer ran before the buffer settled.
        assert_eq!(&*seen.borrow(), "old");
        assert_eq!(page.with_widget(el, |w| w.value()), "new");
    }
}
