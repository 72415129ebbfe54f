//! Content-side session glue.
//!
//! Connects one bound surface to the multiplexer: packages every local edit
//! into a fresh [`ChangeRecord`], asks for disconnection when the surface
//! disappears, and applies records pushed by the server. Lives in the page
//! world (single-threaded, `Rc`-based); talks to the multiplexer loop only
//! through the command handle and the port channel.

use crate::notify::{Notice, Notifier};
use crate::{MuxHandle, PortMessage, TabId};
use core_page::Page;
use core_protocol::{ChangeRecord, SelectionSet};
use core_surface::InputArea;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One tab's editing session.
pub struct TabSession {
    tab: TabId,
    page: Page,
    handle: MuxHandle,
    notifier: Arc<dyn Notifier>,
    surface: RefCell<Option<Rc<dyn InputArea>>>,
    port_rx: RefCell<Option<mpsc::UnboundedReceiver<PortMessage>>>,
}

impl TabSession {
    /// Create the session and register its port with the multiplexer.
    pub fn new(tab: TabId, page: Page, handle: MuxHandle, notifier: Arc<dyn Notifier>) -> Self {
        let (port_tx, port_rx) = mpsc::unbounded_channel();
        handle.register(tab, port_tx);
        Self {
            tab,
            page,
            handle,
            notifier,
            surface: RefCell::new(None),
            port_rx: RefCell::new(Some(port_rx)),
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    /// Take the receiving half of the port channel; the host loop drains it
    /// into [`TabSession::handle_port_message`].
    pub fn take_port_rx(&self) -> Option<mpsc::UnboundedReceiver<PortMessage>> {
        self.port_rx.borrow_mut().take()
    }

    /// Adopt the surface that won detection: route its callbacks into the
    /// multiplexer and report its initial content (which is what triggers
    /// the connection handshake for an idle tab).
    pub fn wire(&self, surface: Rc<dyn InputArea>) {
        let weak = Rc::downgrade(&surface);
        let (page, handle, tab) = (self.page.clone(), self.handle.clone(), self.tab);
        surface.on_text_changed(Rc::new(move |_| {
            if let Some(surface) = weak.upgrade() {
                handle.outbound(tab, build_change(&page, surface.as_ref()));
            }
        }));

        let weak = Rc::downgrade(&surface);
        let (page, handle, tab) = (self.page.clone(), self.handle.clone(), self.tab);
        surface.on_selection_changed(Rc::new(move |_| {
            if let Some(surface) = weak.upgrade() {
                handle.outbound(tab, build_change(&page, surface.as_ref()));
            }
        }));

        let (handle, tab) = (self.handle.clone(), self.tab);
        surface.on_removed(Rc::new(move || handle.disconnect(tab)));

        let (handle, tab) = (self.handle.clone(), self.tab);
        surface.on_unload(Rc::new(move || handle.disconnect(tab)));

        let initial = build_change(&self.page, surface.as_ref());
        *self.surface.borrow_mut() = Some(surface);
        self.handle.outbound(self.tab, initial);
    }

    pub fn has_surface(&self) -> bool {
        self.surface.borrow().is_some()
    }

    /// React to a message routed from the multiplexer.
    pub fn handle_port_message(&self, message: PortMessage) {
        match message {
            PortMessage::Remote(record) => self.apply_remote(&record),
            PortMessage::Connected => self.notifier.notify(Notice::info(
                "Connected! You can switch to your editor.",
            )),
            PortMessage::Disconnected => {
                if let Some(surface) = self.surface.borrow_mut().take() {
                    surface.unbind();
                }
                self.notifier.notify(Notice::info("Disconnected."));
            }
        }
    }

    /// Apply a server push to the bound surface.
    pub fn apply_remote(&self, record: &ChangeRecord) {
        let surface = self.surface.borrow().clone();
        let Some(surface) = surface else {
            tracing::debug!(target: "session", tab = self.tab.0, "remote_without_surface");
            return;
        };
        surface.set_text(&record.text);
        surface.set_selections(&record.selections);
        surface.focus();
    }

    /// Ask the multiplexer to drop this tab's connection.
    pub fn request_disconnect(&self) {
        self.handle.disconnect(self.tab);
    }
}

fn build_change(page: &Page, surface: &dyn InputArea) -> ChangeRecord {
    let mut selections = surface.get_selections();
    if selections.is_empty() {
        // Serialization invariant: a bound surface never reports an empty set.
        selections = SelectionSet::placeholder();
    }
    ChangeRecord {
        title: page.title(),
        text: surface.get_text(),
        selections,
        url: page.host(),
        syntax: guess_syntax(page),
    }
}

// TODO: derive a syntax name from the page host once the server understands
// per-language sessions.
fn guess_syntax(_page: &Page) -> Option<String> {
    None
}
