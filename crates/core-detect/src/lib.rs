//! Surface detection and arbitration.
//!
//! Scans a page (and, best-effort, its accessible frames) for supported
//! editable surfaces, binds every candidate, and decides which single one
//! becomes active: an only candidate immediately, otherwise the first
//! candidate the user focuses. Losing candidates are permanently unbound,
//! not hidden. Detection never re-scans on its own; call [`Detector::detect`]
//! again after the page changes.

use core_page::{NodeId, Page};
use core_surface::{InjectedEditorBridge, InputArea, NativeField, RichTextSurface};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;

/// Class marking the root element of a script-world code editor.
pub const CODE_EDITOR_CLASS: &str = "code-editor";

/// Invoked with the surface that won arbitration.
pub type SelectedCallback = Rc<dyn Fn(Rc<dyn InputArea>)>;

#[derive(Debug, Error)]
pub enum DetectError {
    /// `detect` was called before a selection callback was registered.
    #[error("selection callback is missing")]
    MissingCallback,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No supported surface in the page or its accessible frames. Not an
    /// error: callers decide whether to warn the user.
    None,
    /// Exactly one candidate; it was bound, focused, and reported without
    /// waiting for user interaction.
    Single,
    /// Several candidates were bound; the selection callback fires for the
    /// first one to receive user focus, the rest are torn down then.
    AwaitingFocus(usize),
}

struct Candidate {
    surface: Rc<dyn InputArea>,
    page: Page,
}

/// Scanning/arbitration engine. One-shot per [`Detector::detect`] call;
/// holds only the selection callback between calls.
#[derive(Default)]
pub struct Detector {
    on_selected: RefCell<Option<SelectedCallback>>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single selection callback (last registration wins).
    pub fn on_selected(&self, callback: SelectedCallback) {
        *self.on_selected.borrow_mut() = Some(callback);
    }

    /// Scan `page`, bind candidates, and resolve or arm arbitration.
    pub fn detect(&self, page: &Page) -> Result<Detection, DetectError> {
        let selected = self
            .on_selected
            .borrow()
            .clone()
            .ok_or(DetectError::MissingCallback)?;

        let mut candidates = Vec::new();
        scan_into(page, &mut candidates);
        tracing::debug!(target: "detect.scan", count = candidates.len(), "scan_complete");

        match candidates.len() {
            0 => Ok(Detection::None),
            1 => {
                let Candidate { surface, page } = candidates.remove(0);
                // Normalize any prior focus state before reporting.
                page.blur(surface.node());
                surface.focus();
                selected(surface);
                Ok(Detection::Single)
            }
            n => {
                arm_focus_race(candidates, selected);
                Ok(Detection::AwaitingFocus(n))
            }
        }
    }
}

/// Scan in fixed priority order: script-world code editors first, then
/// native fields, then rich-text regions, so an editor's internal textarea
/// is never also matched as a plain field. Recurses into accessible frames;
/// inaccessible ones are skipped.
fn scan_into(page: &Page, candidates: &mut Vec<Candidate>) {
    for node in page.query_class(CODE_EDITOR_CLASS) {
        push_bound(
            candidates,
            page,
            Rc::new(InjectedEditorBridge::new(page.clone(), node)),
        );
    }
    for node in page.query_tag("textarea") {
        if inside_code_editor(page, node) {
            continue;
        }
        push_bound(candidates, page, Rc::new(NativeField::new(page.clone(), node)));
    }
    for node in page.query_attr("contenteditable", "true") {
        push_bound(
            candidates,
            page,
            Rc::new(RichTextSurface::new(page.clone(), node)),
        );
    }
    for frame in page.frames() {
        match page.frame_page(frame) {
            Ok(inner) => scan_into(&inner, candidates),
            Err(err) => {
                tracing::debug!(target: "detect.scan", %err, "frame_skipped");
            }
        }
    }
}

fn push_bound(candidates: &mut Vec<Candidate>, page: &Page, surface: Rc<dyn InputArea>) {
    surface.bind();
    candidates.push(Candidate {
        surface,
        page: page.clone(),
    });
}

fn inside_code_editor(page: &Page, node: NodeId) -> bool {
    let mut current = page.parent(node);
    while let Some(ancestor) = current {
        if page.has_class(ancestor, CODE_EDITOR_CLASS) {
            return true;
        }
        current = page.parent(ancestor);
    }
    false
}

/// Blur every candidate and register a shared one-shot focus callback; the
/// first user focus wins, every other candidate is unbound permanently.
fn arm_focus_race(candidates: Vec<Candidate>, selected: SelectedCallback) {
    let candidates = Rc::new(candidates);
    let resolved = Rc::new(Cell::new(false));
    for (index, candidate) in candidates.iter().enumerate() {
        candidate.page.blur(candidate.surface.node());
        let all = candidates.clone();
        let resolved = resolved.clone();
        let selected = selected.clone();
        candidate.surface.on_focus(Rc::new(move || {
            if resolved.replace(true) {
                return;
            }
            for (other_index, other) in all.iter().enumerate() {
                if other_index != index {
                    other.surface.unbind();
                }
                // Replace the arbitration closure so the candidate list it
                // captures (and with it every losing surface) is released.
                other.surface.on_focus(Rc::new(|| {}));
            }
            let winner = all[index].surface.clone();
            tracing::info!(
                target: "detect.race",
                kind = winner.kind().as_str(),
                "focus_race_won"
            );
            selected(winner);
        }));
    }
}
