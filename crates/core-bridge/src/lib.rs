//! Injected-bridge protocol.
//!
//! Script-world editor libraries are reachable only from the page's own
//! execution context, never by direct calls from extension code. This crate
//! owns the channel that crosses that boundary: a fixed custom-event
//! vocabulary dispatched on the editor's root element, the payload codecs,
//! the flat-offset ↔ row/column conversion both sides agree on, and the
//! page-world shim that is injected (once) next to each editor to translate
//! events into library calls.
//!
//! The page script world is treated as an untrusted peer process: inbound
//! payloads are parsed defensively and malformed details are dropped with a
//! log line, not propagated.

pub mod position;
pub mod shim;

use core_protocol::SelectionRange;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Event names of the bridge vocabulary.
///
/// Outbound means extension side → page script world; inbound is the
/// reverse. Both travel as page custom events on the editor's root element.
pub mod events {
    /// Outbound: replace the editor's whole content.
    pub const SERVER_INPUT: &str = "textlink-server-input";
    /// Outbound: apply selection ranges (flat offsets in the payload).
    pub const SERVER_SELECTION_CHANGED: &str = "textlink-server-selection-changed";
    /// Outbound: bring the editor into foreground editing focus.
    pub const DO_FOCUS: &str = "textlink-do-focus";
    /// Outbound: show the connected affordance.
    pub const DO_HIGHLIGHT: &str = "textlink-do-highlight";
    /// Outbound: remove the connected affordance.
    pub const REMOVE_HIGHLIGHT: &str = "textlink-remove-highlight";
    /// Inbound: the editor's content changed (debounced by the shim).
    pub const EDITOR_INPUT: &str = "textlink-editor-input";
    /// Inbound: the editor gained focus.
    pub const EDITOR_FOCUS: &str = "textlink-editor-focus";
}

/// Prefix for ids generated when an editor element carries none. Generated
/// ids stay on the element, so re-detection finds the same marker.
pub const GENERATED_ID_PREFIX: &str = "generated-by-textlink-";

/// Delay before the shim re-reads the editor's value after a change
/// notification. Editor libraries may notify before their buffer settles;
/// reading synchronously would forward stale text.
pub const EDITOR_INPUT_DEBOUNCE_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed bridge event detail: {0}")]
    Detail(#[from] serde_json::Error),
}

/// Payload of [`events::SERVER_INPUT`], [`events::EDITOR_INPUT`], and
/// [`events::EDITOR_FOCUS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDetail {
    pub text: String,
}

impl TextDetail {
    pub fn to_detail(text: &str) -> Value {
        json!({ "text": text })
    }

    pub fn from_detail(detail: &Value) -> Result<Self, BridgeError> {
        Ok(serde_json::from_value(detail.clone())?)
    }
}

/// Payload of [`events::SERVER_SELECTION_CHANGED`]. Offsets are flat; the
/// shim converts them to the editor's row/column model on application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionsDetail {
    pub selections: Vec<SelectionRange>,
}

impl SelectionsDetail {
    pub fn to_detail(selections: &[SelectionRange]) -> Value {
        json!({ "selections": selections })
    }

    pub fn from_detail(detail: &Value) -> Result<Self, BridgeError> {
        Ok(serde_json::from_value(detail.clone())?)
    }
}
