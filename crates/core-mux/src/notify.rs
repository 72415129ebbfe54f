//! Collaborator seams for user-visible state.
//!
//! The multiplexer never draws anything itself; it reports through these
//! two narrow interfaces. The default implementations log, which is what
//! the headless binary wants; tests install spies.

use crate::TabId;

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub is_error: bool,
    /// Stays on screen until dismissed instead of timing out.
    pub stay: bool,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
            stay: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
            stay: false,
        }
    }

    pub fn sticky(mut self) -> Self {
        self.stay = true;
        self
    }
}

/// Message-toast collaborator.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Per-tab connected indicator collaborator (the badge).
pub trait StatusIndicator: Send + Sync {
    fn set_connected(&self, tab: TabId);
    fn clear(&self, tab: TabId);
}

/// Logs notices instead of displaying them.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_error {
            tracing::warn!(target: "mux.notify", message = %notice.message, stay = notice.stay, "notice");
        } else {
            tracing::info!(target: "mux.notify", message = %notice.message, stay = notice.stay, "notice");
        }
    }
}

/// Logs indicator transitions.
pub struct LogStatus;

impl StatusIndicator for LogStatus {
    fn set_connected(&self, tab: TabId) {
        tracing::info!(target: "mux.status", tab = tab.0, "indicator_on");
    }

    fn clear(&self, tab: TabId) {
        tracing::info!(target: "mux.status", tab = tab.0, "indicator_off");
    }
}
