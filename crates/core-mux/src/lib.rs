//! Connection multiplexing between page surfaces and the companion server.
//!
//! Layering: [`mux`] owns the per-tab socket lifecycle and routing on a
//! single event-loop task; [`session`] is the content-side glue that turns
//! surface callbacks into outbound [`core_protocol::ChangeRecord`]s and
//! applies inbound ones; [`notify`] holds the collaborator seams for the
//! toast and badge UI; [`probe`] is the discovery request the handshake
//! starts with.
//!
//! Failure policy: every failure is recovered where it occurs and converted
//! to a [`Notice`]; nothing crosses back into page code as a panic or an
//! error value. Worst case a tab is left disconnected.

pub mod mux;
pub mod notify;
pub mod probe;
pub mod session;

pub use mux::{Multiplexer, MuxCommand, MuxConfig, MuxHandle};
pub use notify::{LogNotifier, LogStatus, Notice, Notifier, StatusIndicator};
pub use session::TabSession;

use core_protocol::ChangeRecord;
use thiserror::Error;

/// Identifier of a browser tab. One live connection at most per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages the multiplexer routes to a tab's content context.
#[derive(Debug)]
pub enum PortMessage {
    /// A record pushed by the server; apply to the bound surface.
    Remote(ChangeRecord),
    /// The socket reached Open (the pending change was delivered).
    Connected,
    /// The connection is gone: unbind and tell the user.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum MuxError {
    /// Probe unreachable or its body unusable. Always fatal for the
    /// attempt; never retried automatically.
    #[error("discovery probe failed for {url}: {reason}")]
    Probe { url: String, reason: String },
    /// The server speaks another protocol generation. No socket is opened.
    #[error("server protocol version {server} does not match client protocol version {client}")]
    ProtocolMismatch { server: u32, client: u32 },
    #[error("socket failure: {reason}")]
    Socket { reason: String },
}

impl MuxError {
    /// User-facing rendering of the failure taxonomy.
    pub fn to_notice(&self) -> Notice {
        match self {
            MuxError::Probe { .. } => Notice::error(
                "Connection error.\nMake sure the companion server is running and that its \
                 port matches the configured one, then try again.",
            )
            .sticky(),
            MuxError::ProtocolMismatch { server, client } => Notice::error(format!(
                "Cannot connect: the server's protocol version is {server}, \
                 this client's protocol version is {client}."
            )),
            MuxError::Socket { .. } => Notice::error("Connection error."),
        }
    }
}
