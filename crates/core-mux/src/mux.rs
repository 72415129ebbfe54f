//! Per-tab connection multiplexer.
//!
//! One event-loop task owns the whole tab registry; socket tasks and
//! callers talk to it over channels, so every registry mutation happens on
//! the loop with no locking and no concurrent writers, the single-writer
//! rule the rest of the design assumes. Each connection generation carries a
//! sequence number; events from a superseded generation are ignored, which
//! keeps the registry consistent when teardown and a fresh connect race.
//!
//! Per-tab state machine: Idle (no entry) → Connecting → Open → Closed
//! (entry removed). Outbound messages during Connecting are dropped, not
//! queued; the next user edit re-sends naturally.

use crate::notify::{Notice, Notifier, StatusIndicator};
use crate::{MuxError, PortMessage, TabId, probe};
use core_protocol::{ChangeRecord, PROTOCOL_VERSION};
use futures_util::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Where the companion server is probed and dialed.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub host: String,
    pub probe_port: u16,
}

impl MuxConfig {
    pub fn new(probe_port: u16) -> Self {
        Self {
            host: "localhost".into(),
            probe_port,
        }
    }

    pub fn with_host(host: impl Into<String>, probe_port: u16) -> Self {
        Self {
            host: host.into(),
            probe_port,
        }
    }

    fn probe_url(&self) -> String {
        format!("http://{}:{}", self.host, self.probe_port)
    }

    fn ws_url(&self, port: u16) -> String {
        format!("ws://{}:{}", self.host, port)
    }
}

/// Commands accepted by the multiplexer loop.
pub enum MuxCommand {
    /// Attach the tab's content-side message channel. Must precede the
    /// first outbound message for the tab to receive anything back.
    Register {
        tab: TabId,
        port: mpsc::UnboundedSender<PortMessage>,
    },
    /// A local edit to deliver. Triggers the handshake when the tab has no
    /// connection yet.
    Outbound { tab: TabId, record: ChangeRecord },
    /// Explicit disconnect request (user or content side).
    Disconnect { tab: TabId },
    /// The owning tab is gone; tear down without notifying its port.
    TabRemoved { tab: TabId },
    /// Stop the loop, closing every connection.
    Shutdown,
}

enum SocketEvent {
    Opened {
        tab: TabId,
        seq: u64,
        sink: Box<WsSink>,
        pending: ChangeRecord,
    },
    Inbound {
        tab: TabId,
        seq: u64,
        frame: String,
    },
    Closed {
        tab: TabId,
        seq: u64,
    },
    Failed {
        tab: TabId,
        seq: u64,
        error: MuxError,
    },
}

enum TabState {
    Connecting,
    Open { sink: Box<WsSink> },
}

struct TabEntry {
    seq: u64,
    state: TabState,
}

/// Cloneable sender half used by sessions and UI plumbing.
#[derive(Clone)]
pub struct MuxHandle {
    tx: mpsc::UnboundedSender<MuxCommand>,
}

impl MuxHandle {
    pub fn register(&self, tab: TabId, port: mpsc::UnboundedSender<PortMessage>) {
        let _ = self.tx.send(MuxCommand::Register { tab, port });
    }

    pub fn outbound(&self, tab: TabId, record: ChangeRecord) {
        let _ = self.tx.send(MuxCommand::Outbound { tab, record });
    }

    pub fn disconnect(&self, tab: TabId) {
        let _ = self.tx.send(MuxCommand::Disconnect { tab });
    }

    pub fn tab_removed(&self, tab: TabId) {
        let _ = self.tx.send(MuxCommand::TabRemoved { tab });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(MuxCommand::Shutdown);
    }

    /// Handle wired to a bare channel, for exercising collaborators without
    /// a running loop.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::UnboundedReceiver<MuxCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// The multiplexer loop state. Construct with [`Multiplexer::new`], then
/// drive with [`Multiplexer::run`] (usually on its own task).
pub struct Multiplexer {
    config: MuxConfig,
    notifier: Arc<dyn Notifier>,
    status: Arc<dyn StatusIndicator>,
    commands: mpsc::UnboundedReceiver<MuxCommand>,
    socket_tx: mpsc::UnboundedSender<SocketEvent>,
    socket_rx: mpsc::UnboundedReceiver<SocketEvent>,
    connections: HashMap<TabId, TabEntry>,
    ports: HashMap<TabId, mpsc::UnboundedSender<PortMessage>>,
    next_seq: u64,
}

impl Multiplexer {
    pub fn new(
        config: MuxConfig,
        notifier: Arc<dyn Notifier>,
        status: Arc<dyn StatusIndicator>,
    ) -> (Self, MuxHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                notifier,
                status,
                commands,
                socket_tx,
                socket_rx,
                connections: HashMap::new(),
                ports: HashMap::new(),
                next_seq: 0,
            },
            MuxHandle { tx },
        )
    }

    pub async fn run(mut self) {
        tracing::info!(target: "mux", probe_port = self.config.probe_port, "mux_started");
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(MuxCommand::Shutdown) => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                // The socket channel cannot close while we hold a sender.
                Some(event) = self.socket_rx.recv() => {
                    self.handle_socket_event(event).await;
                }
            }
        }
        let tabs: Vec<TabId> = self.connections.keys().copied().collect();
        for tab in tabs {
            self.close(tab, false).await;
        }
        tracing::info!(target: "mux", "mux_stopped");
    }

    async fn handle_command(&mut self, command: MuxCommand) {
        match command {
            MuxCommand::Register { tab, port } => {
                self.ports.insert(tab, port);
            }
            MuxCommand::Outbound { tab, record } => self.handle_outbound(tab, record).await,
            MuxCommand::Disconnect { tab } => {
                self.close(tab, true).await;
            }
            MuxCommand::TabRemoved { tab } => {
                self.close(tab, false).await;
                self.ports.remove(&tab);
            }
            // Intercepted by the loop before dispatch.
            MuxCommand::Shutdown => {}
        }
    }

    async fn handle_outbound(&mut self, tab: TabId, record: ChangeRecord) {
        match self.connections.get_mut(&tab) {
            Some(TabEntry {
                state: TabState::Open { sink },
                ..
            }) => {
                let frame = match record.to_frame() {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(target: "mux.socket", tab = tab.0, %err, "encode_failed");
                        return;
                    }
                };
                if let Err(err) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!(target: "mux.socket", tab = tab.0, %err, "send_failed");
                    self.close(tab, true).await;
                    self.notifier
                        .notify(Notice::error("Connection lost while sending."));
                }
            }
            Some(TabEntry {
                state: TabState::Connecting,
                ..
            }) => {
                // Policy: dropped, not queued. The next edit re-sends.
                tracing::debug!(target: "mux.state", tab = tab.0, "outbound_dropped_connecting");
            }
            None => {
                self.next_seq += 1;
                let seq = self.next_seq;
                self.connections.insert(
                    tab,
                    TabEntry {
                        seq,
                        state: TabState::Connecting,
                    },
                );
                tracing::info!(target: "mux.state", tab = tab.0, seq, "connecting");
                tokio::spawn(handshake(
                    self.config.clone(),
                    tab,
                    seq,
                    record,
                    self.socket_tx.clone(),
                ));
            }
        }
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened {
                tab,
                seq,
                mut sink,
                pending,
            } => {
                if !self.is_current(tab, seq) {
                    // Superseded while the handshake was in flight.
                    let _ = sink.close().await;
                    return;
                }
                let frame = match pending.to_frame() {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(target: "mux.socket", tab = tab.0, %err, "encode_failed");
                        return;
                    }
                };
                if let Err(err) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!(target: "mux.socket", tab = tab.0, %err, "initial_send_failed");
                    self.connections.remove(&tab);
                    self.notifier
                        .notify(Notice::error("Connection lost while sending."));
                    return;
                }
                if let Some(entry) = self.connections.get_mut(&tab) {
                    entry.state = TabState::Open { sink };
                }
                self.status.set_connected(tab);
                self.send_port(tab, PortMessage::Connected);
                tracing::info!(target: "mux.state", tab = tab.0, seq, "open");
            }
            SocketEvent::Inbound { tab, seq, frame } => {
                if !self.is_current(tab, seq) {
                    return;
                }
                match ChangeRecord::from_frame(&frame) {
                    Ok(record) => self.send_port(tab, PortMessage::Remote(record)),
                    Err(err) => {
                        tracing::warn!(target: "mux.socket", tab = tab.0, %err, "inbound_dropped");
                    }
                }
            }
            SocketEvent::Closed { tab, seq } => {
                if self.is_current(tab, seq) {
                    self.close(tab, true).await;
                }
            }
            SocketEvent::Failed { tab, seq, error } => {
                if !self.is_current(tab, seq) {
                    return;
                }
                self.connections.remove(&tab);
                self.status.clear(tab);
                tracing::warn!(target: "mux.state", tab = tab.0, %error, "connect_failed");
                let socket_failure = matches!(error, MuxError::Socket { .. });
                self.notifier.notify(error.to_notice());
                if socket_failure {
                    self.send_port(tab, PortMessage::Disconnected);
                }
            }
        }
    }

    /// Idempotent teardown: safe to call for a tab with no entry.
    async fn close(&mut self, tab: TabId, notify_port: bool) {
        let Some(entry) = self.connections.remove(&tab) else {
            return;
        };
        if let TabState::Open { mut sink } = entry.state {
            let _ = sink.close().await;
        }
        self.status.clear(tab);
        if notify_port {
            self.send_port(tab, PortMessage::Disconnected);
        }
        tracing::info!(target: "mux.state", tab = tab.0, "closed");
    }

    fn is_current(&self, tab: TabId, seq: u64) -> bool {
        self.connections.get(&tab).is_some_and(|entry| entry.seq == seq)
    }

    fn send_port(&mut self, tab: TabId, message: PortMessage) {
        let receiver_gone = match self.ports.get(&tab) {
            Some(port) => port.send(message).is_err(),
            None => false,
        };
        if receiver_gone {
            // Content side dropped its receiver; forget the port.
            self.ports.remove(&tab);
        }
    }
}

/// Probe, version-check, dial, then pump inbound frames. Runs on its own
/// task per connection attempt; everything it learns goes back to the loop
/// as [`SocketEvent`]s tagged with this attempt's sequence number.
async fn handshake(
    config: MuxConfig,
    tab: TabId,
    seq: u64,
    pending: ChangeRecord,
    tx: mpsc::UnboundedSender<SocketEvent>,
) {
    let info = match probe::fetch(config.probe_url()).await {
        Ok(info) => info,
        Err(error) => {
            let _ = tx.send(SocketEvent::Failed { tab, seq, error });
            return;
        }
    };
    if info.protocol_version != PROTOCOL_VERSION {
        let _ = tx.send(SocketEvent::Failed {
            tab,
            seq,
            error: MuxError::ProtocolMismatch {
                server: info.protocol_version,
                client: PROTOCOL_VERSION,
            },
        });
        return;
    }
    let url = config.ws_url(info.web_socket_port);
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            let _ = tx.send(SocketEvent::Failed {
                tab,
                seq,
                error: MuxError::Socket {
                    reason: err.to_string(),
                },
            });
            return;
        }
    };
    let (sink, mut read) = stream.split();
    if tx
        .send(SocketEvent::Opened {
            tab,
            seq,
            sink: Box::new(sink),
            pending,
        })
        .is_err()
    {
        return;
    }
    while let Some(message) = read.next().await {
        match message {
            Ok(message) if message.is_text() => {
                let Ok(text) = message.into_text() else {
                    continue;
                };
                if tx
                    .send(SocketEvent::Inbound {
                        tab,
                        seq,
                        frame: text.as_str().to_string(),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Ok(message) if message.is_close() => break,
            Ok(_) => {} // ping/pong and binary frames are not part of the protocol
            Err(err) => {
                tracing::debug!(target: "mux.socket", tab = tab.0, %err, "read_error");
                break;
            }
        }
    }
    let _ = tx.send(SocketEvent::Closed { tab, seq });
}
