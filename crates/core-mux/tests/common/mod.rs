//! In-process companion-server fixture: a one-shot HTTP metadata endpoint
//! plus a WebSocket accept loop, both on ephemeral ports.

use core_mux::{Notice, Notifier, StatusIndicator, TabId};
use core_protocol::ServerInfo;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// One accepted client socket, as seen from the server side.
pub struct FixtureConn {
    pub received: mpsc::UnboundedReceiver<String>,
    pub push: mpsc::UnboundedSender<String>,
    pub close: mpsc::UnboundedSender<()>,
}

impl FixtureConn {
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("server connection ended")
    }
}

pub struct Fixture {
    pub probe_port: u16,
    pub probe_hits: Arc<AtomicUsize>,
    pub ws_connections: Arc<AtomicUsize>,
    conns: mpsc::UnboundedReceiver<FixtureConn>,
}

impl Fixture {
    pub async fn next_conn(&mut self) -> FixtureConn {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("fixture ended")
    }

    pub fn assert_no_conn(&mut self) {
        assert!(
            self.conns.try_recv().is_err(),
            "unexpected socket connection"
        );
    }
}

pub async fn start_fixture(protocol_version: u32) -> Fixture {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = ws_listener.local_addr().unwrap().port();
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let probe_port = http_listener.local_addr().unwrap().port();

    let probe_hits = Arc::new(AtomicUsize::new(0));
    let ws_connections = Arc::new(AtomicUsize::new(0));
    let (conn_tx, conns) = mpsc::unbounded_channel();

    let body = serde_json::to_string(&ServerInfo {
        protocol_version,
        web_socket_port: ws_port,
    })
    .unwrap();
    let hits = probe_hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = http_listener.accept().await else {
                break;
            };
            hits.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = stream.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    let accepted = ws_connections.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = ws_listener.accept().await else {
                break;
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let (received_tx, received) = mpsc::unbounded_channel();
            let (push, mut push_rx) = mpsc::unbounded_channel::<String>();
            let (close, mut close_rx) = mpsc::unbounded_channel::<()>();
            let _ = conn_tx.send(FixtureConn {
                received,
                push,
                close,
            });
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        message = socket.next() => match message {
                            Some(Ok(message)) if message.is_text() => {
                                let Ok(text) = message.into_text() else { continue };
                                let _ = received_tx.send(text.as_str().to_string());
                            }
                            Some(Ok(message)) if message.is_close() => break,
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        frame = push_rx.recv() => match frame {
                            Some(frame) => {
                                if socket.send(Message::Text(frame.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        _ = close_rx.recv() => {
                            let _ = socket.close(None).await;
                            break;
                        }
                    }
                }
            });
        }
    });

    Fixture {
        probe_port,
        probe_hits,
        ws_connections,
        conns,
    }
}

/// Poll until `condition` holds or the wait budget runs out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Default)]
pub struct SpyNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl SpyNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for SpyNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub struct SpyStatus {
    pub transitions: Mutex<Vec<(TabId, bool)>>,
}

impl SpyStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl StatusIndicator for SpyStatus {
    fn set_connected(&self, tab: TabId) {
        self.transitions.lock().unwrap().push((tab, true));
    }

    fn clear(&self, tab: TabId) {
        self.transitions.lock().unwrap().push((tab, false));
    }
}
