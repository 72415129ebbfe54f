//! Textlink entrypoint.
//!
//! Headless driver for the relay stack: assembles a demo page around one
//! text field, detects and connects it, then treats stdin lines as edits so
//! the round trip to the companion editor server can be exercised without a
//! browser. Slash commands stand in for the UI collaborators
//! (`/toggle` is the toolbar button, `/quit` closes the tab).

use anyhow::{Context, Result};
use clap::Parser;
use core_detect::{Detection, Detector};
use core_mux::{
    Multiplexer, MuxConfig, Notice, Notifier, PortMessage, StatusIndicator, TabId, TabSession,
};
use core_page::Page;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "textlink", version, about = "Relay a page text field to your external editor")]
struct Args {
    /// Optional UTF-8 file whose contents seed the demo field.
    pub path: Option<PathBuf>,
    /// Optional configuration file path (overrides discovery of `textlink.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Discovery-probe port for this run (overrides configuration).
    #[arg(long)]
    pub port: Option<u16>,
    /// Persist `--port` as the stored preference.
    #[arg(long = "save-port", requires = "port")]
    pub save_port: bool,
    /// Page title reported to the editor server.
    #[arg(long, default_value = "textlink demo")]
    pub title: String,
}

fn configure_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "textlink.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

/// Prints notices the way the toast collaborator would show them.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_error {
            eprintln!("! {}", notice.message.replace('\n', "\n! "));
        } else {
            eprintln!("* {}", notice.message.replace('\n', "\n* "));
        }
    }
}

/// Prints the per-tab badge transitions.
struct ConsoleStatus;

impl StatusIndicator for ConsoleStatus {
    fn set_connected(&self, tab: TabId) {
        eprintln!("● tab {tab} connected");
    }

    fn clear(&self, tab: TabId) {
        eprintln!("○ tab {tab} disconnected");
    }
}

fn select_and_connect(
    detector: &Detector,
    page: &Page,
    notifier: &Arc<dyn Notifier>,
) -> Result<()> {
    match detector.detect(page)? {
        Detection::None => {
            notifier.notify(Notice::error("No supported fields on this page."));
        }
        Detection::Single => {}
        Detection::AwaitingFocus(count) => {
            notifier.notify(
                Notice::info(format!(
                    "There are {count} editable fields on this page.\nFocus the one you want to use."
                ))
                .sticky(),
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging()?;
    let args = Args::parse();
    info!(target: "runtime", "startup");

    let mut config = core_config::load_from(args.config.clone(), None)?;
    if let (Some(port), true) = (args.port, args.save_port) {
        config.set_server_port(port)?;
    }
    let probe_port = args.port.unwrap_or_else(|| config.server_port());
    info!(target: "runtime.startup", probe_port, "bootstrap_complete");

    // The demo page: one textarea, optionally seeded from a file.
    let page = Page::new(&args.title, "localhost");
    let area = page.append_element(Page::ROOT, "textarea");
    if let Some(path) = &args.path {
        let seed = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        page.set_value(area, &seed);
    }

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let status: Arc<dyn StatusIndicator> = Arc::new(ConsoleStatus);
    let (mux, handle) = Multiplexer::new(MuxConfig::new(probe_port), notifier.clone(), status);
    tokio::spawn(mux.run());

    let tab = TabId(1);
    let session = Rc::new(TabSession::new(
        tab,
        page.clone(),
        handle.clone(),
        notifier.clone(),
    ));
    let mut port_rx = session
        .take_port_rx()
        .context("session port already taken")?;

    let detector = Detector::new();
    let wired = session.clone();
    detector.on_selected(Rc::new(move |surface| wired.wire(surface)));
    select_and_connect(&detector, &page, &notifier)?;

    eprintln!("Type to replace the field's content; /toggle reconnects, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            message = port_rx.recv() => {
                let Some(message) = message else { break };
                if let PortMessage::Remote(record) = &message {
                    println!("⇐ {}", record.text);
                }
                session.handle_port_message(message);
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) if line.trim() == "/toggle" => {
                        if session.has_surface() {
                            session.request_disconnect();
                        } else {
                            select_and_connect(&detector, &page, &notifier)?;
                        }
                    }
                    Some(line) => page.user_input(area, &line),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.tab_removed(tab);
    handle.shutdown();
    info!(target: "runtime", "shutdown");
    Ok(())
}
