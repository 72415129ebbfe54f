//! Full-path scenario: detection → session wiring → handshake → literal
//! frame on the wire → server push applied back into the page.

mod common;
use common::*;

use core_detect::Detector;
use core_mux::{Multiplexer, MuxConfig, PortMessage, TabId, TabSession};
use core_page::Page;
use core_protocol::{ChangeRecord, SelectionRange, SelectionSet};
use std::rc::Rc;

#[tokio::test]
async fn edit_round_trips_through_the_server() {
    let mut fixture = start_fixture(1).await;
    let notifier = SpyNotifier::new();
    let status = SpyStatus::new();
    let (mux, handle) = Multiplexer::new(
        MuxConfig::with_host("127.0.0.1", fixture.probe_port),
        notifier.clone(),
        status.clone(),
    );
    tokio::spawn(mux.run());

    // A page with one text field holding "hi" with a caret after "hi".
    let page = Page::new("T", "example.com");
    let area = page.append_element(Page::ROOT, "textarea");
    page.set_value(area, "hi");
    page.set_selection(area, 2, 2);

    let session = Rc::new(TabSession::new(
        TabId(1),
        page.clone(),
        handle.clone(),
        notifier.clone(),
    ));
    let mut port_rx = session.take_port_rx().unwrap();

    let detector = Detector::new();
    let wired = session.clone();
    detector.on_selected(Rc::new(move |surface| wired.wire(surface)));
    detector.detect(&page).unwrap();

    // The initial report goes out as the literal JSON frame.
    let mut conn = fixture.next_conn().await;
    assert_eq!(
        conn.next_frame().await,
        r#"{"title":"T","text":"hi","selections":[{"start":2,"end":2}],"url":"example.com","syntax":null}"#
    );

    // Server pushes an edit; the session applies it to the bound surface.
    conn.push
        .send(
            ChangeRecord {
                title: "T".into(),
                text: "hello".into(),
                selections: SelectionSet::single(SelectionRange::new(0, 5)),
                url: "example.com".into(),
                syntax: None,
            }
            .to_frame()
            .unwrap(),
        )
        .unwrap();

    loop {
        let message = tokio::time::timeout(WAIT, port_rx.recv())
            .await
            .expect("timed out waiting for the pushed record")
            .expect("port closed");
        let done = matches!(message, PortMessage::Remote(_));
        session.handle_port_message(message);
        if done {
            break;
        }
    }
    assert_eq!(page.value(area), "hello");
    assert_eq!(page.selection(area), (0, 5));

    // Applying the push did not echo a new outbound frame.
    assert!(conn.received.try_recv().is_err());

    // A further local edit flows over the same socket.
    page.user_input(area, "hello world");
    let frame = conn.next_frame().await;
    assert!(frame.contains("\"hello world\""));
}
