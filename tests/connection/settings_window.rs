//! §8 property 6: after SETTINGS_INITIAL_WINDOW_SIZE old->new, every
//! existing stream's send window has been adjusted by exactly (new - old).

use h2_proto_core::{Connection, Event, Role, Settings, Window};

fn handshake(client: &mut Connection, server: &mut Connection) {
    client.settings(Settings::default());
    server.receive(&client.take_outbound()).unwrap();
    client.receive(&server.take_outbound()).unwrap();
}

#[test]
fn receiving_initial_window_size_change_adjusts_every_existing_stream() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);
    handshake(&mut client, &mut server);

    let id_a = client.new_stream(None).unwrap();
    client.stream(id_a).unwrap().headers(&[], false).unwrap();
    let id_b = client.new_stream(None).unwrap();
    client.stream(id_b).unwrap().headers(&[], false).unwrap();
    server.receive(&client.take_outbound()).unwrap();

    let before_a = match server.stream(id_a).unwrap().window() {
        Window::Bounded(v) => v,
        Window::Unbounded => panic!("expected a bounded window"),
    };
    let before_b = match server.stream(id_b).unwrap().window() {
        Window::Bounded(v) => v,
        Window::Unbounded => panic!("expected a bounded window"),
    };

    let new_size = (before_a as u32) + 1000;
    client.settings(Settings { initial_window_size: Some(new_size), ..Default::default() });
    let events = server.receive(&client.take_outbound()).unwrap();

    let delta = new_size as i64 - before_a;
    assert_eq!(server.stream(id_a).unwrap().window(), Window::Bounded(before_a + delta));
    assert_eq!(server.stream(id_b).unwrap().window(), Window::Bounded(before_b + delta));
    assert!(events.iter().any(|e| matches!(e, Event::Window { stream_id, .. } if *stream_id == id_a)));
    assert!(events.iter().any(|e| matches!(e, Event::Window { stream_id, .. } if *stream_id == id_b)));
}

#[test]
fn initial_window_size_change_can_drive_a_blocked_stream_window_negative() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);
    handshake(&mut client, &mut server);
    server.settings(Settings { initial_window_size: Some(10), ..Default::default() });
    client.receive(&server.take_outbound()).unwrap();

    let id = client.new_stream(None).unwrap();
    client.stream(id).unwrap().headers(&[], false).unwrap();
    client.stream(id).unwrap().data(b"0123456789AB", true).unwrap();
    assert_eq!(client.stream(id).unwrap().buffered_amount(), 2);

    // A further peer SETTINGS shrinking the window must not panic; the
    // remainder just stays buffered with a negative window.
    server.settings(Settings { initial_window_size: Some(0), ..Default::default() });
    client.receive(&server.take_outbound()).unwrap();
    match client.stream(id).unwrap().window() {
        Window::Bounded(v) => assert!(v < 0),
        Window::Unbounded => panic!("expected a bounded window"),
    }
    assert_eq!(client.stream(id).unwrap().buffered_amount(), 2);
}
