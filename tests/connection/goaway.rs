//! GOAWAY / draining semantics (§4.5, Open Question (c) in DESIGN.md):
//! draining permits existing streams to finish but rejects new peer-
//! initiated stream ids, and the connection closes once the last stream
//! still running at the time of the GOAWAY finishes.

use h2_proto_core::{Connection, ConnectionState, ErrorCode, Event, H2Header, Role};

fn handshake(client: &mut Connection, server: &mut Connection) {
    client.settings(Default::default());
    server.receive(&client.take_outbound()).unwrap();
    client.receive(&server.take_outbound()).unwrap();
}

#[test]
fn goaway_enters_draining_and_reports_last_stream_id() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);
    handshake(&mut client, &mut server);

    let id = client.new_stream(None).unwrap();
    client.stream(id).unwrap().headers(&[H2Header::new(":method", "GET")], false).unwrap();
    server.receive(&client.take_outbound()).unwrap();

    server.goaway(ErrorCode::NoError, b"shutting down".to_vec());
    let events = client.receive(&server.take_outbound()).unwrap();

    assert_eq!(client.state(), ConnectionState::Draining);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::GoAway { last_stream_id, error_code: ErrorCode::NoError, .. } if *last_stream_id == id
    )));
}

#[test]
fn draining_connection_rejects_new_peer_initiated_streams() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);
    handshake(&mut client, &mut server);

    server.goaway(ErrorCode::NoError, Vec::new());
    client.receive(&server.take_outbound()).unwrap();
    assert_eq!(client.state(), ConnectionState::Draining);

    // The peer (server) now tries to open a brand new stream on a
    // connection it has already told to drain.
    let fresh = server.new_stream(None).unwrap();
    server.stream(fresh).unwrap().headers(&[], false).unwrap();
    let err = client.receive(&server.take_outbound()).unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[test]
fn draining_connection_closes_once_its_last_active_stream_completes() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);
    handshake(&mut client, &mut server);

    let id = client.new_stream(None).unwrap();
    client.stream(id).unwrap().headers(&[H2Header::new(":method", "GET")], true).unwrap();
    server.receive(&client.take_outbound()).unwrap();
    assert_eq!(server.active_stream_count(), 1);

    server.goaway(ErrorCode::NoError, Vec::new());
    assert_eq!(server.state(), ConnectionState::Draining);

    // The server's own final response half-closes its side of the last
    // remaining stream, which must complete the drain.
    let events = server.stream(id).unwrap().headers(&[H2Header::new(":status", "200")], true).unwrap();

    assert!(events.iter().any(|e| matches!(e, Event::StreamClosed { stream_id, .. } if *stream_id == id)));
    assert_eq!(server.active_stream_count(), 0);
    assert_eq!(server.state(), ConnectionState::Closed);
}
