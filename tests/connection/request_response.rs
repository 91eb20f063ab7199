//! S3: the request/response round trip from §8.

use h2_proto_core::{Connection, Event, H2Header, Role, Settings};

fn is_active(ev: &Event, id: u32) -> bool {
    matches!(ev, Event::Active(s) if *s == id)
}
fn is_half_close(ev: &Event, id: u32) -> bool {
    matches!(ev, Event::HalfClose(s) if *s == id)
}
fn is_headers(ev: &Event, id: u32) -> bool {
    matches!(ev, Event::Headers { stream_id, .. } if *stream_id == id)
}
fn is_data(ev: &Event, id: u32) -> bool {
    matches!(ev, Event::Data { stream_id, .. } if *stream_id == id)
}
fn is_closed(ev: &Event, id: u32) -> bool {
    matches!(ev, Event::StreamClosed { stream_id, .. } if *stream_id == id)
}

fn position_of(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().position(pred).expect("expected event not found")
}

#[test]
fn full_request_response_round_trip() {
    let mut client = Connection::new(Role::Client);
    let mut server = Connection::new(Role::Server);

    client.settings(Settings::default());
    server.receive(&client.take_outbound()).unwrap();
    client.receive(&server.take_outbound()).unwrap();

    let id = client.new_stream(None).unwrap();
    let send_events = client
        .stream(id)
        .unwrap()
        .headers(&[H2Header::new(":method", "GET"), H2Header::new(":path", "/")], true)
        .unwrap();
    assert!(position_of(&send_events, |e| is_active(e, id)) < position_of(&send_events, |e| is_half_close(e, id)));

    let request_bytes = client.take_outbound();
    let server_events = server.receive(&request_bytes).unwrap();

    let active_pos = position_of(&server_events, |e| is_active(e, id));
    let headers_pos = position_of(&server_events, |e| is_headers(e, id));
    let half_close_pos = position_of(&server_events, |e| is_half_close(e, id));
    assert!(active_pos < headers_pos, "server must observe :active before :headers");
    assert!(headers_pos < half_close_pos, "server must observe :headers before :half_close");

    server
        .stream(id)
        .unwrap()
        .headers(&[H2Header::new(":status", "200")], false)
        .unwrap();
    server.stream(id).unwrap().data(b"hi", true).unwrap();

    let response_bytes = server.take_outbound();
    let client_events = client.receive(&response_bytes).unwrap();

    let headers_pos = position_of(&client_events, |e| is_headers(e, id));
    let data_pos = position_of(&client_events, |e| is_data(e, id));
    let closed_pos = position_of(&client_events, |e| is_closed(e, id));
    assert!(headers_pos < data_pos, "client must observe :headers before :data");
    assert!(data_pos < closed_pos, "client must observe :data before :close");

    assert_eq!(client.active_stream_count(), 0);
    assert_eq!(server.active_stream_count(), 0);
}
