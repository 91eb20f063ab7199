//! S2: the server-side handshake scenario from §8.

use h2_proto_core::{
    Connection, ConnectionState, Frame, Framer, Role, Settings, SettingsFlags,
    CONNECTION_PREFACE,
};

#[test]
fn server_applies_peer_settings_and_replies_with_its_own() {
    let mut server = Connection::new(Role::Server);
    assert_eq!(server.state(), ConnectionState::New);

    let mut bytes = CONNECTION_PREFACE.to_vec();
    bytes.extend(Framer::encode(&Frame::Settings {
        flags: SettingsFlags::default(),
        params: vec![(4, 100)],
    }));

    server.receive(&bytes).unwrap();

    assert_eq!(server.state(), ConnectionState::Connected);
    assert_eq!(server.stream_limit(), 100);

    let outbound = server.take_outbound();
    let (frame, consumed) = Framer::parse(&outbound).unwrap().unwrap();
    assert_eq!(consumed, outbound.len(), "no outbound frames besides the server's own SETTINGS");
    match frame {
        Frame::Settings { flags, .. } => assert!(!flags.ack),
        other => panic!("expected SETTINGS, got {other:?}"),
    }
}

#[test]
fn client_handshake_round_trips_through_with_settings() {
    let mut client = Connection::new(Role::Client);
    let events = client.settings(Settings { max_concurrent_streams: Some(50), ..Default::default() });
    assert_eq!(events.len(), 1);

    let mut server = Connection::new(Role::Server);
    let outbound = client.take_outbound();
    server.receive(&outbound).unwrap();

    assert_eq!(server.state(), ConnectionState::Connected);
    assert_eq!(server.stream_limit(), 50);
}
