//! Tests for Framer/FrameHeader parsing of the 8-octet wire envelope.

use h2_proto_core::{frame_type, Frame, FrameHeader, Framer};

#[test]
fn frame_header_parse() {
    let header_bytes = [0, 5, 0, 1, 0, 0, 0, 1];
    let header = FrameHeader::parse(&header_bytes).unwrap();
    assert_eq!(header.length, 5);
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.stream_id, 1);
}

#[test]
fn stream_id_clears_reserved_bit() {
    let header_bytes = [0, 0, 4, 0, 0x80, 0x00, 0x00, 0x05];
    let header = FrameHeader::parse(&header_bytes).unwrap();
    assert_eq!(header.stream_id, 5);
}

#[test]
fn total_size_is_header_plus_length() {
    let header = FrameHeader { length: 100, frame_type: 0, flags: 0, stream_id: 1 };
    assert_eq!(header.total_size(), 108);
}

#[test]
fn parse_returns_none_on_incomplete_header() {
    let bytes = [0, 5, 0, 1, 0, 0, 0];
    assert_eq!(Framer::parse(&bytes).unwrap(), None);
}

#[test]
fn parse_returns_none_on_incomplete_payload() {
    let mut bytes = vec![0, 5, 0, 1, 0, 0, 0, 1];
    bytes.extend_from_slice(b"hel");
    assert_eq!(Framer::parse(&bytes).unwrap(), None);
}

#[test]
fn parse_data_frame() {
    let mut bytes = vec![0, 5, 0, 1, 0, 0, 0, 1];
    bytes.extend_from_slice(b"hello");
    let (frame, consumed) = Framer::parse(&bytes).unwrap().unwrap();
    assert_eq!(consumed, 13);
    match frame {
        Frame::Data { stream_id, flags, payload } => {
            assert_eq!(stream_id, 1);
            assert!(flags.end_stream);
            assert_eq!(payload, b"hello");
        }
        other => panic!("expected Data, got {other:?}"),
    }
}

#[test]
fn parse_headers_frame_with_priority_flag() {
    let mut bytes = vec![0, 5, 1, 0x24, 0, 0, 0, 1]; // END_HEADERS not set, PRIORITY set
    bytes.extend_from_slice(&[0, 0, 0, 0]); // priority dependency word
    bytes.extend_from_slice(&[0x82]); // 1-byte "header block"
    let (frame, consumed) = Framer::parse(&bytes).unwrap().unwrap();
    assert_eq!(consumed, 13);
    match frame {
        Frame::Headers { priority, header_block, .. } => {
            assert_eq!(priority, Some(0));
            assert_eq!(header_block, vec![0x82]);
        }
        other => panic!("expected Headers, got {other:?}"),
    }
}

#[test]
fn parse_settings_frame_pairs() {
    let mut bytes = vec![0, 16, 4, 0, 0, 0, 0, 0];
    bytes.extend_from_slice(&4u32.to_be_bytes());
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(&7u32.to_be_bytes());
    bytes.extend_from_slice(&65535u32.to_be_bytes());
    let (frame, _) = Framer::parse(&bytes).unwrap().unwrap();
    match frame {
        Frame::Settings { params, .. } => {
            assert_eq!(params, vec![(4, 100), (7, 65535)]);
        }
        other => panic!("expected Settings, got {other:?}"),
    }
}

#[test]
fn parse_leaves_trailing_bytes_untouched() {
    // Zero-length DATA frame on stream 1, followed by unrelated bytes.
    let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 1];
    bytes.extend_from_slice(&[0xFF, 0xFF]);
    let (_, consumed) = Framer::parse(&bytes).unwrap().unwrap();
    assert_eq!(consumed, 8);
    assert_eq!(&bytes[consumed..], &[0xFF, 0xFF]);
}
