//! Property tests for incremental unpacking.

use hpfeeds_client::protocol::{
    encode_error, encode_info, encode_publish, encode_subscribe, Frame, Header, Opcode, Unpacker,
};
use proptest::prelude::*;

/// Any well-formed message this client may see on the wire.
fn message() -> impl Strategy<Value = Vec<u8>> {
    let text = || proptest::collection::vec(any::<u8>(), 0..64);
    prop_oneof![
        (text(), text(), proptest::collection::vec(any::<u8>(), 0..2048))
            .prop_map(|(ident, channel, data)| {
                encode_publish(&ident, &channel, &data).unwrap().to_vec()
            }),
        (text(), text()).prop_map(|(name, nonce)| encode_info(&name, &nonce).unwrap().to_vec()),
        text().prop_map(|ident| encode_subscribe(&ident, b"chan").unwrap().to_vec()),
        text().prop_map(|msg| encode_error(&msg).unwrap().to_vec()),
    ]
}

proptest! {
    #[test]
    fn split_points_do_not_change_frames(
        messages in proptest::collection::vec(message(), 1..8),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let stream: Vec<u8> = messages.concat();

        let mut whole = Unpacker::new();
        let expected = whole.push(&stream).unwrap();
        prop_assert_eq!(expected.len(), messages.len());

        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len())).collect();
        points.push(stream.len());
        points.sort_unstable();

        let mut pieces = Unpacker::new();
        let mut got: Vec<Frame> = Vec::new();
        let mut start = 0;
        for end in points {
            got.extend(pieces.push(&stream[start..end]).unwrap());
            start = end;
        }

        prop_assert_eq!(got, expected);
        prop_assert!(pieces.is_empty());
    }

    #[test]
    fn oversized_headers_never_yield_frames(
        raw_opcode in 0u8..8,
        excess in 1i32..4096,
        trailing in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let opcode = Opcode::from(raw_opcode);
        let length = opcode.max_frame_len() as i32 + excess;

        let mut unpacker = Unpacker::new();
        unpacker.feed(&Header::new(length, opcode).encode());
        unpacker.feed(&trailing);
        prop_assert!(unpacker.next_frame().is_err());
    }
}
