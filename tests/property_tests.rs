//! Property-based tests using proptest
//!
//! Queue ordering, packet framing and opcode mapping across randomly
//! generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use match_sync::core::codec::{BincodeCodec, FrameCodec, PacketCodec};
use match_sync::core::message::Message;
use match_sync::core::opcode::Opcode;
use match_sync::core::packet::{Packet, HEADER_LEN, MAX_PAYLOAD_LEN};
use match_sync::error::ProtocolError;
use match_sync::utils::SafeQueue;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn any_opcode() -> impl Strategy<Value = Opcode> {
    (1i16..=14).prop_map(|raw| Opcode::try_from(raw).unwrap())
}

// Property: a queue hands items back in exactly the order they went in
proptest! {
    #[test]
    fn prop_queue_is_fifo(items in prop::collection::vec(any::<u32>(), 0..500)) {
        let queue = SafeQueue::new();
        for item in &items {
            queue.enqueue(*item);
        }
        prop_assert_eq!(queue.len(), items.len());

        let mut drained = Vec::new();
        while let Some(item) = queue.try_dequeue() {
            drained.push(item);
        }
        prop_assert_eq!(drained, items);
        prop_assert!(queue.is_empty());
    }
}

// Property: interleaved enqueue/dequeue never reorders
proptest! {
    #[test]
    fn prop_queue_interleaved(ops in prop::collection::vec(any::<bool>(), 0..400)) {
        let queue = SafeQueue::new();
        let mut next = 0u32;
        let mut expected = 0u32;
        for push in ops {
            if push {
                queue.enqueue(next);
                next += 1;
            } else if let Some(item) = queue.try_dequeue() {
                prop_assert_eq!(item, expected);
                expected += 1;
            } else {
                prop_assert_eq!(expected, next);
            }
        }
    }
}

// Property: the header always carries the opcode and the exact payload length
proptest! {
    #[test]
    fn prop_header_describes_payload(
        opcode in any_opcode(),
        payload in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let bytes = Packet::new(opcode, payload.clone()).to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), HEADER_LEN + payload.len());
        prop_assert_eq!(i16::from_be_bytes([bytes[0], bytes[1]]), opcode.as_i16());
        prop_assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]) as usize, payload.len());
        prop_assert_eq!(&bytes[HEADER_LEN..], &payload[..]);
    }
}

// Property: no valid buffer is larger than the maximum message size
proptest! {
    #[test]
    fn prop_oversized_payload_is_rejected(extra in 1usize..1024) {
        let packet = Packet::new(Opcode::Chat, vec![0; MAX_PAYLOAD_LEN + extra]);
        let rejected = matches!(packet.to_bytes(), Err(ProtocolError::OversizedPacket(_)));
        prop_assert!(rejected);
    }
}

// Property: arbitrary stream splits never change the decoded frames
proptest! {
    #[test]
    fn prop_frames_survive_any_split(
        scores in prop::collection::vec(any::<i32>(), 1..40),
        split in any::<prop::sample::Index>(),
    ) {
        let mut wire = BytesMut::new();
        for score in &scores {
            let bytes = BincodeCodec.encode(&Message::PlayerInput { new_score: *score }).unwrap();
            wire.extend_from_slice(&bytes);
        }
        let cut = split.index(wire.len() + 1);

        let mut codec = FrameCodec;
        let mut buffer = BytesMut::from(&wire[..cut]);
        let mut decoded = Vec::new();
        while let Some(packet) = codec.decode(&mut buffer).unwrap() {
            decoded.push(packet);
        }
        buffer.extend_from_slice(&wire[cut..]);
        while let Some(packet) = codec.decode(&mut buffer).unwrap() {
            decoded.push(packet);
        }

        let decoded: Vec<i32> = decoded
            .iter()
            .map(|packet| match Message::from_packet(packet).unwrap() {
                Message::PlayerInput { new_score } => new_score,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        prop_assert_eq!(decoded, scores);
    }
}

// Property: opcodes outside 0..=14 never map to a message kind
proptest! {
    #[test]
    fn prop_unknown_opcodes_are_rejected(raw in any::<i16>()) {
        let result = Opcode::try_from(raw);
        if (0..=14).contains(&raw) {
            prop_assert_eq!(result.unwrap().as_i16(), raw);
        } else {
            prop_assert!(result.is_err());
        }
    }
}

// Property: truncated buffers never decode
proptest! {
    #[test]
    fn prop_truncated_buffers_fail(chat_id in any::<i16>(), keep in 0usize..6) {
        let bytes = BincodeCodec.encode(&Message::Chat { chat_id }).unwrap();
        prop_assume!(keep < bytes.len());
        prop_assert!(BincodeCodec.decode(&bytes[..keep]).is_err());
    }
}
