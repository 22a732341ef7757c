//! Property-based tests for the agent-message codec.
//!
//! These verify:
//! - Encode/decode roundtrip for arbitrary field values
//! - The decoder never panics on arbitrary input
//! - Payload tampering is always caught by the digest check

#![cfg(test)]

use bytes::Bytes;
use proptest::prelude::*;
use uuid::Uuid;

use crate::protocol::{AgentMessage, MessageFlags, MessageType, PayloadType};

fn arb_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::InteractiveShell),
        Just(MessageType::Acknowledge),
        Just(MessageType::ChannelClosed),
        Just(MessageType::OutputStreamData),
        Just(MessageType::InputStreamData),
        Just(MessageType::PausePublication),
        Just(MessageType::StartPublication),
        // arbitrary labels at least as long as the minimum, at most the field
        // width; canonicalized the way the decoder would read them back
        "[a-z_]{10,32}".prop_map(|label| MessageType::from_label(&label)),
    ]
}

fn arb_flags() -> impl Strategy<Value = MessageFlags> {
    prop_oneof![
        Just(MessageFlags::Data),
        Just(MessageFlags::Syn),
        Just(MessageFlags::Fin),
        Just(MessageFlags::Ack),
    ]
}

fn arb_payload_type() -> impl Strategy<Value = PayloadType> {
    (0u32..=10).prop_map(PayloadType::from_wire)
}

prop_compose! {
    fn arb_message()(
        message_type in arb_message_type(),
        schema_version in 1u32..=4,
        created_date in 1u64..=u64::from(u32::MAX) * 1000,
        sequence_number in any::<i64>(),
        flags in arb_flags(),
        uuid_bytes in any::<[u8; 16]>(),
        payload_type in arb_payload_type(),
        payload in prop::collection::vec(any::<u8>(), 0..2048),
    ) -> AgentMessage {
        AgentMessage {
            message_type,
            schema_version,
            created_date,
            sequence_number,
            flags,
            message_id: Uuid::from_bytes(uuid_bytes),
            payload_type,
            payload: Bytes::from(payload),
        }
    }
}

proptest! {
    #[test]
    fn roundtrip_preserves_all_fields(msg in arb_message()) {
        let encoded = msg.encode().unwrap();
        let decoded = AgentMessage::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = AgentMessage::decode(&data);
    }

    #[test]
    fn any_payload_byte_flip_is_detected(
        msg in arb_message(),
        flip in any::<proptest::sample::Index>(),
    ) {
        prop_assume!(!msg.payload.is_empty());
        let encoded = msg.encode().unwrap();
        let mut tampered = encoded.to_vec();
        let payload_start = 120;
        let idx = payload_start + flip.index(tampered.len() - payload_start);
        tampered[idx] ^= 0x01;
        prop_assert!(AgentMessage::decode(&tampered).is_err());
    }
}
