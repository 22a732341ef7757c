//! Test support for ssmsh: an in-memory frame transport and helpers that
//! play the remote agent's side of the session protocol.

mod mock_transport;

pub use mock_transport::{mock_transport, AgentHandle, MockFrameSink, MockFrameSource, SentFrame};

use bytes::Bytes;
use ssmsh_core::protocol::{
    AgentMessage, MessageFlags, MessageType, PayloadType, RequestedClientAction,
};

/// An `output_stream_data`/`Output` message as the agent would send it.
pub fn output_data(sequence_number: i64, payload: &[u8]) -> AgentMessage {
    let mut msg = AgentMessage::new(MessageType::OutputStreamData);
    msg.sequence_number = sequence_number;
    msg.payload_type = PayloadType::Output;
    msg.payload = Bytes::copy_from_slice(payload);
    msg
}

/// The agent's handshake offer.
pub fn handshake_request(
    sequence_number: i64,
    actions: &[RequestedClientAction],
) -> AgentMessage {
    let request = ssmsh_core::protocol::HandshakeRequestPayload {
        agent_version: "3.1.0.0".to_string(),
        requested_client_actions: actions.to_vec(),
    };
    let mut msg = AgentMessage::new(MessageType::OutputStreamData);
    msg.sequence_number = sequence_number;
    msg.payload_type = PayloadType::HandshakeRequest;
    msg.payload = serde_json::to_vec(&request)
        .expect("handshake request serializes")
        .into();
    msg
}

/// The agent's handshake completion notice.
pub fn handshake_complete(sequence_number: i64) -> AgentMessage {
    let mut msg = AgentMessage::new(MessageType::OutputStreamData);
    msg.sequence_number = sequence_number;
    msg.payload_type = PayloadType::HandshakeComplete;
    msg.payload = Bytes::from_static(b"{\"HandshakeTimeToComplete\": 1000000}");
    msg
}

/// An `acknowledge` from the agent for one of our messages.
pub fn acknowledge(sequence_number: i64) -> AgentMessage {
    let mut msg = AgentMessage::new(MessageType::Acknowledge);
    msg.flags = MessageFlags::Ack;
    msg.sequence_number = sequence_number;
    msg.payload = Bytes::from_static(b"{}");
    msg
}

/// A `channel_closed` message with optional final output.
pub fn channel_closed(sequence_number: i64, output: &str) -> AgentMessage {
    let payload = serde_json::json!({
        "MessageType": "channel_closed",
        "SessionId": "test-session",
        "Output": output,
    });
    let mut msg = AgentMessage::new(MessageType::ChannelClosed);
    msg.sequence_number = sequence_number;
    msg.payload = serde_json::to_vec(&payload)
        .expect("channel_closed payload serializes")
        .into();
    msg
}
