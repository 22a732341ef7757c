//! The SSM agent-message protocol: enumerated labels, the binary wire codec
//! and the JSON payloads carried inside messages.

mod message;
mod payloads;
mod types;

#[cfg(test)]
mod proptest;

pub use message::AgentMessage;
pub use payloads::{
    build_handshake_response, AcknowledgeContent, ChannelClosedPayload, HandshakeCompletePayload,
    HandshakeRequestPayload, HandshakeResponsePayload, OpenDataChannelInput, ProcessedClientAction,
    RequestedClientAction, TerminalDimensions,
};
pub use types::{ActionStatus, ActionType, MessageFlags, MessageType, PayloadType, PayloadTypeFlag};
