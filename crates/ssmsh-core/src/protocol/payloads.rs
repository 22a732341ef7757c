//! JSON payloads carried inside agent messages.
//!
//! The SSM service uses PascalCase keys throughout; structs here rename
//! accordingly and default missing fields, since agent builds differ in
//! which ones they send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::CLIENT_VERSION;
use crate::protocol::{ActionStatus, ActionType};

/// The first frame sent on a fresh websocket, as text, to bind the
/// connection to the session token minted by `StartSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OpenDataChannelInput {
    pub message_schema_version: String,
    pub request_id: String,
    pub token_value: String,
}

/// Payload of an `acknowledge` message, echoing the message it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcknowledgeContent {
    pub acknowledged_message_type: String,
    pub acknowledged_message_id: String,
    pub acknowledged_message_sequence_number: i64,
    pub is_sequential_message: bool,
}

/// Handshake offer sent by the agent on port-based sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HandshakeRequestPayload {
    pub agent_version: String,
    pub requested_client_actions: Vec<RequestedClientAction>,
}

/// One action the agent asks the client to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestedClientAction {
    pub action_type: ActionType,
    pub action_parameters: Value,
}

/// The client's answer to a handshake request. `ProcessedClientActions`
/// carries one entry per requested action, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HandshakeResponsePayload {
    pub client_version: String,
    pub processed_client_actions: Vec<ProcessedClientAction>,
    pub errors: Vec<String>,
}

/// Result of one requested action. A defaulted entry (empty type, zero
/// status) marks an action the client neither accepted nor rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProcessedClientAction {
    pub action_type: ActionType,
    pub action_status: ActionStatus,
    pub action_result: Value,
    pub error: String,
}

/// Sent by the agent once handshake negotiation succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HandshakeCompletePayload {
    /// Nanoseconds the agent spent completing the handshake.
    pub handshake_time_to_complete: i64,
    pub customer_message: String,
}

/// Payload of a `channel_closed` message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChannelClosedPayload {
    pub message_type: String,
    pub message_id: String,
    pub destination_id: String,
    pub session_id: String,
    pub schema_version: i64,
    pub created_date: String,
    pub output: String,
}

/// Terminal dimensions sent with the `Size` payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDimensions {
    pub cols: u32,
    pub rows: u32,
}

/// Build the response to a handshake request.
///
/// The agent requires an entry per requested action and treats anything but
/// `Success` as a failure. Port-based sessions only ever request
/// `SessionType`; other action types get an empty entry, neither accepted
/// nor rejected.
pub fn build_handshake_response(actions: &[RequestedClientAction]) -> HandshakeResponsePayload {
    let processed = actions
        .iter()
        .map(|action| {
            if action.action_type == ActionType::SessionType {
                ProcessedClientAction {
                    action_type: ActionType::SessionType,
                    action_status: ActionStatus::Success,
                    ..Default::default()
                }
            } else {
                ProcessedClientAction::default()
            }
        })
        .collect();

    HandshakeResponsePayload {
        client_version: CLIENT_VERSION.to_string(),
        processed_client_actions: processed,
        errors: Vec::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================
