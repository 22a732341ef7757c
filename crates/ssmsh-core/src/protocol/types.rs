//! Enumerated labels used in `AgentMessage` fields and handshake payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Message Types
// =============================================================================

/// Label carried in the 32-byte message-type field.
///
/// Unknown labels survive decoding as [`MessageType::Other`] so the data
/// channel can reject them with context instead of the codec failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    InteractiveShell,
    TaskReply,
    TaskComplete,
    Acknowledge,
    AgentSession,
    ChannelClosed,
    OutputStreamData,
    InputStreamData,
    PausePublication,
    StartPublication,
    Other(String),
}

impl MessageType {
    /// The wire label for this message type.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::InteractiveShell => "interactive_shell",
            MessageType::TaskReply => "agent_task_reply",
            MessageType::TaskComplete => "agent_task_complete",
            MessageType::Acknowledge => "acknowledge",
            MessageType::AgentSession => "agent_session_state",
            MessageType::ChannelClosed => "channel_closed",
            MessageType::OutputStreamData => "output_stream_data",
            MessageType::InputStreamData => "input_stream_data",
            MessageType::PausePublication => "pause_publication",
            MessageType::StartPublication => "start_publication",
            MessageType::Other(label) => label,
        }
    }

    /// Map a trimmed wire label back to a message type.
    pub fn from_label(label: &str) -> Self {
        match label {
            "interactive_shell" => MessageType::InteractiveShell,
            "agent_task_reply" => MessageType::TaskReply,
            "agent_task_complete" => MessageType::TaskComplete,
            "acknowledge" => MessageType::Acknowledge,
            "agent_session_state" => MessageType::AgentSession,
            "channel_closed" => MessageType::ChannelClosed,
            "output_stream_data" => MessageType::OutputStreamData,
            "input_stream_data" => MessageType::InputStreamData,
            "pause_publication" => MessageType::PausePublication,
            "start_publication" => MessageType::StartPublication,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Message Flags
// =============================================================================

/// Connection-lifecycle flag carried in the 8-byte flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFlags {
    #[default]
    Data,
    Syn,
    Fin,
    Ack,
}

impl MessageFlags {
    pub fn to_wire(self) -> u64 {
        match self {
            MessageFlags::Data => 0,
            MessageFlags::Syn => 1,
            MessageFlags::Fin => 2,
            MessageFlags::Ack => 3,
        }
    }

    pub fn from_wire(value: u64) -> Option<Self> {
        match value {
            0 => Some(MessageFlags::Data),
            1 => Some(MessageFlags::Syn),
            2 => Some(MessageFlags::Fin),
            3 => Some(MessageFlags::Ack),
            _ => None,
        }
    }
}

// =============================================================================
// Payload Types
// =============================================================================

/// Interpretation of the payload bytes, from the 4-byte payload-type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadType {
    #[default]
    Undefined,
    Output,
    Error,
    Size,
    Parameter,
    HandshakeRequest,
    HandshakeResponse,
    HandshakeComplete,
    EncChallengeRequest,
    EncChallengeResponse,
    Flag,
    Other(u32),
}

impl PayloadType {
    pub fn to_wire(self) -> u32 {
        match self {
            PayloadType::Undefined => 0,
            PayloadType::Output => 1,
            PayloadType::Error => 2,
            PayloadType::Size => 3,
            PayloadType::Parameter => 4,
            PayloadType::HandshakeRequest => 5,
            PayloadType::HandshakeResponse => 6,
            PayloadType::HandshakeComplete => 7,
            PayloadType::EncChallengeRequest => 8,
            PayloadType::EncChallengeResponse => 9,
            PayloadType::Flag => 10,
            PayloadType::Other(value) => value,
        }
    }

    pub fn from_wire(value: u32) -> Self {
        match value {
            0 => PayloadType::Undefined,
            1 => PayloadType::Output,
            2 => PayloadType::Error,
            3 => PayloadType::Size,
            4 => PayloadType::Parameter,
            5 => PayloadType::HandshakeRequest,
            6 => PayloadType::HandshakeResponse,
            7 => PayloadType::HandshakeComplete,
            8 => PayloadType::EncChallengeRequest,
            9 => PayloadType::EncChallengeResponse,
            10 => PayloadType::Flag,
            other => PayloadType::Other(other),
        }
    }
}

// =============================================================================
// Flag Payloads
// =============================================================================

/// Control code carried as a 4-byte big-endian payload when the payload type
/// is [`PayloadType::Flag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadTypeFlag {
    DisconnectToPort,
    TerminateSession,
    ConnectToPortError,
}

impl PayloadTypeFlag {
    pub fn to_wire(self) -> u32 {
        match self {
            PayloadTypeFlag::DisconnectToPort => 1,
            PayloadTypeFlag::TerminateSession => 2,
            PayloadTypeFlag::ConnectToPortError => 3,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(PayloadTypeFlag::DisconnectToPort),
            2 => Some(PayloadTypeFlag::TerminateSession),
            3 => Some(PayloadTypeFlag::ConnectToPortError),
            _ => None,
        }
    }
}

// =============================================================================
// Handshake Actions
// =============================================================================

/// Action offered by the agent during the session handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "KMSEncryption")]
    KmsEncryption,
    #[serde(rename = "SessionType")]
    SessionType,
    /// Action types this client does not recognize; the label is preserved.
    #[serde(untagged)]
    Other(String),
}

impl Default for ActionType {
    fn default() -> Self {
        ActionType::Other(String::new())
    }
}

/// Result of processing a requested client action, as an integer on the wire.
/// Zero marks an entry that was neither accepted nor rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ActionStatus {
    #[default]
    Unset,
    Success,
    Failed,
    Unsupported,
    Other(i32),
}

impl From<i32> for ActionStatus {
    fn from(value: i32) -> Self {
        match value {
            0 => ActionStatus::Unset,
            1 => ActionStatus::Success,
            2 => ActionStatus::Failed,
            3 => ActionStatus::Unsupported,
            other => ActionStatus::Other(other),
        }
    }
}

impl From<ActionStatus> for i32 {
    fn from(status: ActionStatus) -> Self {
        match status {
            ActionStatus::Unset => 0,
            ActionStatus::Success => 1,
            ActionStatus::Failed => 2,
            ActionStatus::Unsupported => 3,
            ActionStatus::Other(value) => value,
        }
    }
}
