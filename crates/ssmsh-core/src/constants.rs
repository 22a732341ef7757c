//! Protocol and configuration constants for ssmsh.

use std::time::Duration;

// =============================================================================
// Wire Layout Constants
// =============================================================================

/// Size of the fixed `AgentMessage` header, excluding the payload length
/// word and the payload itself.
pub const AGENT_MSG_HEADER_LEN: usize = 116;

/// Header size observed on `channel_closed` messages, which omit the
/// payload-type word.
pub const AGENT_MSG_SHORT_HEADER_LEN: usize = 112;

/// Wire width of the message-type label field.
pub const MSG_TYPE_FIELD_LEN: usize = 32;

/// Shortest message-type label accepted by the codec.
pub const MIN_MSG_TYPE_LEN: usize = 10;

/// Schema version stamped on outbound messages.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema version string sent in the data-channel open frame.
pub const MESSAGE_SCHEMA_VERSION: &str = "1.0";

/// Client version reported in handshake responses. Certain agent features
/// gate on this (stream muxing needs at least 1.1.70, which we do not do).
pub const CLIENT_VERSION: &str = "0.0.1";

// =============================================================================
// Channel Constants
// =============================================================================

/// Capacity of the inbound reorder and outbound retransmit buffers.
pub const MESSAGE_BUFFER_CAPACITY: usize = 50;

/// Interval between retransmission sweeps over the outbound buffer.
pub const RESEND_INTERVAL: Duration = Duration::from_millis(500);

/// Payload chunk size used when pumping a local byte source into the
/// channel; matches the websocket default max packet size.
pub const WS_FRAME_SIZE: usize = 1536;

// =============================================================================
// Session Documents
// =============================================================================

/// SSM document starting a port forwarding session.
pub const DOC_PORT_FORWARDING: &str = "AWS-StartPortForwardingSession";

/// SSM document starting an SSH session.
pub const DOC_SSH: &str = "AWS-StartSSHSession";

/// Remote port used for SSH sessions when none is given.
pub const DEFAULT_SSH_PORT: u16 = 22;

// =============================================================================
// Terminal Defaults
// =============================================================================

/// Interval between terminal-size pushes during a shell session.
pub const TERMINAL_SIZE_INTERVAL: Duration = Duration::from_millis(500);

/// Rows reported when the local window-size query fails.
pub const DEFAULT_TERM_ROWS: u32 = 45;

/// Columns reported when the local window-size query fails.
pub const DEFAULT_TERM_COLS: u32 = 132;
