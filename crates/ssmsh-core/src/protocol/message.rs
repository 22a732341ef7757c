//! Binary wire codec for `AgentMessage`.
//!
//! Layout (big-endian, offsets in bytes):
//!
//! ```text
//! [0..4)    header length (116; 112 observed on channel_closed)
//! [4..36)   message type, space-padded (channel_closed may be NUL-padded)
//! [36..40)  schema version
//! [40..48)  created date, milliseconds since the Unix epoch
//! [48..56)  sequence number (signed)
//! [56..64)  flags
//! [64..80)  message id, UUID with its two 8-byte halves swapped
//! [80..112) SHA-256 digest of the payload
//! [112..116) payload type (absent when header length is 112)
//! [hl..hl+4) payload length
//! [hl+4..)  payload
//! ```
//!
//! The UUID half-swap mirrors the agent's .NET-style binary layout; decoded
//! messages carry a standard RFC 4122 UUID and the swap is reapplied on
//! encode so the wire bytes are unchanged.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::{
    AGENT_MSG_HEADER_LEN, AGENT_MSG_SHORT_HEADER_LEN, MIN_MSG_TYPE_LEN, MSG_TYPE_FIELD_LEN,
    SCHEMA_VERSION,
};
use crate::error::{Error, Result};
use crate::protocol::{MessageFlags, MessageType, PayloadType};

const DIGEST_LEN: usize = 32;

/// One message of the SSM session protocol.
///
/// [`AgentMessage::new`] fills the bookkeeping fields (schema version,
/// creation time, a fresh message id); callers set the sequence number,
/// flags, payload type and payload before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub message_type: MessageType,
    pub schema_version: u32,
    /// Milliseconds since the Unix epoch.
    pub created_date: u64,
    pub sequence_number: i64,
    pub flags: MessageFlags,
    pub message_id: Uuid,
    pub payload_type: PayloadType,
    pub payload: Bytes,
}

impl AgentMessage {
    /// Create a message ready to load with a payload.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            schema_version: SCHEMA_VERSION,
            created_date: now_millis(),
            sequence_number: 0,
            flags: MessageFlags::Data,
            message_id: Uuid::new_v4(),
            payload_type: PayloadType::Undefined,
            payload: Bytes::new(),
        }
    }

    /// Encode to the wire format, computing the payload digest and length.
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;

        let digest = Sha256::digest(&self.payload);

        let mut buf =
            BytesMut::with_capacity(AGENT_MSG_HEADER_LEN + 4 + self.payload.len());
        buf.put_u32(AGENT_MSG_HEADER_LEN as u32);
        buf.put_slice(&pad_label(self.message_type.as_str()));
        buf.put_u32(self.schema_version);
        buf.put_u64(self.created_date);
        buf.put_i64(self.sequence_number);
        buf.put_u64(self.flags.to_wire());
        buf.put_slice(&swap_uuid_halves(self.message_id.as_bytes()));
        buf.put_slice(&digest);
        buf.put_u32(self.payload_type.to_wire());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    /// Decode from the wire format, re-checking every structural invariant.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < AGENT_MSG_SHORT_HEADER_LEN + 4 {
            return Err(Error::validation(format!(
                "truncated frame: {} bytes",
                data.len()
            )));
        }

        let header_len = read_u32(data, 0) as usize;
        if !(AGENT_MSG_SHORT_HEADER_LEN..=AGENT_MSG_HEADER_LEN).contains(&header_len) {
            return Err(Error::validation(format!(
                "invalid header length {header_len}"
            )));
        }
        if data.len() < header_len + 4 {
            return Err(Error::validation(format!(
                "truncated frame: {} bytes for header length {header_len}",
                data.len()
            )));
        }

        let label = trim_label(&data[4..4 + MSG_TYPE_FIELD_LEN]);
        if label.len() < MIN_MSG_TYPE_LEN {
            return Err(Error::validation(format!(
                "message type too short: {label:?}"
            )));
        }
        let message_type = MessageType::from_label(&label);

        let schema_version = read_u32(data, 36);
        if schema_version < 1 {
            return Err(Error::validation("invalid schema version 0"));
        }

        let created_date = read_u64(data, 40);
        if created_date == 0 {
            return Err(Error::validation("invalid message date"));
        }

        let sequence_number = read_u64(data, 48) as i64;
        let flags_raw = read_u64(data, 56);
        let flags = MessageFlags::from_wire(flags_raw)
            .ok_or_else(|| Error::validation(format!("invalid flags value {flags_raw}")))?;

        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&data[64..80]);
        let message_id = Uuid::from_bytes(swap_uuid_halves(&uuid_bytes));

        // channel_closed drops the payload-type word, shrinking the header
        let payload_type = if header_len == AGENT_MSG_HEADER_LEN {
            PayloadType::from_wire(read_u32(data, 112))
        } else {
            PayloadType::Undefined
        };

        let payload_len = read_u32(data, header_len) as usize;
        let payload_start = header_len + 4;
        if data.len() < payload_start + payload_len {
            return Err(Error::validation(format!(
                "payload length mismatch, want {payload_len}, have {}",
                data.len() - payload_start
            )));
        }
        let payload = Bytes::copy_from_slice(&data[payload_start..payload_start + payload_len]);

        let digest = Sha256::digest(&payload);
        if digest.as_slice() != &data[80..80 + DIGEST_LEN] {
            return Err(Error::validation("payload digest mismatch"));
        }

        Ok(Self {
            message_type,
            schema_version,
            created_date,
            sequence_number,
            flags,
            message_id,
            payload_type,
            payload,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.schema_version < 1 {
            return Err(Error::validation("invalid schema version 0"));
        }
        if self.message_type.as_str().len() < MIN_MSG_TYPE_LEN {
            return Err(Error::validation(format!(
                "message type too short: {:?}",
                self.message_type.as_str()
            )));
        }
        if self.created_date == 0 {
            return Err(Error::validation("invalid message date"));
        }
        Ok(())
    }
}

impl fmt::Display for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AgentMessage{{type: {}, seq: {}, flags: {:?}, payload type: {:?}, payload length: {}}}",
            self.message_type,
            self.sequence_number,
            self.flags,
            self.payload_type,
            self.payload.len()
        )
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
}

/// Right-pad the label with spaces to the field width; overlength labels are
/// truncated.
fn pad_label(label: &str) -> [u8; MSG_TYPE_FIELD_LEN] {
    let mut out = [0x20u8; MSG_TYPE_FIELD_LEN];
    let bytes = label.as_bytes();
    let n = bytes.len().min(MSG_TYPE_FIELD_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Strip trailing NULs then trailing spaces: channel_closed is NUL-padded,
/// everything else is space-padded.
fn trim_label(field: &[u8]) -> String {
    let mut end = field.len();
    while end > 0 && field[end - 1] == 0x00 {
        end -= 1;
    }
    while end > 0 && field[end - 1] == 0x20 {
        end -= 1;
    }
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Swap the two 8-byte halves of a UUID, converting between the agent's
/// binary layout and RFC 4122 byte order. The swap is its own inverse.
fn swap_uuid_halves(bytes: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&bytes[8..]);
    out[8..].copy_from_slice(&bytes[..8]);
    out
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

// =============================================================================
// Tests
// =============================================================================
