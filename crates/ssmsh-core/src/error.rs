//! Error types for ssmsh-core.

use thiserror::Error;

/// Main error type for ssmsh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed `AgentMessage`: bad header, schema, label, date, digest
    /// or payload length.
    #[error("malformed message: {message}")]
    Validation { message: String },

    /// Websocket frame too short to hold an agent-message header.
    #[error("frame too short: {len} bytes")]
    ShortFrame { len: usize },

    /// Message buffer is at capacity.
    #[error("buffer full")]
    BufferFull,

    /// Well-formed frame with a message/payload type combination we do not
    /// handle.
    #[error("unknown message: type {message_type:?}, payload type {payload_type}")]
    UnknownMessage {
        message_type: String,
        payload_type: u32,
    },

    /// Clean shutdown of the data channel.
    #[error("end of stream")]
    EndOfStream,

    /// Websocket or socket failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Failure from the external SSM control-plane call.
    #[error("session API error: {message}")]
    Api { message: String },

    /// JSON payload could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a codec validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Returns true for the clean end-of-stream condition, which callers
    /// treat as a normal shutdown rather than a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

/// Convenience result type for ssmsh operations.
pub type Result<T> = std::result::Result<T, Error>;
