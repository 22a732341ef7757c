//! ssmsh-core: the streaming protocol behind AWS SSM Session Manager.
//!
//! This crate provides:
//! - The `AgentMessage` binary codec and its enumerated labels
//! - JSON payload types carried inside agent messages
//! - The bounded, sequence-indexed message buffer
//! - The data channel: websocket ownership, sequencing, acknowledgements,
//!   the session handshake and the retransmission sweeper
//! - The `SessionApi` seam to the SSM control plane
//! - Logging setup

pub mod api;
pub mod buffer;
pub mod channel;
pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
