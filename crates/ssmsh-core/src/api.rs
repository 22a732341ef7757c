//! Seam to the SSM control plane.
//!
//! The `StartSession` REST call (and the credential machinery behind it)
//! lives outside this crate; callers hand the data channel an implementation
//! of [`SessionApi`] that returns the stream URL and token the service
//! minted for the session.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::constants::{DOC_PORT_FORWARDING, DOC_SSH};
use crate::error::Result;

/// Parameters of the SSM `StartSession` call.
#[derive(Debug, Clone, Default)]
pub struct StartSessionInput {
    /// Session document; `None` lets the service default to its standard
    /// shell document.
    pub document_name: Option<String>,
    /// Instance to connect to (`i-...` or `mi-...`).
    pub target: String,
    /// Document parameters; the service expects every value as a list of
    /// strings.
    pub parameters: HashMap<String, Vec<String>>,
}

impl StartSessionInput {
    /// A plain shell session against the service's default document.
    pub fn shell(target: impl Into<String>) -> Self {
        Self {
            document_name: None,
            target: target.into(),
            parameters: HashMap::new(),
        }
    }

    /// A port forwarding session. Ports travel as decimal strings; a local
    /// port of zero asks for an ephemeral one.
    pub fn port_forwarding(target: impl Into<String>, local_port: u16, remote_port: u16) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert(
            "localPortNumber".to_string(),
            vec![local_port.to_string()],
        );
        parameters.insert("portNumber".to_string(), vec![remote_port.to_string()]);

        Self {
            document_name: Some(DOC_PORT_FORWARDING.to_string()),
            target: target.into(),
            parameters,
        }
    }

    /// An SSH session; only the remote port is negotiated.
    pub fn ssh(target: impl Into<String>, remote_port: u16) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("portNumber".to_string(), vec![remote_port.to_string()]);

        Self {
            document_name: Some(DOC_SSH.to_string()),
            target: target.into(),
            parameters,
        }
    }
}

/// What `StartSession` returns: everything needed to dial the data channel.
#[derive(Debug, Clone)]
pub struct StartSessionOutput {
    pub session_id: String,
    pub stream_url: String,
    pub token_value: String,
}

/// The SSM control-plane call that mints a streaming session.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start_session(&self, input: &StartSessionInput) -> Result<StartSessionOutput>;
}
