//! Interactive shell session orchestration.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use ssmsh_core::api::{SessionApi, StartSessionInput};
use ssmsh_core::channel::DataChannel;
use ssmsh_core::error::Result;

use crate::signals::install_signal_handler;
use crate::terminal::TerminalSession;

/// Optional knobs for a shell session.
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Byte chunks written into the channel before the interactive loops
    /// start, e.g. a command to run on login.
    pub initial_input: Vec<Bytes>,
}

/// Start an interactive shell on the target instance, bridging the local
/// terminal to the remote session until either side ends.
pub async fn shell_session(api: &dyn SessionApi, target: &str) -> Result<()> {
    shell_session_with(api, target, ShellConfig::default()).await
}

/// [`shell_session`] with explicit configuration.
pub async fn shell_session_with(
    api: &dyn SessionApi,
    target: &str,
    config: ShellConfig,
) -> Result<()> {
    let input = StartSessionInput::shell(target);
    let channel = Arc::new(DataChannel::open(api, &input).await?);

    // raw stdin plus size updates; restores the terminal when dropped
    let terminal = TerminalSession::initialize(&channel)?;
    install_signal_handler(&channel);

    for chunk in &config.initial_input {
        channel.write(chunk).await?;
    }

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let result = copy_bidirectional(&channel, &mut stdin, &mut stdout).await;

    drop(terminal);
    let _ = channel.close().await;
    result
}

/// Bridge a local byte source and sink to the channel, ending when either
/// direction finishes. A clean channel shutdown is not an error.
pub async fn copy_bidirectional<R, W>(
    channel: &Arc<DataChannel>,
    reader: &mut R,
    writer: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    tokio::select! {
        sent = channel.copy_from(reader) => {
            let n = sent?;
            debug!(bytes = n, "local input finished");
            Ok(())
        }
        received = channel.copy_to(writer) => {
            let n = received?;
            debug!(bytes = n, "remote output finished");
            Ok(())
        }
    }
}
