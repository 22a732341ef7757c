//! SSH session orchestration.
//!
//! A specialized port forwarding session whose local endpoints are stdin and
//! stdout, intended to sit behind an ssh `ProxyCommand`.

use std::sync::Arc;

use tracing::{debug, info};

use ssmsh_core::api::{SessionApi, StartSessionInput};
use ssmsh_core::channel::DataChannel;
use ssmsh_core::constants::DEFAULT_SSH_PORT;
use ssmsh_core::error::Result;

use crate::forward::PortForwardingInput;
use crate::shell::copy_bidirectional;
use crate::signals::install_signal_handler;

/// Start an SSH session to the target instance. Any `local_port` in the
/// options is ignored, and the remote port defaults to 22.
pub async fn ssh_session(api: &dyn SessionApi, opts: &PortForwardingInput) -> Result<()> {
    let remote_port = if opts.remote_port > 0 {
        opts.remote_port
    } else {
        DEFAULT_SSH_PORT
    };

    let input = StartSessionInput::ssh(&opts.target, remote_port);
    let channel = Arc::new(DataChannel::open(api, &input).await?);
    install_signal_handler(&channel);

    info!("waiting for handshake");
    let result = run(&channel).await;

    if let Err(e) = channel.terminate_session().await {
        debug!(error = %e, "TerminateSession not sent");
    }
    let _ = channel.close().await;
    result
}

async fn run(channel: &Arc<DataChannel>) -> Result<()> {
    channel.wait_for_handshake_complete().await?;
    debug!("handshake complete");

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    copy_bidirectional(channel, &mut stdin, &mut stdout).await
}
