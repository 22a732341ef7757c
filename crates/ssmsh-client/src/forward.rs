//! Port forwarding session orchestration.
//!
//! Bridges local TCP connections to a forwarded port on the target
//! instance. One connection is in flight at a time (the session protocol
//! does not mux); when the local side closes, `DisconnectToPort` resets the
//! agent's upstream socket and the listener serves the next connection over
//! the same channel.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use ssmsh_core::api::{SessionApi, StartSessionInput};
use ssmsh_core::channel::{DataChannel, InboundEvent};
use ssmsh_core::error::{Error, Result};

use crate::signals::install_signal_handler;

/// Parameters for a port forwarding (or SSH) session.
#[derive(Debug, Clone, Default)]
pub struct PortForwardingInput {
    /// Instance to connect to.
    pub target: String,
    /// Port to reach on the instance.
    pub remote_port: u16,
    /// Local listening port; zero picks an ephemeral one.
    pub local_port: u16,
}

/// Run a port forwarding session until the channel ends or a signal stops
/// the process.
pub async fn port_forwarding_session(
    api: &dyn SessionApi,
    opts: &PortForwardingInput,
) -> Result<()> {
    let input = StartSessionInput::port_forwarding(&opts.target, opts.local_port, opts.remote_port);
    let channel = Arc::new(DataChannel::open(api, &input).await?);
    install_signal_handler(&channel);

    info!("waiting for handshake");
    let result = run(&channel, opts.local_port).await;

    // orderly farewell regardless of how the serve loop ended; the channel
    // may already be gone, so failures only rate a debug line
    if let Err(e) = channel.terminate_session().await {
        debug!(error = %e, "TerminateSession not sent");
    }
    let _ = channel.close().await;
    result
}

async fn run(channel: &Arc<DataChannel>, local_port: u16) -> Result<()> {
    channel.wait_for_handshake_complete().await?;
    debug!("handshake complete");

    let listener = TcpListener::bind(("0.0.0.0", local_port)).await?;
    serve(channel, listener).await
}

/// Accept loop over a pre-bound listener, one connection at a time.
///
/// Returns `Ok` when the channel reaches end of stream; local connection
/// failures only end the connection, not the session.
pub async fn serve(channel: &Arc<DataChannel>, listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        debug!(%peer, "connection accepted");

        match bridge(channel, stream).await {
            Ok(()) => {
                // local side done: reset the agent's upstream socket and keep
                // the session for the next connection
                channel.disconnect_port().await?;
                debug!(%peer, "connection finished");
            }
            Err(Error::EndOfStream) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Shuttle bytes for one accepted connection.
///
/// `Ok` means the local side finished; an error means the channel did.
async fn bridge(channel: &Arc<DataChannel>, stream: TcpStream) -> Result<()> {
    let (mut tcp_read, mut tcp_write) = stream.into_split();

    // local -> channel; completion signals that the local side is done
    let mut upstream = {
        let channel = Arc::clone(channel);
        tokio::spawn(async move {
            if let Err(e) = channel.copy_from(&mut tcp_read).await {
                debug!(error = %e, "local read ended");
            }
        })
    };

    // channel -> local in the foreground
    let result = loop {
        tokio::select! {
            _ = &mut upstream => break Ok(()),

            frame = channel.read_frame() => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => break Err(e),
                };
                match channel.handle_message(&frame).await {
                    Ok(InboundEvent::Output(payload)) => {
                        if let Err(e) = tcp_write.write_all(&payload).await {
                            debug!(error = %e, "local write failed");
                            break Ok(());
                        }
                    }
                    Ok(InboundEvent::Consumed) => {}
                    Ok(InboundEvent::Closed { output }) => {
                        if let Some(payload) = output {
                            let _ = tcp_write.write_all(&payload).await;
                        }
                        break Err(Error::EndOfStream);
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    upstream.abort();
    let _ = tcp_write.shutdown().await;
    result
}
