//! Signal-driven session teardown.

use std::sync::{Arc, Weak};

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use ssmsh_core::channel::DataChannel;

/// Arrange for SIGINT, SIGQUIT and SIGTERM to end the session cleanly:
/// best-effort `TerminateSession`, close the websocket, exit 0.
///
/// The handler keeps only a weak reference to the channel, so it never
/// prolongs the life of a session that already finished on its own. During a
/// shell session the raw terminal routes INT and QUIT to the remote side, so
/// in practice only SIGTERM reaches this handler there.
pub fn install_signal_handler(channel: &Arc<DataChannel>) {
    let weak = Arc::downgrade(channel);
    tokio::spawn(async move {
        let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
            return;
        };
        let Ok(mut quit) = signal(SignalKind::quit()) else {
            return;
        };
        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            return;
        };

        tokio::select! {
            _ = interrupt.recv() => info!("interrupt, shutting down"),
            _ = quit.recv() => info!("quit, shutting down"),
            _ = terminate.recv() => info!("terminated, shutting down"),
        }

        shutdown(weak).await;
    });
}

async fn shutdown(weak: Weak<DataChannel>) {
    if let Some(channel) = weak.upgrade() {
        if let Err(e) = channel.terminate_session().await {
            warn!(error = %e, "TerminateSession not sent");
        }
        let _ = channel.close().await;
    }
    std::process::exit(0);
}
