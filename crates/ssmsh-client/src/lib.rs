//! ssmsh-client: session orchestrators for the ssmsh data channel.
//!
//! Provides:
//! - Port forwarding sessions (local TCP listener bridged to the channel)
//! - Interactive shell sessions (raw terminal bridged to the channel)
//! - SSH sessions (stdin/stdout bridged to the channel, for ProxyCommand use)
//! - Raw terminal mode handling and window-size updates
//! - Signal-driven session teardown

pub mod forward;
pub mod shell;
pub mod signals;
pub mod ssh;
pub mod terminal;

pub use forward::{port_forwarding_session, PortForwardingInput};
pub use shell::{copy_bidirectional, shell_session, shell_session_with, ShellConfig};
pub use ssh::ssh_session;
pub use terminal::{window_size, RawModeGuard, TerminalSession};
