//! Terminal handling for interactive shell sessions.
//!
//! The original termios settings travel inside the guard rather than in
//! process-global state, so restoration is tied to an owner with a clear
//! lifetime.

use std::io::{self, IsTerminal};
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Weak};

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ssmsh_core::channel::DataChannel;
use ssmsh_core::constants::{DEFAULT_TERM_COLS, DEFAULT_TERM_ROWS, TERMINAL_SIZE_INTERVAL};
use ssmsh_core::error::{Error, Result};

/// Puts stdin into raw-ish mode and restores the saved settings on drop.
///
/// Canonical mode, echo and signal generation are switched off: keystrokes
/// flow to the remote session byte-by-byte, and INT/QUIT/SUSP travel
/// downstream instead of hitting this process.
pub struct RawModeGuard {
    fd: RawFd,
    original: libc::termios,
}

impl RawModeGuard {
    /// Enter raw mode on stdin.
    pub fn enter() -> Result<Self> {
        let fd = io::stdin().as_raw_fd();

        let mut termios = MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let original = unsafe { termios.assume_init() };

        let mut raw = original;
        raw.c_iflag |= libc::IUTF8;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);

        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        debug!("entered raw terminal mode");
        Ok(Self { fd, original })
    }

    /// Restore the saved terminal settings.
    pub fn restore(&self) {
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.original) } != 0 {
            warn!("failed to restore terminal settings");
        } else {
            debug!("restored terminal settings");
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Query the controlling terminal's window size as (rows, cols).
///
/// Falls back to 45x132 when stdin is not a terminal or the query fails;
/// the remote side needs some size to lay out against.
pub fn window_size() -> (u32, u32) {
    let stdin = io::stdin();
    let mut rows = 0u32;
    let mut cols = 0u32;

    if stdin.is_terminal() {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::ioctl(stdin.as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
        if rc == 0 {
            rows = u32::from(ws.ws_row);
            cols = u32::from(ws.ws_col);
        }
    }

    if rows < 1 {
        rows = DEFAULT_TERM_ROWS;
    }
    if cols < 1 {
        cols = DEFAULT_TERM_COLS;
    }
    (rows, cols)
}

/// Raw-mode stdin plus the background window-size updater for one shell
/// session. Dropping it stops the updater and restores the terminal.
pub struct TerminalSession {
    _guard: RawModeGuard,
    updater: JoinHandle<()>,
}

impl TerminalSession {
    /// Enter raw mode and start pushing terminal sizes: once immediately,
    /// again every 500ms, and on SIGWINCH.
    pub fn initialize(channel: &Arc<DataChannel>) -> Result<Self> {
        let guard = RawModeGuard::enter()?;
        let updater = spawn_size_updater(Arc::downgrade(channel));
        Ok(Self {
            _guard: guard,
            updater,
        })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.updater.abort();
        // the guard restores the terminal as it drops
    }
}

fn spawn_size_updater(channel: Weak<DataChannel>) -> JoinHandle<()> {
    tokio::spawn(async move {
        // some terminals never deliver SIGWINCH on resize, hence the timer
        let mut sigwinch = match signal(SignalKind::window_change()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "SIGWINCH handler unavailable");
                None
            }
        };
        let mut ticker = tokio::time::interval(TERMINAL_SIZE_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = recv_or_pending(&mut sigwinch) => {}
            }

            let Some(channel) = channel.upgrade() else {
                return;
            };
            let (rows, cols) = window_size();
            if let Err(e) = channel.set_terminal_size(rows, cols).await {
                debug!(error = %e, "terminal size update failed");
                return;
            }
        }
    })
}

async fn recv_or_pending(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
