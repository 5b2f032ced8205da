//! Operator console: one command per stdin line.
//!
//! ```text
//! 1..9       stream that camera index from every peer
//! q | quit   stop the server
//! ```

use std::io::BufRead;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use camlink_core::SessionRegistry;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request camera `n` (validated by the registry).
    Select(u8),
    /// Stop the server.
    Quit,
    /// Blank line.
    Empty,
    /// Anything else.
    Unknown(String),
}

/// Parse one console line.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "q" | "quit" => Command::Quit,
        _ => match line.parse::<u8>() {
            Ok(n) => Command::Select(n),
            Err(_) => Command::Unknown(line.to_owned()),
        },
    }
}

/// Forward stdin lines from a plain thread.
///
/// Blocking stdin reads never finish on their own, so they stay off the
/// runtime; the thread ends with the process.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Apply commands from `lines` until the sender closes, `quit`, or
/// cancellation.
pub async fn run_console(
    mut lines: mpsc::Receiver<String>,
    registry: SessionRegistry,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("console input closed");
            return;
        };

        match parse_command(&line) {
            Command::Select(n) => {
                // Out-of-range values are logged by the registry.
                let _ = registry.set_selection(n);
            }
            Command::Quit => {
                info!("quit requested from console");
                shutdown.cancel();
                return;
            }
            Command::Empty => {}
            Command::Unknown(text) => warn!("unknown command {text:?} (use 1-9 or q)"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
