//! Periodic status output.
//!
//! Logs one status line per interval and, when a snapshot path is set,
//! writes the most recent camera frame to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use camlink_core::{RegistryStats, SessionRegistry};

/// Status reporter settings.
#[derive(Debug, Clone)]
pub struct Reporter {
    registry: SessionRegistry,
    interval: Duration,
    snapshot: Option<PathBuf>,
}

impl Reporter {
    pub fn new(registry: SessionRegistry, interval: Duration, snapshot: Option<PathBuf>) -> Self {
        Self {
            registry,
            interval,
            snapshot,
        }
    }

    /// Report until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the first line has data.
        tick.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tick.tick() => {
                    self.report_once().await;
                }
            }
        }
    }

    /// Log one status line and refresh the snapshot.
    pub async fn report_once(&self) -> RegistryStats {
        let stats = self.registry.stats();
        info!(
            "cameras: {} | selected: {} | avg latency: {:.1} ms ({} samples) | frame: {}",
            stats.active_sessions,
            stats.selection,
            stats.average_latency_ms,
            stats.latency_samples,
            match stats.latest_frame_len {
                Some(len) => format!("{len} B"),
                None => "none".into(),
            },
        );
        for peer in self.registry.peers() {
            match self.registry.peer_latency(peer) {
                Some(ms) => debug!("  {peer}: last latency {ms:.1} ms"),
                None => debug!("  {peer}: no ping yet"),
            }
        }

        if let Some(path) = &self.snapshot {
            self.write_snapshot(path).await;
        }
        stats
    }

    async fn write_snapshot(&self, path: &Path) {
        let Some(frame) = self.registry.any_latest_frame() else {
            return;
        };
        match tokio::fs::write(path, &frame).await {
            Ok(()) => debug!("snapshot {} ({} bytes)", path.display(), frame.len()),
            Err(e) => warn!("failed to write snapshot {}: {e}", path.display()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
