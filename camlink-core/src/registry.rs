//! Server-side shared state.
//!
//! [`SessionRegistry`] is the only mutable state shared between sessions,
//! the acceptor, and the display/input side of the server. Every field sits
//! behind one mutex; critical sections are O(1) map / deque operations and
//! never hold the lock across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::CamError;
use crate::frame::Selection;
use crate::latency::LatencyHistory;

// ── PeerSession ──────────────────────────────────────────────────

/// Per-connection state kept while a session's inbound loop is alive.
#[derive(Debug, Clone)]
struct PeerSession {
    /// Most recent camera payload. Overwritten, never queued.
    latest_frame: Option<Bytes>,
    /// Most recent latency sample in milliseconds.
    latest_latency_ms: Option<f64>,
    connected_at: Instant,
}

impl PeerSession {
    fn new() -> Self {
        Self {
            latest_frame: None,
            latest_latency_ms: None,
            connected_at: Instant::now(),
        }
    }
}

// ── RegistryStats ────────────────────────────────────────────────

/// Point-in-time snapshot for status reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStats {
    pub active_sessions: usize,
    pub average_latency_ms: f64,
    pub latency_samples: usize,
    pub selection: u8,
    pub latest_frame_len: Option<usize>,
}

// ── SessionRegistry ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SocketAddr, PeerSession>,
    latency: LatencyHistory,
    selection: Selection,
    ever_connected: bool,
}

/// Thread-safe table of live sessions plus the broadcast selection.
///
/// Cloning is cheap and every clone refers to the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the table. A panicked holder cannot leave the O(1) updates
    /// half-applied, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Session lifecycle ────────────────────────────────────────

    /// Add a session for `addr`. Returns `false` if one already existed,
    /// in which case its state is reset.
    pub fn register(&self, addr: SocketAddr) -> bool {
        let mut inner = self.lock();
        inner.ever_connected = true;
        inner
            .sessions
            .insert(addr, PeerSession::new())
            .is_none()
    }

    /// Remove the session for `addr`. Idempotent.
    pub fn remove_session(&self, addr: SocketAddr) -> bool {
        match self.lock().sessions.remove(&addr) {
            Some(session) => {
                info!(
                    "session {addr} removed from registry after {:?}",
                    session.connected_at.elapsed()
                );
                true
            }
            None => false,
        }
    }

    /// Whether a session for `addr` is registered.
    pub fn is_active(&self, addr: SocketAddr) -> bool {
        self.lock().sessions.contains_key(&addr)
    }

    /// Number of registered sessions.
    pub fn active_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether any session was ever registered.
    pub fn ever_connected(&self) -> bool {
        self.lock().ever_connected
    }

    /// Addresses of all registered sessions.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.lock().sessions.keys().copied().collect()
    }

    // ── Inbound data ─────────────────────────────────────────────

    /// Store the latest camera payload for `addr`.
    ///
    /// Ignored if the session is no longer registered.
    pub fn put_frame(&self, addr: SocketAddr, payload: Bytes) {
        let mut inner = self.lock();
        match inner.sessions.get_mut(&addr) {
            Some(session) => session.latest_frame = Some(payload),
            None => debug!("dropping frame from unregistered peer {addr}"),
        }
    }

    /// Record a latency sample for `addr` and in the shared history.
    pub fn put_latency(&self, addr: SocketAddr, latency_ms: f64) {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get_mut(&addr) else {
            debug!("dropping latency sample from unregistered peer {addr}");
            return;
        };
        session.latest_latency_ms = Some(latency_ms);
        inner.latency.push(latency_ms);
    }

    // ── Consumers ────────────────────────────────────────────────

    /// The latest frame of some registered peer.
    ///
    /// Which peer is unspecified when several are streaming; the display
    /// side is a single consumer.
    pub fn any_latest_frame(&self) -> Option<Bytes> {
        self.lock()
            .sessions
            .values()
            .find_map(|s| s.latest_frame.clone())
    }

    /// The latest frame received from `addr`.
    pub fn latest_frame(&self, addr: SocketAddr) -> Option<Bytes> {
        self.lock()
            .sessions
            .get(&addr)
            .and_then(|s| s.latest_frame.clone())
    }

    /// Latest latency sample from `addr`.
    pub fn peer_latency(&self, addr: SocketAddr) -> Option<f64> {
        self.lock()
            .sessions
            .get(&addr)
            .and_then(|s| s.latest_latency_ms)
    }

    /// Average over the shared latency window, `0.0` when empty.
    pub fn average_latency(&self) -> f64 {
        self.lock().latency.average()
    }

    /// Snapshot of the registry for reporting.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();
        RegistryStats {
            active_sessions: inner.sessions.len(),
            average_latency_ms: inner.latency.average(),
            latency_samples: inner.latency.len(),
            selection: inner.selection.get(),
            latest_frame_len: inner
                .sessions
                .values()
                .find_map(|s| s.latest_frame.as_ref().map(Bytes::len)),
        }
    }

    // ── Selection ────────────────────────────────────────────────

    /// Set the source index broadcast to every peer.
    ///
    /// Values outside `1..=9` are rejected and the previous selection kept.
    pub fn set_selection(&self, value: u8) -> Result<(), CamError> {
        let selection = match Selection::new(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("ignoring selection {value}: {e}");
                return Err(e);
            }
        };
        self.lock().selection = selection;
        info!("selection set to camera {selection}");
        Ok(())
    }

    /// The current broadcast selection.
    pub fn selection(&self) -> Selection {
        self.lock().selection
    }
}

// ── Tests ────────────────────────────────────────────────────────
