//! TCP listener that turns camera connections into sessions.
//!
//! The accept loop wakes on a short poll interval so it can evaluate its
//! shutdown conditions even when nobody connects:
//!
//! - **Idle timeout**: no camera connected and none accepted for
//!   `idle_timeout` since start or since the last accept.
//! - **All peers left**: the session table drained after having had at
//!   least one camera (when `exit_when_empty` is set).
//! - **Requested**: the shutdown token was cancelled (operator quit).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CamError;
use crate::registry::SessionRegistry;
use crate::session::{ConnectionSession, SessionConfig, SessionSummary};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9999;

// ── AcceptorConfig ───────────────────────────────────────────────

/// Configuration for [`Acceptor`].
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Stop after this long without any camera.
    pub idle_timeout: Duration,
    /// How often shutdown conditions are checked.
    pub poll_interval: Duration,
    /// Stop once every camera has disconnected.
    pub exit_when_empty: bool,
    /// How long sessions get to finish after shutdown before being aborted.
    pub shutdown_grace: Duration,
    /// Settings handed to every session.
    pub session: SessionConfig,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            exit_when_empty: true,
            shutdown_grace: Duration::from_secs(1),
            session: SessionConfig::default(),
        }
    }
}

// ── ShutdownReason ───────────────────────────────────────────────

/// Why [`Acceptor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Nobody connected within the idle window.
    IdleTimeout,
    /// Every connected camera went away.
    AllPeersLeft,
    /// The shutdown token was cancelled.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::AllPeersLeft => write!(f, "all cameras disconnected"),
            Self::Requested => write!(f, "shutdown requested"),
        }
    }
}

// ── Acceptor ─────────────────────────────────────────────────────

/// Accepts cameras and runs a [`ConnectionSession`] for each.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    registry: SessionRegistry,
    config: AcceptorConfig,
    shutdown: CancellationToken,
}

impl Acceptor {
    /// Bind the listener. Failure here is fatal: no session exists yet.
    pub async fn bind(config: AcceptorConfig, registry: SessionRegistry) -> Result<Self, CamError> {
        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|source| CamError::Bind {
                addr: config.bind,
                source,
            })?;
        info!("listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, CamError> {
        Ok(self.listener.local_addr()?)
    }

    /// Cancel this token to stop the acceptor and every session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept cameras until a shutdown condition is met.
    pub async fn run(self) -> ShutdownReason {
        let mut sessions: JoinSet<SessionSummary> = JoinSet::new();
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_accept = Instant::now();
        let mut had_peers = false;

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break ShutdownReason::Requested,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("set_nodelay failed for {peer}: {e}");
                        }
                        info!("camera connected from {peer}");
                        let session = ConnectionSession::from_tcp(
                            stream,
                            peer,
                            self.registry.clone(),
                            self.config.session.clone(),
                            self.shutdown.child_token(),
                        );
                        sessions.spawn(session.run());
                        last_accept = Instant::now();
                        had_peers = true;
                    }
                    Err(e) => warn!("accept error: {e}"),
                },
                _ = poll.tick() => {
                    reap_finished(&mut sessions);
                    if let Some(reason) = self.check_shutdown(had_peers, last_accept) {
                        break reason;
                    }
                }
            }
        };

        info!("acceptor stopping: {reason}");
        self.shutdown.cancel();
        drain_sessions(sessions, self.config.shutdown_grace).await;
        reason
    }

    fn check_shutdown(&self, had_peers: bool, last_accept: Instant) -> Option<ShutdownReason> {
        if self.registry.active_count() > 0 {
            return None;
        }
        if had_peers && self.config.exit_when_empty {
            return Some(ShutdownReason::AllPeersLeft);
        }
        if last_accept.elapsed() > self.config.idle_timeout {
            info!(
                "no camera connected for {:?}; shutting down",
                self.config.idle_timeout
            );
            return Some(ShutdownReason::IdleTimeout);
        }
        None
    }
}

fn reap_finished(sessions: &mut JoinSet<SessionSummary>) {
    while let Some(done) = sessions.try_join_next() {
        if let Err(e) = done {
            warn!("session task failed: {e}");
        }
    }
}

/// Wait up to `grace` for sessions to observe cancellation, then abort
/// the rest. Aborting drops their sockets and registry entries.
async fn drain_sessions(mut sessions: JoinSet<SessionSummary>, grace: Duration) {
    let wait_all = async {
        while sessions.join_next().await.is_some() {}
    };
    if tokio::time::timeout(grace, wait_all).await.is_err() {
        warn!(
            "{} session(s) still running after {grace:?}; aborting",
            sessions.len()
        );
        sessions.shutdown().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> AcceptorConfig {
        AcceptorConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_protocol() {
        let cfg = AcceptorConfig::default();
        assert_eq!(cfg.bind.port(), DEFAULT_PORT);
        assert!(cfg.bind.ip().is_unspecified());
        assert_eq!(cfg.idle_timeout, Duration::from_secs(60));
        assert!(cfg.exit_when_empty);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let first = Acceptor::bind(local_config(), SessionRegistry::new())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let err = Acceptor::bind(
            AcceptorConfig {
                bind: taken,
                ..Default::default()
            },
            SessionRegistry::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CamError::Bind { addr, .. } if addr == taken));
    }

    #[tokio::test]
    async fn shutdown_token_stops_run() {
        let acceptor = Acceptor::bind(local_config(), SessionRegistry::new())
            .await
            .unwrap();
        let token = acceptor.shutdown_token();
        let handle = tokio::spawn(acceptor.run());

        token.cancel();
        let reason = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("acceptor did not stop")
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }

    #[test]
    fn reason_display() {
        assert_eq!(ShutdownReason::IdleTimeout.to_string(), "idle timeout");
        assert_eq!(
            ShutdownReason::AllPeersLeft.to_string(),
            "all cameras disconnected"
        );
    }
}
