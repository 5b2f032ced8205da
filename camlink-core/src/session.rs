//! Server-side handling of one camera connection.
//!
//! A [`ConnectionSession`] runs two loops over the same socket:
//!
//! ```text
//!            ┌──────────── inbound ─────────────┐
//! socket ──► │ FrameReader::decode_frame         │ ──► SessionRegistry
//!            │   'c' → put_frame                 │     (latest frame,
//!            │   't' → put_latency               │      latency window)
//!            └───────────────────────────────────┘
//!            ┌──────────── outbound ────────────┐
//! socket ◄── │ every tick: registry.selection()  │ ◄── SessionRegistry
//!            └───────────────────────────────────┘
//! ```
//!
//! The loops fail independently. When the inbound loop ends the session
//! leaves the registry and the outbound loop stops at its next tick; a
//! failed write only ends the outbound loop.

use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{FrameReader, SelectionCodec};
use crate::error::CamError;
use crate::frame::{Frame, unix_now};
use crate::registry::SessionRegistry;

// ── SessionConfig ────────────────────────────────────────────────

/// What to do after reading an unknown tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Log and keep reading from the next byte. May desynchronise the
    /// stream if the unknown frame carried a body.
    #[default]
    Skip,
    /// Log and end the session.
    Disconnect,
}

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each socket read; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Period of the outbound selection broadcast.
    pub selection_interval: Duration,
    /// Handling of unknown frame tags.
    pub malformed_policy: MalformedPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(60)),
            selection_interval: Duration::from_millis(100),
            malformed_policy: MalformedPolicy::Skip,
        }
    }
}

// ── SessionSummary ───────────────────────────────────────────────

/// What a finished session did and why it ended.
#[derive(Debug)]
pub struct SessionSummary {
    pub addr: SocketAddr,
    pub frames_received: u64,
    pub pings_received: u64,
    pub malformed_frames: u64,
    pub selections_sent: u64,
    /// Error that ended the inbound loop; `None` when cancelled.
    pub inbound_error: Option<CamError>,
    /// Error that ended the outbound loop; `None` when cancelled.
    pub outbound_error: Option<CamError>,
}

#[derive(Debug, Default)]
struct InboundCounters {
    frames: u64,
    pings: u64,
    malformed: u64,
}

// ── Registration guard ───────────────────────────────────────────

/// Keeps the session in the registry for as long as it is alive.
///
/// Dropping the guard removes the entry, so the entry also disappears if
/// the session task is aborted.
#[derive(Debug)]
struct Registration {
    registry: SessionRegistry,
    addr: SocketAddr,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove_session(self.addr);
    }
}

// ── ConnectionSession ────────────────────────────────────────────

/// Duplex handler for one accepted camera connection.
///
/// Constructing a session registers it; the entry lives until the inbound
/// loop terminates or the session is dropped.
#[derive(Debug)]
pub struct ConnectionSession<R, W> {
    addr: SocketAddr,
    reader: R,
    writer: W,
    registry: SessionRegistry,
    config: SessionConfig,
    cancel: CancellationToken,
    registration: Registration,
}

impl ConnectionSession<OwnedReadHalf, OwnedWriteHalf> {
    /// Build a session over an accepted TCP stream.
    pub fn from_tcp(
        stream: TcpStream,
        addr: SocketAddr,
        registry: SessionRegistry,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, addr, registry, config, cancel)
    }
}

impl<R, W> ConnectionSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build a session over an arbitrary read/write pair.
    pub fn new(
        reader: R,
        writer: W,
        addr: SocketAddr,
        registry: SessionRegistry,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        if !registry.register(addr) {
            warn!("session {addr} replaced an existing registry entry");
        }
        let registration = Registration {
            registry: registry.clone(),
            addr,
        };
        Self {
            addr,
            reader,
            writer,
            registry,
            config,
            cancel,
            registration,
        }
    }

    /// Run both loops to completion.
    pub async fn run(self) -> SessionSummary {
        let Self {
            addr,
            reader,
            writer,
            registry,
            config,
            cancel,
            registration,
        } = self;

        info!("session {addr} started");

        let mut reader = FrameReader::new(reader);
        if let Some(limit) = config.read_timeout {
            reader = reader.with_timeout(limit);
        }

        let policy = config.malformed_policy;
        let period = config.selection_interval;
        let cancel = &cancel;
        let registry = &registry;

        let inbound = async move {
            let mut counters = InboundCounters::default();
            let result = inbound_loop(
                &mut reader,
                addr,
                registry,
                policy,
                cancel,
                &mut counters,
            )
            .await;
            drop(registration);
            cancel.cancel();
            (result, counters)
        };

        let outbound = outbound_loop(
            FramedWrite::new(writer, SelectionCodec),
            registry,
            period,
            cancel,
        );

        let ((inbound_result, counters), (outbound_result, selections_sent)) =
            tokio::join!(inbound, outbound);

        let inbound_error = inbound_result.err();
        match &inbound_error {
            None => debug!("session {addr}: inbound loop cancelled"),
            Some(CamError::ConnectionClosed) => info!("session {addr}: camera disconnected"),
            Some(e) => warn!("session {addr}: inbound loop ended: {e}"),
        }
        let outbound_error = outbound_result.err();
        if let Some(e) = &outbound_error {
            warn!("session {addr}: outbound loop ended: {e}");
        }

        info!(
            "session {addr} finished: {} frames, {} pings, {} malformed",
            counters.frames, counters.pings, counters.malformed
        );

        SessionSummary {
            addr,
            frames_received: counters.frames,
            pings_received: counters.pings,
            malformed_frames: counters.malformed,
            selections_sent,
            inbound_error,
            outbound_error,
        }
    }
}

// ── Loops ────────────────────────────────────────────────────────

async fn inbound_loop<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    addr: SocketAddr,
    registry: &SessionRegistry,
    policy: MalformedPolicy,
    cancel: &CancellationToken,
    counters: &mut InboundCounters,
) -> Result<(), CamError> {
    loop {
        let decoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            decoded = reader.decode_frame() => decoded,
        };

        match decoded {
            Ok(Frame::Camera(payload)) => {
                counters.frames += 1;
                debug!("session {addr}: camera frame, {} bytes", payload.len());
                registry.put_frame(addr, payload);
            }
            Ok(Frame::Timing(sent_at)) => {
                counters.pings += 1;
                let latency_ms = (unix_now() - sent_at) * 1000.0;
                registry.put_latency(addr, latency_ms);
            }
            Err(CamError::MalformedFrame { tag }) => {
                counters.malformed += 1;
                warn!("session {addr}: unexpected frame tag {tag:#04x}");
                if policy == MalformedPolicy::Disconnect {
                    return Err(CamError::MalformedFrame { tag });
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Returns the loop result and the number of selection bytes written.
async fn outbound_loop<W: AsyncWrite + Unpin>(
    mut writer: FramedWrite<W, SelectionCodec>,
    registry: &SessionRegistry,
    period: Duration,
    cancel: &CancellationToken,
) -> (Result<(), CamError>, u64) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Ok(()), sent),
            _ = ticker.tick() => {}
        }

        let selection = registry.selection();
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Ok(()), sent),
            written = writer.send(selection) => written,
        };
        if let Err(e) = written {
            return (Err(e), sent);
        }
        sent += 1;
    }
}

// ── Tests ────────────────────────────────────────────────────────
