//! Camera-side mirror of [`ConnectionSession`](crate::session::ConnectionSession).
//!
//! A [`PeerAgent`] owns a [`FrameSource`] and, once connected, runs:
//!
//! - an **outbound** loop that captures from the currently requested
//!   source and sends a timing ping immediately followed by the frame;
//! - an **inbound** loop that reads one selection byte at a time and
//!   switches the requested source.
//!
//! The only state the loops share is the requested index.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{FrameCodec, SelectionCodec};
use crate::error::CamError;
use crate::frame::{Frame, Selection, unix_now};

// ── FrameSource ──────────────────────────────────────────────────

/// Produces encoded frames for a given source index.
///
/// Implemented outside the core by whatever owns the capture devices.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Indices this source can currently serve.
    fn sources(&self) -> Vec<Selection>;

    /// Capture one frame from `index` and encode it (typically JPEG).
    ///
    /// `None` when the index does not exist or the capture failed.
    async fn capture_and_encode(&self, index: Selection) -> Option<Bytes>;
}

#[async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Arc<S> {
    fn sources(&self) -> Vec<Selection> {
        (**self).sources()
    }

    async fn capture_and_encode(&self, index: Selection) -> Option<Bytes> {
        (**self).capture_and_encode(index).await
    }
}

// ── AgentConfig ──────────────────────────────────────────────────

/// Configuration for [`PeerAgent`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Capture cadence; in practice capped by capture latency.
    pub capture_interval: Duration,
    /// Pause after a capture produced nothing.
    pub miss_backoff: Duration,
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(10),
            miss_backoff: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// ── PeerAgent ────────────────────────────────────────────────────

/// Streams frames from a [`FrameSource`] to the server.
pub struct PeerAgent<S> {
    source: S,
    requested: Arc<Mutex<Selection>>,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl<S: FrameSource> PeerAgent<S> {
    /// Create an agent. Fails with [`CamError::NoSources`] when the source
    /// has nothing to capture from.
    pub fn new(source: S, config: AgentConfig) -> Result<Self, CamError> {
        let available = source.sources();
        if available.is_empty() {
            return Err(CamError::NoSources);
        }
        info!("{} capture source(s) available", available.len());

        Ok(Self {
            source,
            requested: Arc::new(Mutex::new(Selection::DEFAULT)),
            config,
            cancel: CancellationToken::new(),
        })
    }

    fn lock_requested(&self) -> MutexGuard<'_, Selection> {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The source index currently being streamed.
    pub fn requested(&self) -> Selection {
        *self.lock_requested()
    }

    /// Switch the streamed source. Returns the previous index.
    pub fn set_requested(&self, selection: Selection) -> Selection {
        std::mem::replace(&mut *self.lock_requested(), selection)
    }

    /// Cancel this token to end [`run`](Self::run) cleanly.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Connect to the server within the configured timeout.
    pub async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, CamError> {
        let limit = self.config.connect_timeout;
        let stream = tokio::time::timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| CamError::Timeout(limit))??;
        stream.set_nodelay(true)?;
        info!("connected to server {addr}");
        Ok(stream)
    }

    /// Stream over an established connection.
    ///
    /// Returns `Ok(())` when stopped through [`stop_handle`](Self::stop_handle),
    /// otherwise the error that ended either loop. EOF from the server is
    /// [`CamError::ConnectionClosed`].
    pub async fn run(&self, stream: TcpStream) -> Result<(), CamError> {
        let (reader, writer) = stream.into_split();
        self.run_io(reader, writer).await
    }

    /// [`run`](Self::run) over an arbitrary read/write pair.
    pub async fn run_io<R, W>(&self, reader: R, writer: W) -> Result<(), CamError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let outbound = self.outbound_loop(FramedWrite::new(writer, FrameCodec));
        let inbound = self.inbound_loop(FramedRead::new(reader, SelectionCodec));

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(()),
            res = outbound => res,
            res = inbound => res,
        };

        match &result {
            Ok(()) => info!("agent stopped"),
            Err(CamError::ConnectionClosed) => info!("server closed the connection"),
            Err(e) => warn!("agent terminated: {e}"),
        }
        result
    }

    async fn outbound_loop<W: AsyncWrite + Unpin>(
        &self,
        mut writer: FramedWrite<W, FrameCodec>,
    ) -> Result<(), CamError> {
        let mut ticker = tokio::time::interval(self.config.capture_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let index = self.requested();
            let Some(payload) = self.source.capture_and_encode(index).await else {
                if index != Selection::DEFAULT {
                    warn!(
                        "camera {index} unavailable; falling back to {}",
                        Selection::DEFAULT
                    );
                }
                self.set_requested(Selection::DEFAULT);
                tokio::time::sleep(self.config.miss_backoff).await;
                continue;
            };

            debug!("sending {} byte frame from camera {index}", payload.len());
            writer.feed(Frame::Timing(unix_now())).await?;
            writer.send(Frame::Camera(payload)).await?;
        }
    }

    async fn inbound_loop<R: AsyncRead + Unpin>(
        &self,
        mut reader: FramedRead<R, SelectionCodec>,
    ) -> Result<(), CamError> {
        while let Some(byte) = reader.next().await {
            let byte = byte?;
            match Selection::new(byte) {
                Ok(selection) => {
                    let previous = self.set_requested(selection);
                    if previous != selection {
                        info!("server requested camera {selection}");
                    }
                }
                Err(e) => warn!("ignoring selection from server: {e}"),
            }
        }
        Err(CamError::ConnectionClosed)
    }
}

// ── Tests ────────────────────────────────────────────────────────
