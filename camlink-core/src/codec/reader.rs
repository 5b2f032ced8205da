//! Exact-size reads and frame decoding over any `AsyncRead`.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CamError;
use crate::frame::{Frame, LEN_PREFIX_SIZE, TAG_CAMERA, TAG_TIMING, TIMESTAMP_SIZE};

/// Upper bound on a single socket read. Keeps a hostile length prefix from
/// forcing one huge allocation up front.
const READ_CHUNK: usize = 64 * 1024;

/// Reads camera → server frames from a byte stream.
///
/// Every underlying read is bounded by the optional read timeout; a
/// deadline that elapses mid-frame is reported as [`CamError::Timeout`].
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with no read deadline.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_timeout: None,
        }
    }

    /// Bound every socket read by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }

    /// Read exactly `n` bytes.
    ///
    /// Returns [`CamError::ConnectionClosed`] if the peer closes before `n`
    /// bytes arrive.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, CamError> {
        let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK));

        while buf.len() < n {
            let want = (n - buf.len()).min(READ_CHUNK);
            buf.reserve(want);

            let mut limited = (&mut self.inner).take(want as u64);
            let read = limited.read_buf(&mut buf);
            let got = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| CamError::Timeout(limit))??,
                None => read.await?,
            };

            if got == 0 {
                return Err(CamError::ConnectionClosed);
            }
        }

        Ok(buf.freeze())
    }

    /// Read the next frame.
    ///
    /// An unknown tag consumes only the tag byte and yields
    /// [`CamError::MalformedFrame`]; the stream stays usable, but whatever
    /// followed the bad tag will be parsed as the next frame.
    pub async fn decode_frame(&mut self) -> Result<Frame, CamError> {
        let tag = self.read_exact(1).await?[0];

        match tag {
            TAG_CAMERA => {
                let mut prefix = self.read_exact(LEN_PREFIX_SIZE).await?;
                let len = prefix.get_u32() as usize;
                let payload = self.read_exact(len).await?;
                Ok(Frame::Camera(payload))
            }
            TAG_TIMING => {
                let mut raw = self.read_exact(TIMESTAMP_SIZE).await?;
                Ok(Frame::Timing(raw.get_f64()))
            }
            other => Err(CamError::MalformedFrame { tag: other }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
