//! Wire-level frame types.
//!
//! ## Wire format (big-endian)
//!
//! **Camera frame** (camera → server):
//! ```text
//! tag:     u8   ('c')
//! length:  u32  (4)
//! payload: [u8] (length bytes, usually one JPEG image)
//! ```
//!
//! **Timing ping** (camera → server):
//! ```text
//! tag:     u8   ('t')
//! sent_at: f64  (8, seconds since the Unix epoch)
//! ```
//!
//! **Selection** (server → camera): a single `u8` in `1..=9`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CamError;

// ── Constants ────────────────────────────────────────────────────

/// Tag byte of a camera frame.
pub const TAG_CAMERA: u8 = b'c';

/// Tag byte of a timing ping.
pub const TAG_TIMING: u8 = b't';

/// Size of the camera frame length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of a timing ping body.
pub const TIMESTAMP_SIZE: usize = 8;

/// Largest payload the length prefix can describe.
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

// ── Frame ────────────────────────────────────────────────────────

/// One tagged unit of the camera → server stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An encoded video frame.
    Camera(Bytes),
    /// The sender's wall-clock time, in Unix seconds.
    Timing(f64),
}

impl Frame {
    /// The tag byte this frame is written with.
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Camera(_) => TAG_CAMERA,
            Frame::Timing(_) => TAG_TIMING,
        }
    }

    /// Bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Camera(payload) => 1 + LEN_PREFIX_SIZE + payload.len(),
            Frame::Timing(_) => 1 + TIMESTAMP_SIZE,
        }
    }

    /// Append the wire form of this frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), CamError> {
        if let Frame::Camera(payload) = self {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(CamError::PayloadTooLarge {
                    size: payload.len(),
                    max: MAX_PAYLOAD_SIZE,
                });
            }
        }

        dst.reserve(self.encoded_len());
        dst.put_u8(self.tag());
        match self {
            Frame::Camera(payload) => {
                dst.put_u32(payload.len() as u32);
                dst.put_slice(payload);
            }
            Frame::Timing(sent_at) => dst.put_f64(*sent_at),
        }
        Ok(())
    }
}

/// Encode a camera frame: `'c'` + u32 length + payload.
pub fn encode_camera_frame(payload: &[u8]) -> Result<Bytes, CamError> {
    let mut buf = BytesMut::new();
    Frame::Camera(Bytes::copy_from_slice(payload)).encode_into(&mut buf)?;
    Ok(buf.freeze())
}

/// Encode a timing ping: `'t'` + f64 timestamp.
pub fn encode_timing_ping(sent_at: f64) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + TIMESTAMP_SIZE);
    buf.put_u8(TAG_TIMING);
    buf.put_f64(sent_at);
    buf.freeze()
}

/// Encode a selection command: one byte.
pub fn encode_selection(selection: Selection) -> [u8; 1] {
    [selection.get()]
}

/// Current wall-clock time in Unix seconds.
///
/// Both ends stamp and compare against this clock, so latency figures are
/// only meaningful between hosts with synchronised clocks.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ── Selection ────────────────────────────────────────────────────

/// Index of the camera source a peer should stream, always in `1..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selection(u8);

impl Selection {
    /// Lowest valid index.
    pub const MIN: u8 = 1;
    /// Highest valid index.
    pub const MAX: u8 = 9;
    /// The index peers fall back to.
    pub const DEFAULT: Selection = Selection(1);

    /// Validate a raw index.
    pub fn new(value: u8) -> Result<Self, CamError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CamError::InvalidSelection(value))
        }
    }

    /// The raw index.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Selection {
    type Error = CamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Selection> for u8 {
    fn from(s: Selection) -> Self {
        s.0
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Tests ────────────────────────────────────────────────────────
