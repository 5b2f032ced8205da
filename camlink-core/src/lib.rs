//! # camlink-core
//!
//! Core protocol library for camlink: cameras stream encoded frames to a
//! central server over one TCP connection each, and the server tells every
//! camera which of its local sources to stream.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `Selection` and the wire encoders
//! - **Codec**: `FrameReader` for exact-size reads, `FrameCodec` / `SelectionCodec` for `tokio_util` framing
//! - **Latency**: `LatencyHistory`, the rolling latency window
//! - **Registry**: `SessionRegistry`, the server's only shared state
//! - **Session**: `ConnectionSession`, the per-camera inbound/outbound loops
//! - **Acceptor**: `Acceptor`, the listener and shutdown policy
//! - **Agent**: `PeerAgent` and the `FrameSource` trait on the camera side
//! - **Error**: `CamError`, the `thiserror`-based error type

pub mod acceptor;
pub mod agent;
pub mod codec;
pub mod error;
pub mod frame;
pub mod latency;
pub mod registry;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use acceptor::{Acceptor, AcceptorConfig, DEFAULT_PORT, ShutdownReason};
pub use agent::{AgentConfig, FrameSource, PeerAgent};
pub use codec::{FrameCodec, FrameReader, SelectionCodec};
pub use error::CamError;
pub use frame::{
    Frame, MAX_PAYLOAD_SIZE, Selection, encode_camera_frame, encode_selection,
    encode_timing_ping, unix_now,
};
pub use latency::{LATENCY_WINDOW, LatencyHistory};
pub use registry::{RegistryStats, SessionRegistry};
pub use session::{ConnectionSession, MalformedPolicy, SessionConfig, SessionSummary};
