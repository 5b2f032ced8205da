//! # camlink-server — camera aggregator
//!
//! Accepts camera connections on one TCP port, keeps the latest frame and
//! latency sample per camera, and broadcasts the operator's camera choice
//! back to every peer.
//!
//! ## Pieces
//!
//! - **config**: TOML settings mapped onto the core `AcceptorConfig`.
//! - **console**: stdin commands (`1`..`9` to select, `q` to quit).
//! - **reporter**: periodic status line and optional frame snapshot.

pub mod config;
pub mod console;
pub mod reporter;
