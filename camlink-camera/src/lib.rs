//! # camlink-camera — camera peer
//!
//! Connects to a camlink server, streams frames from the requested local
//! source and switches sources when the server says so.
//!
//! - **config**: TOML settings mapped onto the core `AgentConfig`.
//! - **source**: `FileFrameSource`, frames read from files on disk.

pub mod config;
pub mod source;

pub use source::FileFrameSource;
