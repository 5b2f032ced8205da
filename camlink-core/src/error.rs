//! Domain-specific error types for the camlink protocol.
//!
//! All fallible operations return `Result<T, CamError>`.
//! Nothing on the wire path panics on bad input; every failure is typed.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// The canonical error type for camlink.
#[derive(Debug, Error)]
pub enum CamError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame started with a tag byte that is neither `'c'` nor `'t'`.
    #[error("malformed frame: unknown tag {tag:#04x}")]
    MalformedFrame { tag: u8 },

    /// A selection value outside `1..=9`.
    #[error("invalid selection {0}: expected 1..=9")]
    InvalidSelection(u8),

    /// The payload does not fit the 4-byte length prefix.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The peer closed the connection before a full read completed.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A read did not complete within its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Application Errors ───────────────────────────────────────
    /// The frame source has nothing to capture from.
    #[error("no capture source available")]
    NoSources,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CamError {
    /// Whether this error only concerns a single connection.
    ///
    /// Transient errors end the affected session and nothing else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CamError::ConnectionClosed | CamError::Timeout(_) | CamError::Connection(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CamError {
    fn from(s: String) -> Self {
        CamError::Other(s)
    }
}

impl From<&str> for CamError {
    fn from(s: &str) -> Self {
        CamError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CamError::MalformedFrame { tag: b'x' };
        assert!(e.to_string().contains("0x78"));

        let e = CamError::PayloadTooLarge { size: 1000, max: 500 };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = CamError::InvalidSelection(12);
        assert!(e.to_string().contains("12"));
    }

    #[test]
    fn from_string() {
        let e: CamError = "something broke".into();
        assert!(matches!(e, CamError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: CamError = io_err.into();
        assert!(matches!(e, CamError::Connection(_)));
        assert!(e.is_transient());
    }

    #[test]
    fn protocol_errors_are_not_transient() {
        assert!(!CamError::MalformedFrame { tag: 0 }.is_transient());
        assert!(!CamError::NoSources.is_transient());
        assert!(CamError::ConnectionClosed.is_transient());
        assert!(CamError::Timeout(Duration::from_secs(1)).is_transient());
    }
}
