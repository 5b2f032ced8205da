//! Configuration for the camlink server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use camlink_core::{AcceptorConfig, DEFAULT_PORT, MalformedPolicy, SessionConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening socket.
    pub network: NetworkConfig,
    /// Per-camera session tuning.
    pub session: SessionSettings,
    /// When the server stops by itself.
    pub shutdown: ShutdownConfig,
    /// Periodic status output.
    pub report: ReportConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port cameras connect to.
    pub port: u16,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Per-read timeout in seconds; 0 disables it.
    pub read_timeout_secs: u64,
    /// Selection broadcast period in milliseconds.
    pub selection_interval_ms: u64,
    /// Drop a camera that sends an unknown frame tag instead of skipping
    /// the byte.
    pub disconnect_on_malformed: bool,
}

/// Shutdown policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Stop after this many seconds without any camera.
    pub idle_timeout_secs: u64,
    /// Stop once every camera has disconnected.
    pub exit_when_empty: bool,
    /// Grace period for sessions to finish, in milliseconds.
    pub grace_ms: u64,
}

/// Status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Status line period in milliseconds; 0 disables reporting.
    pub interval_ms: u64,
    /// Optional file that receives the latest frame on every report.
    pub snapshot_path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_timeout_secs: 60,
            selection_interval_ms: 100,
            disconnect_on_malformed: false,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            exit_when_empty: true,
            grace_ms: 1000,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            snapshot_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Address the acceptor binds.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind, self.network.port)
    }

    /// Convert into the core acceptor settings.
    pub fn to_acceptor_config(&self) -> AcceptorConfig {
        let read_timeout = match self.session.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        AcceptorConfig {
            bind: self.bind_addr(),
            idle_timeout: Duration::from_secs(self.shutdown.idle_timeout_secs.max(1)),
            exit_when_empty: self.shutdown.exit_when_empty,
            shutdown_grace: Duration::from_millis(self.shutdown.grace_ms),
            session: SessionConfig {
                read_timeout,
                selection_interval: Duration::from_millis(
                    self.session.selection_interval_ms.clamp(1, 10_000),
                ),
                malformed_policy: if self.session.disconnect_on_malformed {
                    MalformedPolicy::Disconnect
                } else {
                    MalformedPolicy::Skip
                },
            },
            ..AcceptorConfig::default()
        }
    }

    /// Status reporting period, `None` when disabled.
    pub fn report_interval(&self) -> Option<Duration> {
        match self.report.interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
