//! Configuration for a camlink camera peer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use camlink_core::{AgentConfig, DEFAULT_PORT};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

/// Where the server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or IP.
    pub server_host: String,
    /// Server TCP port.
    pub server_port: u16,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Capture pacing and sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay between captures in milliseconds.
    pub interval_ms: u64,
    /// Pause after a failed capture in milliseconds.
    pub miss_backoff_ms: u64,
    /// Frame files or directories of JPEGs; entry `i` is source `i + 1`.
    pub sources: Vec<PathBuf>,
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
            server_host: "127.0.0.1".into(),
            server_port: DEFAULT_PORT,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            miss_backoff_ms: 100,
            sources: Vec::new(),
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

impl CameraConfig {
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

    /// `host:port` of the server, suitable for `lookup_host`.
    pub fn server_target(&self) -> String {
        format!("{}:{}", self.network.server_host, self.network.server_port)
    }

    /// Convert into the core agent settings.
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            capture_interval: Duration::from_millis(self.capture.interval_ms.clamp(1, 10_000)),
            miss_backoff: Duration::from_millis(self.capture.miss_backoff_ms.min(10_000)),
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
