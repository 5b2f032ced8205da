//! camlink-camera — entry point.
//!
//! ```text
//! camlink-camera --source cam1.jpg --source frames/   Two sources
//! camlink-camera --server 10.0.0.5:9999               Override the server
//! camlink-camera --config <path>                      Load a custom config TOML
//! camlink-camera --gen-config                         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camlink_camera::FileFrameSource;
use camlink_camera::config::CameraConfig;
use camlink_core::{CamError, PeerAgent};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camlink-camera", about = "camlink camera peer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camlink-camera.toml")]
    config: PathBuf,

    /// Server address as host:port (overrides the config file).
    #[arg(short, long)]
    server: Option<String>,

    /// Frame source; repeat for more cameras (replaces configured sources).
    #[arg(long = "source")]
    sources: Vec<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CameraConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = CameraConfig::load(&cli.config);
    if !cli.sources.is_empty() {
        config.capture.sources = cli.sources;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camlink-camera v{}", env!("CARGO_PKG_VERSION"));

    let source = FileFrameSource::open(&config.capture.sources).await?;
    let agent = PeerAgent::new(source, config.to_agent_config())?;

    let target = cli.server.unwrap_or_else(|| config.server_target());
    let addr = tokio::net::lookup_host(target.as_str())
        .await?
        .next()
        .ok_or_else(|| CamError::Other(format!("cannot resolve {target}")))?;
    let stream = agent.connect(addr).await?;

    let stop = agent.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    match agent.run(stream).await {
        Ok(()) => info!("stopped"),
        Err(e) if e.is_transient() => info!("server connection ended: {e}"),
        Err(e) => {
            error!("camera failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
