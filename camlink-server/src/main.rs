//! camlink-server — entry point.
//!
//! ```text
//! camlink-server                      Listen with defaults (0.0.0.0:9999)
//! camlink-server --config <path>      Load a custom config TOML
//! camlink-server --port 7000          Override the listening port
//! camlink-server --gen-config         Write default config to stdout
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_core::{Acceptor, SessionRegistry};
use camlink_server::config::ServerConfig;
use camlink_server::console::{run_console, spawn_stdin_reader};
use camlink_server::reporter::Reporter;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camlink-server", about = "camlink camera aggregator")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camlink-server.toml")]
    config: PathBuf,

    /// Address to bind (overrides the config file).
    #[arg(long)]
    bind: Option<IpAddr>,

    /// TCP port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Idle timeout in seconds (overrides the config file).
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_console: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(bind) = cli.bind {
        config.network.bind = bind;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(secs) = cli.idle_timeout {
        config.shutdown.idle_timeout_secs = secs;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camlink-server v{}", env!("CARGO_PKG_VERSION"));
    info!("idle timeout: {}s", config.shutdown.idle_timeout_secs);
    info!("exit when empty: {}", config.shutdown.exit_when_empty);

    let registry = SessionRegistry::new();
    let acceptor = Acceptor::bind(config.to_acceptor_config(), registry.clone()).await?;
    let shutdown = acceptor.shutdown_token();

    // Reporter keeps logging while sessions drain.
    let helpers = CancellationToken::new();
    let tracker = TaskTracker::new();

    if !cli.no_console {
        info!("commands: 1-9 select camera, q quit");
        let lines = spawn_stdin_reader();
        tracker.spawn(run_console(lines, registry.clone(), shutdown.clone()));
    }
    if let Some(interval) = config.report_interval() {
        let reporter = Reporter::new(
            registry.clone(),
            interval,
            config.report.snapshot_path.clone(),
        );
        tracker.spawn(reporter.run(helpers.clone()));
    }
    tracker.close();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        ctrl_c.cancel();
    });

    let reason = acceptor.run().await;
    info!("server stopped: {reason}");

    helpers.cancel();
    if tokio::time::timeout(Duration::from_secs(1), tracker.wait())
        .await
        .is_err()
    {
        warn!("background tasks did not stop in time");
    }

    Ok(())
}
