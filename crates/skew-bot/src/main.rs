//! Calendar risk-reversal client - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

/// Calendar risk-reversal client for BTC options
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SKEW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the session connects.
    skew_ws::init_crypto();

    let args = Args::parse();

    skew_telemetry::init_logging()?;

    info!("Starting skew-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SKEW_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SKEW_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = skew_bot::AppConfig::from_file(&config_path)?;
    info!(
        ws_url = %config.session.url(),
        expirations = ?config.strategy.expirations,
        direction = %config.strategy.direction,
        "Configuration loaded"
    );

    let app = skew_bot::Application::new(config)?;
    if !args.no_stdin {
        skew_bot::command::spawn_stdin_source(app.command_sender())?;
    }

    if let Err(e) = app.run().await {
        error!(error = %e, "Fatal error, exiting");
        std::process::exit(1);
    }
    Ok(())
}
