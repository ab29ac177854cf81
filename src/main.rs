//! banjir-relay server
//!
//! Run with: cargo run -- --config config.toml
//!
//! # Configuration
//!
//! Settings come from the file given with `--config`, otherwise from the
//! first of `<config dir>/banjir-relay/config.toml`,
//! `/etc/banjir-relay/config.toml` and `./config.toml` that exists.
//! `BANJIR_RELAY_*` environment variables override file values and
//! `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use banjir_relay::config::{generate_default_config, Config, LoggingConfig};
use banjir_relay::{serve, AppState};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "banjir-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time relay for flood-monitoring telemetry")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a default config file and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    config.validate()?;

    tracing::info!("Starting banjir-relay v{}", env!("CARGO_PKG_VERSION"));
    if config.thresholds.enabled {
        tracing::info!("Threshold endpoint: {}", config.thresholds.url);
    } else {
        tracing::info!(
            normal = config.thresholds.default_normal,
            banjir = config.thresholds.default_banjir,
            "Threshold endpoint disabled, using defaults"
        );
    }

    let state = AppState::from_config(&config).context("building threshold source")?;
    serve(state, &config.server).await?;

    tracing::info!("banjir-relay stopped");
    Ok(())
}

/// Initialize tracing from the logging config; `RUST_LOG` wins when set
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("banjir_relay={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
