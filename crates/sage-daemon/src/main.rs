//! SAGE Daemon - situational action governance service

use anyhow::Context;
use clap::Parser;
use sage_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SAGE Daemon CLI
#[derive(Parser)]
#[command(name = "saged")]
#[command(about = "SAGE Daemon - decisions and governed execution over HTTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SAGE_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "SAGE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "SAGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SAGE_LOG_JSON")]
    json: bool,

    /// Print the `pin_hash` value for a signing credential and exit
    #[arg(long, value_name = "PIN")]
    hash_pin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(pin) = &cli.hash_pin {
        let hash = sage_dispatcher::hash_pin(pin).context("Failed to hash PIN")?;
        println!("{}", hash);
        return Ok(());
    }

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if config.signing.credentials.is_empty() {
        tracing::warn!("No signing credentials configured; signed actions cannot execute");
    }

    let server = Server::new(config).context("Failed to initialise engine")?;
    server.run().await?;
    Ok(())
}
