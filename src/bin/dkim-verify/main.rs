//! dkim-verify CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use dkim_verify::ServiceBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Values from .env feed the CLI's env fallbacks
    let dotenv = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();
    let log_json = cli.log_json;

    // Build configuration
    let config = cli.into_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("dkim-verify v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    // Build and run the service
    let mut service = ServiceBuilder::new(config).build().await?;

    // Run until shutdown
    service.run().await?;

    info!("Goodbye!");
    Ok(())
}
