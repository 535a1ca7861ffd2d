// Main entry point - Dependency injection and command dispatch
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dashboard_studio::application::feedback::FailureReporter;
use dashboard_studio::infrastructure::config::load_config;
use dashboard_studio::infrastructure::http_backend::HttpBackend;
use dashboard_studio::presentation::cli::{run, Cli, CliContext};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = load_config(&cli.config)?;
    tracing::debug!("Using backend at {}", config.api.base_url);

    // Create backend (infrastructure layer)
    let backend = Arc::new(HttpBackend::new(&config.api)?);

    let ctx = CliContext {
        config,
        backend,
        reporter: FailureReporter::default(),
    };

    run(cli.command, &ctx).await
}
