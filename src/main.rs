mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use plx::state::{Config, FileCredentialStore};
use plx::Aggregator;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignores if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = Config::resolve(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let store = FileCredentialStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open credential store in {:?}", config.data_dir))?;
    let aggregator = Aggregator::from_config(&config, Arc::new(store))?;

    match cli.command {
        Commands::Platforms => {
            cli::commands::platforms::run(&aggregator);
        }
        Commands::Convert {
            locator,
            from,
            to,
            token,
        } => {
            cli::commands::convert::run(&aggregator, &locator, from, to, token.as_deref()).await?;
        }
        Commands::Auth { platform } => {
            cli::commands::auth::run(platform, &aggregator).await?;
        }
        Commands::Refresh { platform } => {
            cli::commands::credentials::refresh(platform, &aggregator).await?;
        }
        Commands::Status { platform } => {
            cli::commands::credentials::status(platform, &aggregator).await?;
        }
        Commands::Logout { platform } => {
            cli::commands::credentials::logout(platform, &aggregator).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "plx=debug" } else { "plx=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();
    Ok(())
}
