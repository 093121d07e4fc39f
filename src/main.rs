use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use optcoin_bot::core::cli::{Cli, Commands};
use optcoin_bot::core::config::AppConfig;
use optcoin_bot::infrastructure::logging::init_logging;
use optcoin_bot::services::{commands, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(AppConfig::from_env()?);
    init_logging("optcoin-bot", &config.log_dir)?;

    info!("Starting optcoin-bot");

    match cli.command {
        Commands::Login {
            accounts,
            concurrency,
            backend,
            mode,
            dry_run,
            performant,
        } => {
            commands::run_login(
                config,
                accounts,
                concurrency,
                &backend,
                &mode,
                dry_run,
                performant,
            )
            .await?;
        }
        Commands::SubmitOrder {
            order_number,
            accounts,
            concurrency,
            backend,
            mode,
            dry_run,
            yes,
            performant,
        } => {
            commands::run_submit_order(
                config,
                order_number,
                accounts,
                concurrency,
                &backend,
                &mode,
                dry_run,
                yes,
                performant,
            )
            .await?;
        }
        Commands::Serve { host, port } => {
            server::serve(config, host, port).await?;
        }
    }

    Ok(())
}
