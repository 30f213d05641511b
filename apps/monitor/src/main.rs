mod cli;
mod config;
mod database;
mod monitoring;
mod notify;
mod orchestrator;
mod pool;
mod server;
mod transport;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use config::Config;
use orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;
    logger::init_with(&config.log_settings());

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Config = command {
        print!("{config}");
        return Ok(());
    }

    let monitor = Orchestrator::new(config).await?;

    match command {
        Commands::Run => monitor.run().await?,
        Commands::Poll => {
            let report = monitor.poll_once().await;
            info!(faults = report.faults, "Poll cycle finished");
            cli::print_report(&report);
        }
        Commands::Inbound { from, text } => cli::print_outcome(&monitor.inbound(&from, &text).await?),
        Commands::Services => cli::print_services(&monitor.services().await?),
        Commands::History { name, limit } => cli::print_history(&name, &monitor.history(&name, limit).await?),
        Commands::Failures { hours, limit } => {
            cli::print_failures(hours, &monitor.recent_failures(hours, limit).await?)
        }
        Commands::Config => {}
    }

    Ok(())
}
