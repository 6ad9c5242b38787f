mod cli;
mod commands;
mod config;
mod observability;
mod output;
mod warehouse;

use anyhow::{Result, anyhow};
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::loader::load_config(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    observability::init_tracing_with_level(level);
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Process(args) => {
            commands::process::process(&config, args, format).await?;
        }
        Commands::Validate(args) => {
            commands::validate::validate(&config, args, format)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
