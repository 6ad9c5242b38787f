use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cdwfhir")]
#[command(about = "Run FHIR transaction and batch bundles against the clinical data warehouse")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (defaults to ./cdwfhir.toml when present)
    #[arg(short, long, global = true, env = "CDWFHIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a transaction or batch bundle
    Process(ProcessArgs),
    /// Classify a bundle's entries without executing them
    Validate(ValidateArgs),
    /// Show the effective configuration
    Config,
}

#[derive(clap::Args)]
pub struct ProcessArgs {
    /// Path to the bundle JSON file (reads from stdin if omitted)
    pub bundle: Option<PathBuf>,
    /// JSON file of resources to load into the store first (resource, array or Bundle); repeatable
    #[arg(long)]
    pub seed: Vec<PathBuf>,
    /// Print the store contents after processing
    #[arg(long)]
    pub dump_store: bool,
}

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// Path to the bundle JSON file (reads from stdin if omitted)
    pub bundle: Option<PathBuf>,
}
