use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rmodel",
    about = "Nested records over a flat key-value store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with record-layer settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Time repeated whole-record reads
    Bench(BenchArgs),
    /// Run a collection scenario and show the data and recorded changes
    Demo(DemoArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct BenchArgs {
    #[arg(short = 'n', long, default_value = "5000")]
    pub iterations: u32,
    /// Populate the record before timing
    #[arg(long)]
    pub seed: bool,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Number of items to add
    #[arg(short = 'n', long, default_value = "3")]
    pub items: u32,
    /// Move the first item to this key afterwards
    #[arg(long)]
    pub move_to: Option<String>,
}
