//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Keyfill - backfill reference tables from fact data
#[derive(Parser, Debug)]
#[command(name = "kf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override target (database connection)
    #[arg(short, long, global = true)]
    pub target: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the configuration and check every domain's foreign-key graph
    Validate,

    /// Print the order foreign keys of a domain are processed in
    Order(OrderArgs),

    /// Compute candidate rows and statements without writing anything
    Plan(BackfillArgs),

    /// Backfill reference tables
    Run(BackfillArgs),
}

/// Arguments for the order command
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Domain to resolve
    #[arg(short, long)]
    pub domain: String,
}

/// Arguments shared by plan and run
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Only process this domain (default: all)
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Fact source overriding the configured one: a .csv path or a table name
    #[arg(short, long, requires = "domain")]
    pub facts: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: SummaryOutput,

    /// Print the generated statements
    #[arg(long)]
    pub show_sql: bool,
}

/// Summary output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutput {
    /// Human-readable table
    Text,
    /// JSON run summaries
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
