//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    check::CheckArgs, completions::CompletionsArgs, migrate::MigrateArgs, template::TemplateArgs,
};

#[derive(Parser)]
#[command(name = "stm")]
#[command(author, version, about = "Sheet Test Migrator")]
#[command(long_about = "Migrate manual tests and their step scripts from a spreadsheet into a test-management workspace.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log debug detail
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Extra config file, merged over the global and ./stm.yaml files
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate the tests of a spreadsheet into the workspace
    Migrate(MigrateArgs),

    /// Validate a spreadsheet offline and show what would be migrated
    Check(CheckArgs),

    /// Print a CSV template with the mandatory columns
    Template(TemplateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table on a terminal, JSON when piped
    #[default]
    Auto,
    /// Human-readable table
    Table,
    /// JSON document
    Json,
}

impl OutputFormat {
    /// Resolve `Auto` against the attached stdout
    pub fn is_json(self) -> bool {
        match self {
            OutputFormat::Json => true,
            OutputFormat::Table => false,
            OutputFormat::Auto => !console::Term::stdout().is_term(),
        }
    }
}
