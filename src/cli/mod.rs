//! CLI implementation using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{ExportFormat, Verbosity};

/// Defectset - release-level defect dataset builder.
#[derive(Parser)]
#[command(name = "defectset")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the git repository and optional defectset.toml
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Output format for the run summary
    #[arg(short, long, value_enum, default_value = "markdown")]
    pub format: OutputFormat,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the labeled dataset and write the exports
    Build(BuildArgs),

    /// Compute a cold-start proportion from reference projects
    #[command(alias = "cs")]
    ColdStart(ColdStartArgs),

    /// List the release timeline of a project
    #[command(alias = "versions")]
    Releases(ReleasesArgs),

    /// Print a commented default configuration
    Init,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Issue tracker project key
    #[arg(long, env = "DEFECTSET_PROJECT")]
    pub project: Option<String>,

    /// Percentage of leading releases to export (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub percentage: Option<u8>,

    /// Cold-start proportion, skipping the reference computation
    #[arg(long)]
    pub cold_start: Option<f64>,

    /// Directory the exports are written to
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Export formats (repeatable)
    #[arg(long = "export", value_enum)]
    pub exports: Vec<ExportFormat>,

    /// Log narration level
    #[arg(long, value_enum)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Args)]
pub struct ColdStartArgs {
    /// Reference project keys; defaults to the configured ones
    #[arg(long, value_name = "KEY", num_args = 1..)]
    pub reference: Vec<String>,
}

#[derive(Args)]
pub struct ReleasesArgs {
    /// Issue tracker project key; defaults to the configured one
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Markdown,
    Text,
}
