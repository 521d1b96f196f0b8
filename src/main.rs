//! Defectset CLI - release-level defect dataset builder.

use std::io::{stdout, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use defectset::cli::{BuildArgs, Cli, Command, OutputFormat};
use defectset::config::Config;
use defectset::core::Error;
use defectset::git::GitRepo;
use defectset::output::{write_exports, Format};
use defectset::pipeline::{compute_cold_start, load_timeline, Pipeline, Summary};
use defectset::tracker::JiraClient;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v shows stage summaries.
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> defectset::core::Result<()> {
    let format = match cli.format {
        OutputFormat::Json => Format::Json,
        OutputFormat::Markdown => Format::Markdown,
        OutputFormat::Text => Format::Text,
    };

    if let Command::Init = cli.command {
        print!("{}", Config::default_toml());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_default(&cli.path)?,
    };

    match cli.command {
        Command::Build(args) => {
            apply_overrides(&mut config, args);
            config.validate()?;
            let repo = GitRepo::open(cli.path.join(&config.repository))?;
            let tracker = JiraClient::new(&config.tracker);
            let build = Pipeline::new(&config, &repo, &repo, &tracker).run()?;
            let written = write_exports(&build, &config.output)?;
            let report = BuildReport {
                summary: build.summary(),
                exports: written,
            };
            format.format(&report, &mut stdout())?;
        }
        Command::ColdStart(args) => {
            let references = if args.reference.is_empty() {
                config.estimator.reference_projects.clone()
            } else {
                args.reference
            };
            let tracker = JiraClient::new(&config.tracker);
            let proportion =
                compute_cold_start(&tracker, &references, config.estimator.window_fraction)?;
            format.format(
                &ColdStartReport {
                    reference_projects: references,
                    cold_start: proportion,
                },
                &mut stdout(),
            )?;
        }
        Command::Releases(args) => {
            let project = args.project.unwrap_or_else(|| config.project.clone());
            if project.is_empty() {
                return Err(Error::config("no project given"));
            }
            let tracker = JiraClient::new(&config.tracker);
            let timeline = load_timeline(&tracker, &project)?;
            format.format(&timeline, &mut stdout())?;
        }
        Command::Init => {}
    }

    stdout().flush()?;
    Ok(())
}

/// Command-line values take precedence over file and environment config.
fn apply_overrides(config: &mut Config, args: BuildArgs) {
    if let Some(project) = args.project {
        config.project = project;
    }
    if let Some(percentage) = args.percentage {
        config.releases.percentage = percentage;
    }
    if args.cold_start.is_some() {
        config.estimator.cold_start = args.cold_start;
    }
    if let Some(out) = args.out {
        config.output.dir = out;
    }
    if !args.exports.is_empty() {
        config.output.formats = args.exports;
    }
    if let Some(verbosity) = args.verbosity {
        config.verbosity = verbosity;
    }
}

#[derive(Serialize)]
struct BuildReport {
    summary: Summary,
    exports: Vec<PathBuf>,
}

#[derive(Serialize)]
struct ColdStartReport {
    reference_projects: Vec<String>,
    cold_start: f64,
}
