//! Command-line interface.
//!
//! Thin wrapper over the service layer: argument parsing, settings assembly,
//! and console reporting live here; pipeline behavior does not.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, Settings};

#[derive(Debug, Parser)]
#[command(
    name = "debchanges",
    version,
    about = "Extract upload history from the debian-devel-changes archive"
)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "DEBCHANGES_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch new archive months and import upload records.
    Sync {
        /// Restrict the sync to a single year.
        #[arg(long)]
        year: Option<i32>,
        /// Restrict the sync to one month within --year.
        #[arg(long, requires = "year", value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        /// Output database path.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Cache database path.
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Maximum concurrent message fetches.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Show row counts for the output dataset.
    Status {
        /// Output database path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::default();
    if let Some(ref path) = cli.config {
        Config::load_from_path(path)?.apply_to_settings(&mut settings);
    }

    match cli.command {
        Command::Sync {
            year,
            month,
            output,
            cache,
            concurrency,
        } => {
            settings.year = year;
            settings.month = month;
            if let Some(output) = output {
                settings.output_path = output;
            }
            if let Some(cache) = cache {
                settings.cache_path = cache;
            }
            if let Some(concurrency) = concurrency {
                settings.concurrency = concurrency;
            }
            commands::sync::cmd_sync(&settings).await
        }
        Command::Status { output } => {
            if let Some(output) = output {
                settings.output_path = output;
            }
            commands::status::cmd_status(&settings)
        }
    }
}
