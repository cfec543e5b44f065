//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::season::FailurePolicy;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// pitwall - read-only gateway over the Ergast Formula 1 API
///
/// Builds per-driver season records by fanning out over every round of a
/// season, and serves standings, schedules, circuits and lap times as JSON
/// or Markdown.
///
/// Examples:
///   pitwall seasonal --season 2021
///   pitwall seasonal --season 2021 --top 5 --format markdown
///   pitwall drivers --season 2021 --round 10
///   pitwall schedule --season 2022 --output schedule.json
///   pitwall laps --season 2021 --round 3 --lap 12
///   pitwall --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(subcommand_required = false, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .pitwall.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Upstream API base URL
    #[arg(long, global = true, value_name = "URL", env = "PITWALL_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transport failures and 5xx responses
    #[arg(long, global = true, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Maximum concurrent per-round fetches
    #[arg(long, global = true, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// How many failed rounds a seasonal query tolerates
    ///
    /// Values: majority, all-failed, strict
    #[arg(long, global = true, value_name = "POLICY")]
    pub failure_policy: Option<FailurePolicy>,

    /// Keep records in completion order instead of sorting by round
    #[arg(long, global = true)]
    pub unsorted: bool,

    /// Abandon the query after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Output format (json, markdown)
    #[arg(long, global = true, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, global = true, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Generate a default .pitwall.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Query to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Per-driver records for every round of a season
    Seasonal {
        /// Season year, e.g. 2021
        #[arg(short, long)]
        season: String,

        /// Keep only the best N drivers by points (0 keeps all)
        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },

    /// Drivers' championship standings
    Drivers {
        #[arg(short, long)]
        season: String,

        /// Standings after this round; latest when omitted
        #[arg(long)]
        round: Option<String>,

        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },

    /// Constructors' championship standings
    Constructors {
        #[arg(short, long)]
        season: String,

        #[arg(long)]
        round: Option<String>,

        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },

    /// Race calendar of a season
    Schedule {
        #[arg(short, long)]
        season: String,
    },

    /// Circuits raced on in a season
    Circuits {
        #[arg(short, long)]
        season: String,
    },

    /// Every driver's time on one lap of a round
    Laps {
        #[arg(short, long)]
        season: String,

        #[arg(long)]
        round: String,

        /// Lap number
        #[arg(long)]
        lap: String,
    },
}

impl Command {
    pub fn season(&self) -> &str {
        match self {
            Command::Seasonal { season, .. }
            | Command::Drivers { season, .. }
            | Command::Constructors { season, .. }
            | Command::Schedule { season }
            | Command::Circuits { season }
            | Command::Laps { season, .. } => season,
        }
    }
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown format
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(ref command) = self.command else {
            return Err("A query subcommand is required".to_string());
        };

        if command.season().trim().is_empty() {
            return Err("Season must not be empty".to_string());
        }

        if let Some(ref base_url) = self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
