//! pitwall - read-only gateway over the Ergast Formula 1 API
//!
//! A CLI that aggregates a season's round results into per-driver
//! records and serves standings, schedules, circuits and lap times as
//! reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (upstream failure, config, cancellation, etc.)
//!   2 - Seasonal report produced, but some rounds could not be fetched

mod cli;
mod config;
mod error;
mod models;
mod report;
mod season;
mod upstream;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use report::{Document, ReportBody, ReportMetadata};
use season::{cancellable, fetchers, AggregationSettings, SeasonAggregator, SeasonQuery};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use upstream::UpstreamClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args)?;

    info!("pitwall v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_query(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Query failed: {}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .pitwall.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the upstream, concurrency, and failure policy.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so reports printed to stdout stay clean.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run one query end to end. Returns exit code (0 or 2).
async fn run_query(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let command = args
        .command
        .clone()
        .context("A query subcommand is required")?;
    let season = command.season().trim().to_string();

    let client = UpstreamClient::new(&config.upstream)?;
    let source = client.base_url().to_string();

    if !args.quiet {
        eprintln!("🏁 Querying {} for season {}", source, season);
    }

    let cancel = CancellationToken::new();
    watch_for_interrupt(cancel.clone());
    if let Some(secs) = config.aggregation.query_timeout_seconds {
        watch_deadline(cancel.clone(), Duration::from_secs(secs));
    }

    let (body, degraded) = match command {
        Command::Seasonal { season, top } => {
            let aggregator = SeasonAggregator::new(
                Arc::new(client),
                AggregationSettings::from(&config.aggregation),
            );
            let query = SeasonQuery {
                top,
                ..SeasonQuery::new(season)
            };
            let outcome = aggregator.aggregate(&query, &cancel).await?;
            (ReportBody::Seasonal(outcome.report), outcome.degraded)
        }
        Command::Drivers { season, round, top } => {
            let report = cancellable(
                &cancel,
                fetchers::driver_standings(&client, &season, round.as_deref(), top),
            )
            .await?;
            (ReportBody::DriverStandings(report), None)
        }
        Command::Constructors { season, round, top } => {
            let report = cancellable(
                &cancel,
                fetchers::constructor_standings(&client, &season, round.as_deref(), top),
            )
            .await?;
            (ReportBody::ConstructorStandings(report), None)
        }
        Command::Schedule { season } => {
            let report =
                cancellable(&cancel, fetchers::schedule_report(&client, &season)).await?;
            (ReportBody::Schedule(report), None)
        }
        Command::Circuits { season } => {
            let report =
                cancellable(&cancel, fetchers::circuits_report(&client, &season)).await?;
            (ReportBody::Circuits(report), None)
        }
        Command::Laps { season, round, lap } => {
            let report = cancellable(
                &cancel,
                fetchers::lap_times(&client, &season, &round, &lap),
            )
            .await?;
            (ReportBody::LapTimes(report), None)
        }
    };

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        season,
        source,
        generated_at: Utc::now(),
        duration_seconds: duration,
    };
    let document = Document::new(metadata, body).with_degraded(degraded.as_ref());

    let output = match config.output.format {
        OutputFormat::Json => report::generate_json_report(&document)?,
        OutputFormat::Markdown => report::generate_markdown_report(&document),
    };

    match config.output.path {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !args.quiet {
                eprintln!("✅ Report saved to: {} ({:.1}s)", path.display(), duration);
            }
        }
        None => println!("{}", output),
    }

    if let Some(warning) = degraded {
        warn!("{}", warning);
        eprintln!(
            "\n⚠️  Report is incomplete, missing rounds: {}",
            warning.rounds().join(", ")
        );
        return Ok(2);
    }

    Ok(0)
}

/// Cancel the in-flight query on Ctrl-C.
fn watch_for_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling query");
            cancel.cancel();
        }
    });
}

/// Cancel the in-flight query once `deadline` has passed.
fn watch_deadline(cancel: CancellationToken, deadline: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                warn!("Query deadline of {}s reached, cancelling", deadline.as_secs());
                cancel.cancel();
            }
        }
    });
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
