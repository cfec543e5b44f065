//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.pitwall.toml` files.

use crate::cli::OutputFormat;
use crate::season::FailurePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".pitwall.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Season aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Upstream statistics API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every resource path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Overall timeout for one request, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts for transport failures and 5xx responses.
    #[serde(default)]
    pub retries: u32,

    /// User-Agent header sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            retries: 0,
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://ergast.com/api/f1".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("pitwall/{}", env!("CARGO_PKG_VERSION"))
}

/// Seasonal aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Ceiling on concurrent per-round fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// When a season scan with failed rounds is still reported.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Sort each driver's records by round before reporting.
    #[serde(default = "default_true")]
    pub sort_records: bool,

    /// Overall deadline for one query, in seconds.
    #[serde(default)]
    pub query_timeout_seconds: Option<u64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            sort_records: true,
            query_timeout_seconds: None,
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Rendering format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Destination file; stdout when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref base_url) = args.base_url {
            self.upstream.base_url = base_url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.upstream.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.upstream.retries = retries;
        }

        if let Some(concurrency) = args.concurrency {
            self.aggregation.concurrency = concurrency;
        }
        if let Some(policy) = args.failure_policy {
            self.aggregation.failure_policy = policy;
        }
        if args.unsorted {
            self.aggregation.sort_records = false;
        }
        if let Some(deadline) = args.deadline {
            self.aggregation.query_timeout_seconds = Some(deadline);
        }

        if let Some(format) = args.format {
            self.output.format = format;
        }
        if let Some(ref output) = args.output {
            self.output.path = Some(output.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
