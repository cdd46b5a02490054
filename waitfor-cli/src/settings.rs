//! Command line and environment handling.
//!
//! Settings are layered: built-in defaults, then an optional JSON settings
//! file, then command line flags, then `WAITFOR_*` environment variables.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use waitfor::PollSettings;

/// Wait for an HTTP endpoint to report readiness
///
/// Polls URL at a fixed interval until it answers with an accepted status
/// code. Exits 0 when ready, 1 on timeout or interruption, 2 on invalid
/// configuration.
#[derive(Parser, Debug)]
#[command(name = "waitfor")]
#[command(about = "Block a pipeline step until an HTTP endpoint reports readiness")]
#[command(version)]
pub struct Args {
    /// Target endpoint to poll
    #[arg(short, long)]
    pub url: Option<String>,

    /// Overall deadline in seconds [default: 120]
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// HTTP method, GET or POST [default: GET]
    #[arg(short = 'X', long)]
    pub request_type: Option<String>,

    /// Status codes that count as ready, comma separated [default: 200]
    #[arg(short = 'c', long, value_delimiter = ',')]
    pub accepted_status_codes: Vec<u16>,

    /// Delay between attempts in milliseconds [default: 1000]
    #[arg(short = 'i', long)]
    pub polling_interval_millis: Option<u64>,

    /// Skip polling and exit successfully (env WAITFOR_SKIP=true|false)
    #[arg(long)]
    pub skip: bool,

    /// JSON file with poll settings; flags override its values
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate arguments that are not part of the poll settings
    pub fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(anyhow::anyhow!(
                "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                self.log_level
            )),
        }
    }
}

/// Everything the binary needs after argument parsing
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub settings: PollSettings,
    pub log_level: String,
}

impl CliConfig {
    /// Create configuration from command line arguments and environment variables
    pub fn from_env() -> Result<Self> {
        Self::resolve(Args::parse(), |key| std::env::var(key).ok())
    }

    /// Layer file, flags and environment (looked up through `env`) into one config
    pub fn resolve<F>(mut args: Args, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Override with environment variables if present
        if let Some(url) = env("WAITFOR_URL") {
            args.url = Some(url);
        }

        if let Some(timeout) = env("WAITFOR_TIMEOUT") {
            args.timeout = Some(
                timeout
                    .trim()
                    .parse()
                    .context("Invalid WAITFOR_TIMEOUT environment variable")?,
            );
        }

        if let Some(request_type) = env("WAITFOR_REQUEST_TYPE") {
            args.request_type = Some(request_type);
        }

        if let Some(codes) = env("WAITFOR_ACCEPTED_STATUS_CODES") {
            args.accepted_status_codes = parse_status_codes(&codes)
                .context("Invalid WAITFOR_ACCEPTED_STATUS_CODES environment variable")?;
        }

        if let Some(interval) = env("WAITFOR_POLLING_INTERVAL_MILLIS") {
            args.polling_interval_millis = Some(
                interval
                    .trim()
                    .parse()
                    .context("Invalid WAITFOR_POLLING_INTERVAL_MILLIS environment variable")?,
            );
        }

        if let Some(skip) = env("WAITFOR_SKIP") {
            args.skip = parse_flag(&skip).context("Invalid WAITFOR_SKIP environment variable")?;
        }

        if let Some(path) = env("WAITFOR_SETTINGS") {
            args.settings = Some(PathBuf::from(path));
        }

        if let Some(log_level) = env("WAITFOR_LOG_LEVEL") {
            args.log_level = log_level;
        }

        args.validate()?;

        let base = match &args.settings {
            Some(path) => load_settings_file(path)?,
            None => PollSettings::default(),
        };

        Ok(Self {
            settings: merge(base, &args),
            log_level: args.log_level,
        })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let settings = &self.settings;
        info!("Configuration:");
        info!("  URL: {}", settings.url);
        info!("  Timeout: {}s", settings.timeout);
        info!("  Request type: {}", settings.request_type);
        info!("  Accepted status codes: {:?}", settings.accepted_status_codes);
        info!("  Polling interval: {}ms", settings.polling_interval_millis);
        info!("  Skip: {}", settings.skip);
    }
}

fn merge(mut settings: PollSettings, args: &Args) -> PollSettings {
    if let Some(url) = &args.url {
        settings.url = url.clone();
    }
    if let Some(timeout) = args.timeout {
        settings.timeout = timeout;
    }
    if let Some(request_type) = &args.request_type {
        settings.request_type = request_type.clone();
    }
    if !args.accepted_status_codes.is_empty() {
        settings.accepted_status_codes = args.accepted_status_codes.clone();
    }
    if let Some(interval) = args.polling_interval_millis {
        settings.polling_interval_millis = interval;
    }
    settings.skip |= args.skip;
    settings
}

fn load_settings_file(path: &Path) -> Result<PollSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    PollSettings::from_json(&text)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))
}

/// Boolean env values; an empty value counts as set
fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("'{}' is not a boolean", other)),
    }
}

fn parse_status_codes(value: &str) -> Result<Vec<u16>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<u16>()
                .with_context(|| format!("'{}' is not a status code", code))
        })
        .collect()
}
