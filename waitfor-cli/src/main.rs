use anyhow::{Context, Result};
use tracing::{error, info, warn};
use waitfor::{wait_for_with_cancel, CancelToken, PollOutcome};

pub mod settings;

use settings::CliConfig;

/// Exit status when the endpoint did not become ready
const EXIT_NOT_READY: i32 = 1;

/// Exit status for invalid flags, environment or settings
const EXIT_CONFIG: i32 = 2;

/// Initialize tracing/logging with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = log_level.to_lowercase();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    Ok(())
}

/// Cancel `token` on Ctrl+C so a pending wait ends as `Interrupted`
fn install_interrupt_handler(token: &CancelToken) {
    let token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("Failed to install Ctrl+C handler, interrupts will not be reported: {}", e);
    }
}

/// Map an outcome to the process exit status, logging terminal failures
fn exit_code(outcome: PollOutcome) -> i32 {
    let config_error = matches!(outcome, PollOutcome::ConfigError(_));

    match outcome.into_result() {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            if config_error {
                EXIT_CONFIG
            } else {
                EXIT_NOT_READY
            }
        }
    }
}

fn main() {
    let config = match CliConfig::from_env().context("Failed to parse configuration") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("waitfor: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = init_tracing(&config.log_level).context("Failed to initialize logging") {
        eprintln!("waitfor: {:#}", e);
    }

    config.print_summary();

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    let outcome = wait_for_with_cancel(config.settings, cancel);
    if let PollOutcome::Success { status: None, .. } = outcome {
        info!("Polling was skipped, continuing");
    }

    std::process::exit(exit_code(outcome));
}
