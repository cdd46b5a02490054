use std::time::Duration;
use thiserror::Error;

/// Problems with the settings, detected before any request is sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No URL configured")]
    EmptyUrl,

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("Unsupported request type '{0}', expected GET or POST")]
    UnsupportedMethod(String),
}

/// Terminal failures of a poll, for callers that prefer `?` over matching
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Timed out after {elapsed:.1?} while waiting for service at {url}")]
    TimedOut { url: String, elapsed: Duration },

    #[error("Interrupted while waiting for service at {url}")]
    Interrupted { url: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
