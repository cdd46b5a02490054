use crate::error::{ConfigError, PollError};
use std::time::Duration;

/// How a poll ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// An accepted status code was observed, or polling was skipped (`status: None`)
    Success { status: Option<u16>, attempts: u32 },
    /// The overall deadline passed without an accepted status code
    TimedOut {
        url: String,
        elapsed: Duration,
        attempts: u32,
    },
    /// The wait was cancelled from outside
    Interrupted { url: String, attempts: u32 },
    /// The settings were rejected before any request was sent
    ConfigError(ConfigError),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success { .. })
    }

    /// Number of requests issued
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Success { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Interrupted { attempts, .. } => *attempts,
            PollOutcome::ConfigError(_) => 0,
        }
    }

    /// Convert into a `Result`, keeping the observed status code on success
    pub fn into_result(self) -> Result<Option<u16>, PollError> {
        match self {
            PollOutcome::Success { status, .. } => Ok(status),
            PollOutcome::TimedOut { url, elapsed, .. } => Err(PollError::TimedOut { url, elapsed }),
            PollOutcome::Interrupted { url, .. } => Err(PollError::Interrupted { url }),
            PollOutcome::ConfigError(e) => Err(PollError::Config(e)),
        }
    }
}

impl From<ConfigError> for PollOutcome {
    fn from(error: ConfigError) -> Self {
        PollOutcome::ConfigError(error)
    }
}
