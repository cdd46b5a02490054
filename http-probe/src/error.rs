//! Error types for the HTTP probe

use thiserror::Error;

/// Errors that prevent a probe from observing a status code
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// No response was received (connection refused, DNS, TLS, timeout)
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: ureq::ErrorKind,
        message: String,
    },

    /// The target could not be turned into a request at all
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ProbeError {
    /// Shorthand for a transport failure of `kind`
    pub fn transport(kind: ureq::ErrorKind, message: impl Into<String>) -> Self {
        ProbeError::Transport {
            kind,
            message: message.into(),
        }
    }
}

impl From<ureq::Transport> for ProbeError {
    fn from(transport: ureq::Transport) -> Self {
        match transport.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                ProbeError::InvalidUrl(transport.to_string())
            }
            kind => ProbeError::transport(kind, transport.to_string()),
        }
    }
}
