//! Private single-shot HTTP probe for readiness polling
//!
//! This crate issues exactly one HTTP request against a target, with fixed
//! per-request timeouts, drains whatever body comes back and reports the
//! status code. Every status code counts as "a response was received";
//! only failures that happen before a status line arrives are errors.

mod error;

pub use error::ProbeError;
/// Category of a [`ProbeError::Transport`] failure
pub use ureq::ErrorKind as TransportKind;

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound applied to connection establishment, request send and response read
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Response bytes read and discarded per probe before the connection is dropped
pub const MAX_DRAIN_BYTES: u64 = 1024 * 1024;

/// HTTP methods a probe can be sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate validation applied by a [`ProbeClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Any server certificate and hostname is accepted
    TrustAll,
    /// Standard chain and hostname validation
    Verified,
}

/// A minimal HTTP client that reports status codes
#[derive(Debug, Clone)]
pub struct ProbeClient {
    agent: ureq::Agent,
    tls_mode: TlsMode,
}

impl ProbeClient {
    /// Create a probe client that accepts self-signed certificates.
    ///
    /// If the permissive TLS connector cannot be built, the client falls
    /// back to default certificate validation and logs the degradation.
    pub fn new() -> Self {
        match trust_all_connector() {
            Ok(connector) => Self {
                agent: agent_builder().tls_connector(Arc::new(connector)).build(),
                tls_mode: TlsMode::TrustAll,
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to create a client that trusts self-signed certificates, using default validation"
                );
                Self::verified()
            }
        }
    }

    /// Create a probe client with standard certificate validation
    pub fn verified() -> Self {
        Self {
            agent: agent_builder().build(),
            tls_mode: TlsMode::Verified,
        }
    }

    /// Certificate validation this client ended up with
    pub fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// Send one request and return the response status code.
    ///
    /// 4xx and 5xx responses are returned as `Ok`; the body is drained in
    /// every case so the pooled connection can be reused.
    pub fn probe(&self, method: Method, url: &str) -> Result<u16, ProbeError> {
        let request = self.agent.request(method.as_str(), url);

        let result = match method {
            Method::Get => request.call(),
            // Content-Length: 0 rather than a bodyless POST
            Method::Post => request.send_bytes(&[]),
        };

        match result {
            Ok(response) => Ok(drain(response)),
            Err(ureq::Error::Status(_, response)) => Ok(drain(response)),
            Err(ureq::Error::Transport(transport)) => Err(transport.into()),
        }
    }
}

impl Default for ProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

fn agent_builder() -> ureq::AgentBuilder {
    ureq::AgentBuilder::new()
        .timeout_connect(REQUEST_TIMEOUT)
        .timeout_read(REQUEST_TIMEOUT)
        .timeout_write(REQUEST_TIMEOUT)
}

fn trust_all_connector() -> Result<native_tls::TlsConnector, native_tls::Error> {
    native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
}

fn drain(response: ureq::Response) -> u16 {
    let status = response.status();
    let mut body = response.into_reader().take(MAX_DRAIN_BYTES);

    match io::copy(&mut body, &mut io::sink()) {
        Ok(bytes) => debug!(status, bytes, "Drained response body"),
        // The status line already arrived; a broken body doesn't change the answer
        Err(e) => debug!(status, error = %e, "Failed to drain response body"),
    }

    status
}
