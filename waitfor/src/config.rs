//! Poll settings as supplied by the host, and the validated configuration
//! the poller runs with.
//!
//! [`PollSettings`] mirrors what a build tool or command line hands over:
//! plain strings and integers, every field optional except the URL.
//! [`PollConfig`] is the immutable, checked form. The only way from one to
//! the other is [`PollSettings::into_config`] (or [`PollConfig::builder`]),
//! so a `PollConfig` always has a usable URL, a supported method and a
//! non-empty accepted status set.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Overall deadline when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Delay between unsuccessful attempts when none is configured
pub const DEFAULT_POLLING_INTERVAL_MILLIS: u64 = 1000;

/// Request type when none is configured
pub const DEFAULT_REQUEST_TYPE: &str = "GET";

/// Status code accepted when the accepted set is empty
pub const DEFAULT_ACCEPTED_STATUS: u16 = 200;

/// HTTP method used for each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = ConfigError;

    /// Exact, case-sensitive match on `GET` or `POST`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            other => Err(ConfigError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl From<RequestMethod> for http_probe::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => http_probe::Method::Get,
            RequestMethod::Post => http_probe::Method::Post,
        }
    }
}

/// Raw poll settings, in the shape a host passes them in.
///
/// Field names serialize in camelCase so a settings file can use the same
/// keys as the command line documentation (`pollingIntervalMillis`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    /// Target endpoint
    pub url: String,
    /// Overall deadline in seconds
    pub timeout: u64,
    /// `GET` or `POST`
    pub request_type: String,
    /// Codes that count as ready; empty means `[200]`
    pub accepted_status_codes: Vec<u16>,
    /// Delay between unsuccessful attempts
    pub polling_interval_millis: u64,
    /// Bypass polling entirely
    pub skip: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            request_type: DEFAULT_REQUEST_TYPE.to_string(),
            accepted_status_codes: Vec::new(),
            polling_interval_millis: DEFAULT_POLLING_INTERVAL_MILLIS,
            skip: false,
        }
    }
}

impl PollSettings {
    /// Settings for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Parse settings from a JSON document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate the settings into an immutable [`PollConfig`]
    pub fn into_config(self) -> Result<PollConfig, ConfigError> {
        PollConfig::builder(self.url)
            .request_type(self.request_type)
            .timeout(Duration::from_secs(self.timeout))
            .polling_interval(Duration::from_millis(self.polling_interval_millis))
            .accepted_status_codes(self.accepted_status_codes)
            .skip(self.skip)
            .build()
    }
}

/// Validated, immutable poll configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    url: String,
    method: RequestMethod,
    timeout: Duration,
    polling_interval: Duration,
    accepted_status_codes: BTreeSet<u16>,
    skip: bool,
}

impl PollConfig {
    /// Start building a configuration for `url`
    pub fn builder(url: impl Into<String>) -> PollConfigBuilder {
        PollConfigBuilder::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn accepted_status_codes(&self) -> &BTreeSet<u16> {
        &self.accepted_status_codes
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    /// Whether `status` means the endpoint is ready
    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_status_codes.contains(&status)
    }
}

/// Builder for [`PollConfig`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct PollConfigBuilder {
    url: String,
    request_type: String,
    timeout: Duration,
    polling_interval: Duration,
    accepted_status_codes: Vec<u16>,
    skip: bool,
}

impl PollConfigBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_type: DEFAULT_REQUEST_TYPE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            polling_interval: Duration::from_millis(DEFAULT_POLLING_INTERVAL_MILLIS),
            accepted_status_codes: Vec::new(),
            skip: false,
        }
    }

    pub fn method(mut self, method: RequestMethod) -> Self {
        self.request_type = method.as_str().to_string();
        self
    }

    /// Request type as text; checked by `build`
    pub fn request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = request_type.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn accepted_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.accepted_status_codes = codes.into_iter().collect();
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn build(self) -> Result<PollConfig, ConfigError> {
        let url = validate_url(self.url)?;
        let method = self.request_type.parse::<RequestMethod>()?;

        let mut accepted_status_codes: BTreeSet<u16> =
            self.accepted_status_codes.into_iter().collect();
        if accepted_status_codes.is_empty() {
            info!("No HTTP status codes supplied, assuming {}", DEFAULT_ACCEPTED_STATUS);
            accepted_status_codes.insert(DEFAULT_ACCEPTED_STATUS);
        }

        Ok(PollConfig {
            url,
            method,
            timeout: self.timeout,
            polling_interval: self.polling_interval,
            accepted_status_codes,
            skip: self.skip,
        })
    }
}

fn validate_url(url: String) -> Result<String, ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::EmptyUrl);
    }

    let parsed = url::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
