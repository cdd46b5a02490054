//! Block until an HTTP endpoint reports readiness.
//!
//! `waitfor` polls a URL at a fixed interval until it answers with one of a
//! set of accepted status codes, or fails once an overall deadline passes.
//! It is meant to gate a pipeline step (integration tests waiting on a
//! service that is still starting), so it blocks the calling thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use waitfor::{wait_for, PollOutcome, PollSettings};
//!
//! let settings = PollSettings {
//!     timeout: 30,
//!     accepted_status_codes: vec![200, 204],
//!     ..PollSettings::new("http://localhost:8080/health")
//! };
//!
//! match wait_for(settings) {
//!     PollOutcome::Success { status, .. } => println!("ready: {:?}", status),
//!     other => eprintln!("not ready: {:?}", other),
//! }
//! ```
//!
//! # Outcomes
//!
//! - Connection failures and unaccepted status codes are retried after the
//!   polling interval; they never end the poll on their own.
//! - [`PollOutcome::TimedOut`] once the elapsed time exceeds the timeout.
//! - [`PollOutcome::Interrupted`] when the [`CancelToken`] is cancelled.
//! - [`PollOutcome::ConfigError`] for settings rejected before any request.
//!
//! Each request is bounded by [`REQUEST_TIMEOUT`] for connect, send and
//! read, independent of the overall deadline. HTTPS targets with
//! self-signed certificates are accepted.

mod config;
mod error;
mod outcome;
mod poller;
mod probe;
mod time;

pub use config::{
    PollConfig, PollConfigBuilder, PollSettings, RequestMethod, DEFAULT_ACCEPTED_STATUS,
    DEFAULT_POLLING_INTERVAL_MILLIS, DEFAULT_REQUEST_TYPE, DEFAULT_TIMEOUT_SECS,
};
pub use error::{ConfigError, PollError};
pub use http_probe::{ProbeClient, ProbeError, TransportKind, REQUEST_TIMEOUT};
pub use outcome::PollOutcome;
pub use poller::Poller;
pub use probe::Probe;
pub use time::{CancelToken, Clock, FakeTime, Interrupted, Sleeper, SystemClock, ThreadSleeper};

/// Poll with `settings` using a real HTTP client.
///
/// Convenience wrapper over [`Poller::new`] and [`Poller::execute`]. Use a
/// [`Poller`] directly to share a [`CancelToken`] with a signal handler.
pub fn wait_for(settings: PollSettings) -> PollOutcome {
    Poller::new().execute(settings)
}

/// Like [`wait_for`], but stops with `Interrupted` once `cancel` is cancelled
pub fn wait_for_with_cancel(settings: PollSettings, cancel: CancelToken) -> PollOutcome {
    Poller::new().with_cancel_token(cancel).execute(settings)
}
