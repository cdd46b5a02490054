//! The poll loop.
//!
//! Each iteration checks the deadline, sends one request, and then either
//! stops (accepted status) or sleeps for the polling interval. Transport
//! failures and unaccepted status codes are both "not ready yet"; only the
//! deadline and cancellation end the loop without success.

use crate::config::{PollConfig, PollSettings};
use crate::outcome::PollOutcome;
use crate::probe::Probe;
use crate::time::{CancelToken, Clock, Sleeper, SystemClock, ThreadSleeper};
use http_probe::ProbeClient;
use tracing::{debug, info, warn};

/// Polls an endpoint until it reports readiness or the deadline passes
#[derive(Debug)]
pub struct Poller<P, C = SystemClock, S = ThreadSleeper> {
    probe: P,
    clock: C,
    sleeper: S,
    cancel: CancelToken,
}

impl Poller<ProbeClient> {
    /// Poller backed by a real HTTP client, the wall clock and thread sleeps
    pub fn new() -> Self {
        Self::with_probe(ProbeClient::new())
    }
}

impl Default for Poller<ProbeClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe> Poller<P> {
    pub fn with_probe(probe: P) -> Self {
        let cancel = CancelToken::new();
        Self {
            probe,
            clock: SystemClock,
            sleeper: ThreadSleeper::new(cancel.clone()),
            cancel,
        }
    }
}

impl<P, C> Poller<P, C, ThreadSleeper> {
    /// Share `token` with the poller; cancelling it ends the poll as `Interrupted`
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.sleeper = ThreadSleeper::new(token.clone());
        self.cancel = token;
        self
    }
}

impl<P, C, S> Poller<P, C, S> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Poller<P, C2, S> {
        Poller {
            probe: self.probe,
            clock,
            sleeper: self.sleeper,
            cancel: self.cancel,
        }
    }

    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Poller<P, C, S2> {
        Poller {
            probe: self.probe,
            clock: self.clock,
            sleeper,
            cancel: self.cancel,
        }
    }

    /// Token observed after every request; cancel it to stop the poll
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl<P: Probe, C: Clock, S: Sleeper> Poller<P, C, S> {
    /// Poll with raw host settings.
    ///
    /// `skip` is honoured before anything else is looked at, so a skipped
    /// poll succeeds even with an empty URL or an unsupported request type.
    pub fn execute(&self, settings: PollSettings) -> PollOutcome {
        if settings.skip {
            info!("Polling skipped");
            return PollOutcome::Success {
                status: None,
                attempts: 0,
            };
        }

        match settings.into_config() {
            Ok(config) => self.run(&config),
            Err(e) => PollOutcome::ConfigError(e),
        }
    }

    /// Poll with an already validated configuration
    pub fn run(&self, config: &PollConfig) -> PollOutcome {
        if config.skip() {
            info!("Polling skipped");
            return PollOutcome::Success {
                status: None,
                attempts: 0,
            };
        }

        info!(
            "Waiting for HTTP {:?} from {}",
            config.accepted_status_codes(),
            config.url()
        );

        let start = self.clock.now();
        let mut attempts: u32 = 0;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed > config.timeout() {
                warn!(
                    url = config.url(),
                    attempts,
                    "Timed out after {:.1?} while waiting for service",
                    elapsed
                );
                return PollOutcome::TimedOut {
                    url: config.url().to_string(),
                    elapsed,
                    attempts,
                };
            }

            attempts = next_attempt(attempts);
            debug!(
                attempt = attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "{} {}",
                config.method(),
                config.url()
            );

            let result = self.probe.probe(config.method(), config.url());

            if self.cancel.is_cancelled() {
                return self.interrupted(config, attempts);
            }

            match result {
                Ok(status) if config.accepts(status) => {
                    info!("Got accepted response code: {}", status);
                    info!("Resuming");
                    return PollOutcome::Success {
                        status: Some(status),
                        attempts,
                    };
                }
                Ok(status) => {
                    info!(
                        "Got response, but status code {} is not accepted; continuing until timeout",
                        status
                    );
                }
                Err(e) => {
                    info!(error = %e, "No connection, retrying");
                }
            }

            if self.sleeper.sleep(config.polling_interval()).is_err() {
                return self.interrupted(config, attempts);
            }
        }
    }

    fn interrupted(&self, config: &PollConfig, attempts: u32) -> PollOutcome {
        warn!(url = config.url(), attempts, "Interrupted while waiting for service");
        PollOutcome::Interrupted {
            url: config.url().to_string(),
            attempts,
        }
    }
}

/// Attempt counter step; pins at `u32::MAX` instead of overflowing
fn next_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestMethod;
    use crate::error::ConfigError;
    use crate::time::{FakeTime, Interrupted};
    use http_probe::{ProbeError, TransportKind};
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted results, repeating the last one once the script runs out
    struct ScriptedProbe {
        script: RefCell<VecDeque<Result<u16, ProbeError>>>,
        last: RefCell<Result<u16, ProbeError>>,
        calls: Cell<u32>,
        methods: RefCell<Vec<RequestMethod>>,
        time: FakeTime,
        cost: Duration,
        cancel_on_call: Option<(u32, CancelToken)>,
    }

    impl ScriptedProbe {
        fn new(time: &FakeTime, script: Vec<Result<u16, ProbeError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                last: RefCell::new(Err(refused())),
                calls: Cell::new(0),
                methods: RefCell::new(Vec::new()),
                time: time.clone(),
                cost: Duration::ZERO,
                cancel_on_call: None,
            }
        }

        fn always(time: &FakeTime, result: Result<u16, ProbeError>) -> Self {
            Self::new(time, vec![result])
        }

        /// Every request takes `cost` of simulated time
        fn with_cost(mut self, cost: Duration) -> Self {
            self.cost = cost;
            self
        }

        fn cancelling_on(mut self, call: u32, token: CancelToken) -> Self {
            self.cancel_on_call = Some((call, token));
            self
        }
    }

    impl Probe for &ScriptedProbe {
        fn probe(&self, method: RequestMethod, _url: &str) -> Result<u16, ProbeError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            self.methods.borrow_mut().push(method);
            self.time.advance(self.cost);

            if let Some((on, token)) = &self.cancel_on_call {
                if *on == call {
                    token.cancel();
                }
            }

            match self.script.borrow_mut().pop_front() {
                Some(result) => {
                    *self.last.borrow_mut() = result.clone();
                    result
                }
                None => self.last.borrow().clone(),
            }
        }
    }

    struct InterruptingSleeper;

    impl Sleeper for InterruptingSleeper {
        fn sleep(&self, _duration: Duration) -> Result<(), Interrupted> {
            Err(Interrupted)
        }
    }

    fn refused() -> ProbeError {
        ProbeError::transport(TransportKind::ConnectionFailed, "Connection refused")
    }

    fn poller<'a>(probe: &'a ScriptedProbe, time: &FakeTime) -> Poller<&'a ScriptedProbe, FakeTime, FakeTime> {
        Poller::with_probe(probe)
            .with_clock(time.clone())
            .with_sleeper(time.clone())
    }

    fn config(timeout: Duration, interval: Duration) -> PollConfig {
        PollConfig::builder("http://localhost:9999/health")
            .timeout(timeout)
            .polling_interval(interval)
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_accepted_response_returns_without_sleeping() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(200));

        let outcome = poller(&probe, &time).run(&config(Duration::from_secs(120), Duration::from_secs(1)));

        assert_eq!(outcome, PollOutcome::Success { status: Some(200), attempts: 1 });
        assert_eq!(probe.calls.get(), 1);
        assert!(time.sleeps().is_empty());
    }

    #[test]
    fn test_second_accepted_code_on_first_call() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(204));
        let config = PollConfig::builder("http://localhost:9999/health")
            .accepted_status_codes([200, 204])
            .build()
            .unwrap();

        let outcome = poller(&probe, &time).run(&config);

        assert_eq!(outcome, PollOutcome::Success { status: Some(204), attempts: 1 });
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn test_skip_issues_no_requests() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(200));
        let settings = PollSettings {
            url: String::new(),
            request_type: "PUT".to_string(),
            skip: true,
            ..Default::default()
        };

        let outcome = poller(&probe, &time).execute(settings);

        assert_eq!(outcome, PollOutcome::Success { status: None, attempts: 0 });
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn test_skip_in_validated_config() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Err(refused()));
        let config = PollConfig::builder("http://localhost:9999/health")
            .skip(true)
            .build()
            .unwrap();

        assert!(poller(&probe, &time).run(&config).is_success());
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn test_unsupported_method_fails_before_any_request() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(200));
        let settings = PollSettings {
            request_type: "PUT".to_string(),
            ..PollSettings::new("http://localhost:9999/health")
        };

        let outcome = poller(&probe, &time).execute(settings);

        assert_eq!(
            outcome,
            PollOutcome::ConfigError(ConfigError::UnsupportedMethod("PUT".to_string()))
        );
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn test_connection_failures_time_out() {
        // Nothing listening: timeout 2s, interval 500ms
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Err(refused()));

        let outcome = poller(&probe, &time).run(&config(Duration::from_secs(2), Duration::from_millis(500)));

        match outcome {
            PollOutcome::TimedOut { url, elapsed, attempts } => {
                assert_eq!(url, "http://localhost:9999/health");
                assert_eq!(elapsed, Duration::from_millis(2500));
                // Attempts at 0, 0.5, 1.0, 1.5 and 2.0 seconds
                assert_eq!(attempts, 5);
            }
            other => panic!("Expected PollOutcome::TimedOut, got {:?}", other),
        }
        assert_eq!(probe.calls.get(), 5);
        assert_eq!(time.sleeps(), vec![Duration::from_millis(500); 5]);
    }

    #[test]
    fn test_slow_requests_count_against_deadline() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Err(ProbeError::transport(TransportKind::Io, "timed out")))
            .with_cost(Duration::from_secs(5));

        let outcome = poller(&probe, &time).run(&config(Duration::from_secs(10), Duration::from_secs(1)));

        // Each cycle costs 6s: attempts at 0 and 6, then 12 > 10
        assert_eq!(outcome.attempts(), 2);
        assert!(matches!(outcome, PollOutcome::TimedOut { elapsed, .. } if elapsed == Duration::from_secs(12)));
    }

    #[test]
    fn test_unaccepted_status_until_just_before_deadline() {
        let time = FakeTime::new();
        let mut script = vec![Ok(503); 10];
        script.push(Ok(200));
        let probe = ScriptedProbe::new(&time, script);

        let outcome = poller(&probe, &time).run(&config(Duration::from_secs(10), Duration::from_secs(1)));

        // The eleventh attempt lands exactly on the deadline, which is still in time
        assert_eq!(outcome, PollOutcome::Success { status: Some(200), attempts: 11 });
        assert_eq!(time.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_mixed_failures_then_ready() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::new(
            &time,
            vec![Err(refused()), Err(refused()), Ok(503), Ok(404), Ok(200)],
        );

        let outcome = poller(&probe, &time).run(&config(Duration::from_secs(120), Duration::from_secs(1)));

        assert_eq!(outcome, PollOutcome::Success { status: Some(200), attempts: 5 });
        assert_eq!(time.sleeps().len(), 4);
    }

    #[test]
    fn test_error_status_can_be_accepted() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(401));
        let config = PollConfig::builder("http://localhost:9999/health")
            .accepted_status_codes([401])
            .build()
            .unwrap();

        assert_eq!(
            poller(&probe, &time).run(&config),
            PollOutcome::Success { status: Some(401), attempts: 1 }
        );
    }

    #[test]
    fn test_configured_method_is_used() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::new(&time, vec![Ok(503), Ok(200)]);
        let config = PollConfig::builder("http://localhost:9999/health")
            .method(RequestMethod::Post)
            .build()
            .unwrap();

        assert!(poller(&probe, &time).run(&config).is_success());
        assert_eq!(*probe.methods.borrow(), vec![RequestMethod::Post, RequestMethod::Post]);
    }

    #[test]
    fn test_interrupted_during_sleep() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(503));
        let poller = Poller::with_probe(&probe)
            .with_clock(time.clone())
            .with_sleeper(InterruptingSleeper);

        let outcome = poller.run(&config(Duration::from_secs(120), Duration::from_secs(1)));

        assert_eq!(
            outcome,
            PollOutcome::Interrupted {
                url: "http://localhost:9999/health".to_string(),
                attempts: 1
            }
        );
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn test_cancel_observed_when_request_returns() {
        let time = FakeTime::new();
        let token = CancelToken::new();
        let probe = ScriptedProbe::always(&time, Err(refused())).cancelling_on(3, token.clone());
        let poller = Poller::with_probe(&probe)
            .with_cancel_token(token)
            .with_clock(time.clone())
            .with_sleeper(time.clone());

        let outcome = poller.run(&config(Duration::from_secs(120), Duration::from_secs(1)));

        assert!(matches!(outcome, PollOutcome::Interrupted { attempts: 3, .. }));
        assert_eq!(time.sleeps().len(), 2);
    }

    #[test]
    fn test_cancel_before_start_with_thread_sleeper() {
        let probe_time = FakeTime::new();
        let probe = ScriptedProbe::always(&probe_time, Ok(503));
        let poller = Poller::with_probe(&probe);
        poller.cancel_token().cancel();

        let outcome = poller.run(&config(Duration::from_secs(120), Duration::from_secs(30)));

        assert!(matches!(outcome, PollOutcome::Interrupted { attempts: 1, .. }));
    }

    #[test]
    fn test_zero_timeout_makes_one_attempt() {
        let time = FakeTime::new();
        let probe = ScriptedProbe::always(&time, Ok(503));

        let outcome = poller(&probe, &time).run(&config(Duration::ZERO, Duration::from_millis(10)));

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 1, .. }));
    }

    #[test]
    fn test_attempt_counter_saturates() {
        assert_eq!(next_attempt(0), 1);
        assert_eq!(next_attempt(u32::MAX - 1), u32::MAX);
        assert_eq!(next_attempt(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_transport_error_reports_kind() {
        let message = refused().to_string();
        assert!(message.contains("Connection refused"), "{}", message);
        assert!(matches!(
            refused(),
            ProbeError::Transport { kind: TransportKind::ConnectionFailed, .. }
        ));
    }

    proptest! {
        /// With instant transport failures the attempt count tracks timeout / interval
        #[test]
        fn test_attempts_track_timeout_over_interval(
            timeout_secs in 1u64..60,
            interval_ms in 50u64..5000,
        ) {
            let time = FakeTime::new();
            let probe = ScriptedProbe::always(&time, Err(refused()));
            let outcome = poller(&probe, &time).run(&config(
                Duration::from_secs(timeout_secs),
                Duration::from_millis(interval_ms),
            ));

            let expected = (timeout_secs * 1000) / interval_ms;
            let attempts = u64::from(outcome.attempts());
            prop_assert!(matches!(outcome, PollOutcome::TimedOut { .. }), "outcome should be a timeout");
            prop_assert!(attempts + 1 >= expected && attempts <= expected + 1,
                "attempts {} not within one of {}", attempts, expected);
        }

        /// A ready response anywhere inside the deadline is reported as success
        #[test]
        fn test_ready_within_deadline_succeeds(not_ready in 0usize..20, status in prop::sample::select(vec![404u16, 500, 502, 503])) {
            let time = FakeTime::new();
            let mut script = vec![Ok(status); not_ready];
            script.push(Ok(200));
            let probe = ScriptedProbe::new(&time, script);

            let outcome = poller(&probe, &time).run(&config(Duration::from_secs(20), Duration::from_secs(1)));

            prop_assert_eq!(outcome, PollOutcome::Success { status: Some(200), attempts: not_ready as u32 + 1 });
        }

        /// Any empty accepted set behaves as {200}
        #[test]
        fn test_empty_accepted_set_means_200(status in 100u16..600) {
            let config = PollConfig::builder("http://localhost/").build().unwrap();
            prop_assert_eq!(config.accepts(status), status == 200);
        }
    }
}
