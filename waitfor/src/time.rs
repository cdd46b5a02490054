//! Clock, sleep and cancellation seams for the poll loop.
//!
//! The poller never calls `Instant::now` or `thread::sleep` directly; it
//! goes through [`Clock`] and [`Sleeper`] so tests can drive elapsed time
//! by hand. Cancellation is a shared flag ([`CancelToken`]) that the
//! sleeper checks while it waits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity at which [`ThreadSleeper`] notices cancellation
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Source of the current instant
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Blocking wait between attempts
pub trait Sleeper {
    /// Wait for `duration`, or return early with [`Interrupted`] if cancelled
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

/// The wait was cancelled from outside the poll loop
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Wait was interrupted")]
pub struct Interrupted;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps on the calling thread in [`SLEEP_SLICE`] steps, checking its token
#[derive(Debug, Clone)]
pub struct ThreadSleeper {
    cancel: CancelToken,
}

impl ThreadSleeper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Interrupted);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }

            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Manually driven time for tests.
///
/// Clones share the same offset, so one handle can be given to the
/// poller as its clock and sleeper while another (or a fake probe)
/// advances time and inspects the recorded sleeps.
#[derive(Debug, Clone)]
pub struct FakeTime {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl FakeTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
            sleeps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Time passed since this fake was created
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Every duration passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Default for FakeTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeTime {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }
}

impl Sleeper for FakeTime {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_thread_sleeper_waits() {
        let sleeper = ThreadSleeper::new(CancelToken::new());
        let start = Instant::now();

        assert_eq!(sleeper.sleep(Duration::from_millis(120)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_thread_sleeper_returns_early_when_cancelled() {
        let token = CancelToken::new();
        let sleeper = ThreadSleeper::new(token.clone());

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let start = Instant::now();
        assert_eq!(sleeper.sleep(Duration::from_secs(30)), Err(Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));

        canceller.join().unwrap();
    }

    #[test]
    fn test_thread_sleeper_zero_duration() {
        let sleeper = ThreadSleeper::new(CancelToken::new());
        assert_eq!(sleeper.sleep(Duration::ZERO), Ok(()));
    }

    #[test]
    fn test_fake_time_records_sleeps() {
        let time = FakeTime::new();
        let start = time.now();

        time.sleep(Duration::from_millis(500)).unwrap();
        time.advance(Duration::from_millis(250));
        time.sleep(Duration::from_millis(500)).unwrap();

        assert_eq!(time.now() - start, Duration::from_millis(1250));
        assert_eq!(time.elapsed(), Duration::from_millis(1250));
        assert_eq!(
            time.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(500)]
        );
    }
}
