use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic time and blocking waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Real time: `Instant::now` and `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time for tests. `sleep` returns immediately, advancing the clock
/// and recording the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().expect("clock mutex poisoned");
        state.elapsed += by;
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().expect("clock mutex poisoned").sleeps.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().expect("clock mutex poisoned").elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().expect("clock mutex poisoned");
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

/// A point in time after which bounded loops stop starting new steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// `timeout` from now on `clock`.
    pub fn after(clock: &dyn Clock, timeout: Duration) -> Self {
        Self {
            at: clock.now() + timeout,
        }
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.at
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.at.saturating_duration_since(clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_sleep_advances_without_blocking() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(3600));
        clock.sleep(Duration::from_secs(1));
        assert_eq!(clock.now() - start, Duration::from_secs(3601));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_secs(1)]
        );
    }

    #[test]
    fn advance_is_not_a_sleep() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn deadline_expires() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, Duration::from_secs(2));
        assert!(!deadline.is_expired(&clock));
        assert_eq!(deadline.remaining(&clock), Duration::from_secs(2));

        clock.advance(Duration::from_secs(2));
        assert!(deadline.is_expired(&clock));
        assert_eq!(deadline.remaining(&clock), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_is_already_expired() {
        let clock = SystemClock;
        assert!(Deadline::after(&clock, Duration::ZERO).is_expired(&clock));
    }
}
