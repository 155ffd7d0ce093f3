//! Clock Abstraction
//!
//! Bucket selection works on local wall-clock time. Everything that needs
//! "now" goes through [`StatClock`] so tests can drive time explicitly.

use chrono::{Local, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use std::sync::Arc;

/// Clock trait for wall-clock reads
///
/// Implementations:
/// - `SystemClock`: local system time
/// - `SimulatedClock`: controlled virtual time for tests
pub trait StatClock: Send + Sync + Clone + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Production clock using local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl StatClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Simulated clock for deterministic testing
///
/// Time only advances when explicitly told to via `advance()` or `set()`.
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl SimulatedClock {
    pub fn new(start: NaiveDateTime) -> Self {
        SimulatedClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }

    pub fn set(&self, time: NaiveDateTime) {
        *self.now.lock() = time;
    }
}

impl StatClock for SimulatedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_simulated_clock_deterministic() {
        let clock = SimulatedClock::new(start());
        assert_eq!(clock.now(), clock.now(), "Time should not advance on its own");

        clock.advance(TimeDelta::seconds(90));
        assert_eq!(clock.now(), start() + TimeDelta::seconds(90));

        clock.set(start());
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn test_simulated_clock_shared() {
        let clock = SimulatedClock::new(start());
        let clock2 = clock.clone();

        clock.advance(TimeDelta::minutes(5));
        assert_eq!(clock2.now(), start() + TimeDelta::minutes(5), "Clones should share state");
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let t1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now() >= t1);
    }
}
