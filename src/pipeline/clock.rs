//! Time source for timer-driven units.

/// Wall-clock time in microseconds since the Unix epoch.
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    fn now_micros(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(a > 1_600_000_000_000_000);
        assert!(b >= a);
    }
}
