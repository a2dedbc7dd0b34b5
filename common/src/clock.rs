//! Wall-clock abstraction so time-relative parsing can be tested.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Current time as whole seconds since the Unix epoch.
    fn now_secs(&self) -> i64 {
        match self.now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    now: SystemTime,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        self.now
    }
}

impl MockClock {
    pub fn at_secs(secs: u64) -> Self {
        Self {
            now: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_pinned_seconds() {
        // given
        let clock = MockClock::at_secs(1_000);

        // then
        assert_eq!(clock.now_secs(), 1_000);
        assert_eq!(clock.now_secs(), 1_000);
    }

    #[test]
    fn should_report_negative_seconds_before_epoch() {
        // given
        struct Before;
        impl Clock for Before {
            fn now(&self) -> SystemTime {
                UNIX_EPOCH - Duration::from_secs(90)
            }
        }

        // then
        assert_eq!(Before.now_secs(), -90);
    }
}
