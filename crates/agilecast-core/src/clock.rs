//! Wall-clock abstraction so TTL, fallback dates and slot lookup can be driven
//! deterministically in tests.

use std::sync::Mutex;

use time::Duration;

use crate::UtcDateTime;

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

/// Clock backed by the operating system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(now: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: UtcDateTime) {
        *self.now.lock().expect("manual clock lock is not poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock lock is not poisoned");
        *now = now.plus(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().expect("manual clock lock is not poisoned")
    }
}
