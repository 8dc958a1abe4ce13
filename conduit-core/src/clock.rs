//! `Clock` collaborator (spec.md §1): every time-dependent decision — idle
//! GC, session timestamps, deadlines — goes through this trait instead of
//! calling `SystemTime::now()`/`Instant::now()` directly, so tests can
//! supply a fake clock without sleeping.

use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock whose value is set explicitly, for deterministic idle-GC tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: std::sync::Arc<std::sync::Mutex<SystemTime>>,
}

impl FixedClock {
    pub fn new(at: SystemTime) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(at)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().expect("fixed clock lock poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        *self.inner.lock().expect("fixed clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(SystemTime::UNIX_EPOCH);
        let t0 = clock.now();
        clock.advance(Duration::from_secs(10));
        let t1 = clock.now();
        assert_eq!(t1.duration_since(t0).unwrap(), Duration::from_secs(10));
    }
}
