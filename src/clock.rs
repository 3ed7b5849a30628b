//! Time source for window rollover and the live-mode deadline.

use std::time::Instant;

/// Provides the current instant. Injected into the measurement loop so
/// window timing is controllable in tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests. Clones share the same underlying
/// instant, so a test can hand one handle to the meter and keep another
/// to move time forward.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<Instant>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: Instant) -> Self {
        ManualClock {
            now: std::rc::Rc::new(std::cell::Cell::new(start)),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        self.now.set(self.now.get() + by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
