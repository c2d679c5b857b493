//! Time abstraction for the engine
//!
//! All engine logic that compares timestamps (feedback rate limiting,
//! metric cache TTLs, sample ages) goes through a [`TimeSource`] so tests
//! can drive the clock deterministically.

/// Timestamp in milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Source of time for the engine
pub trait TimeSource {
    /// Get the current timestamp in milliseconds
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source backed by the system clock
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Settable time source for testing
///
/// Clones share the underlying instant, so a test can keep one handle
/// while the engine owns another and still advance the clock.
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: std::rc::Rc<std::cell::Cell<Timestamp>>,
}

impl FixedClock {
    /// Create a clock frozen at the given timestamp
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp: std::rc::Rc::new(std::cell::Cell::new(timestamp)),
        }
    }

    /// Set the clock to an absolute timestamp
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.set(timestamp);
    }

    /// Advance the clock by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.timestamp.set(self.timestamp.get() + ms);
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> Timestamp {
        self.timestamp.get()
    }
}
