// src/retry/strategy.rs

use std::time::Duration;

/// Fixed pause between connection attempts to the management port.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Rate limit for reconnecting to a service that may be flapping.
///
/// The very first attempt goes out immediately; every later attempt waits
/// the fixed delay, whether the previous connection failed to open, failed
/// to authenticate or broke while polling. There is no attempt limit.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempts: u64,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }

    /// Registers a new attempt and returns how long to wait before it.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts == 1 {
            None
        } else {
            Some(self.delay)
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(RECONNECT_DELAY)
    }
}
