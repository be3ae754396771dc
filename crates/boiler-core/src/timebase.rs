use std::thread;
use std::time::{Duration, Instant};

/// Monotonic milliseconds.
pub type Millis = u64;

/// Source of monotonic time for the loop and the supervisor.
pub trait Clock {
    fn now_ms(&self) -> Millis;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic milliseconds since start.
    pub fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimeBase {
    fn now_ms(&self) -> Millis {
        TimeBase::now_ms(self)
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Elapsed milliseconds between two monotonic readings, clamped at zero.
pub fn elapsed_ms(now: Millis, since: Millis) -> Millis {
    now.saturating_sub(since)
}
