use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic time source and blocking delay
///
/// Everything time-dependent in the agent (interval timers, reconnect
/// backoff, uptime, telemetry timestamps) goes through this trait so tests
/// can drive time by hand.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the agent started
    fn now_ms(&self) -> u64;

    /// Block the calling thread
    fn sleep(&self, duration: Duration);

    /// Whole seconds since the agent started
    fn uptime_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
