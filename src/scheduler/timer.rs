use std::time::Duration;

use crate::config::TimingConfig;

/// Wall-clock periodic timer
///
/// Fires when at least `interval` has passed since it last fired and re-arms
/// from the moment it fires, whether or not the guarded action succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    last_fired_at: u64,
    interval_ms: u64,
}

impl IntervalTimer {
    pub fn new(interval: Duration, now_ms: u64) -> Self {
        Self {
            last_fired_at: now_ms,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_fired_at) >= self.interval_ms {
            self.last_fired_at = now_ms;
            true
        } else {
            false
        }
    }
}

/// The four loop timers, checked in this field order
#[derive(Debug, Clone, Copy)]
pub struct LoopTimers {
    pub wifi: IntervalTimer,
    pub broker: IntervalTimer,
    pub sensor: IntervalTimer,
    pub heartbeat: IntervalTimer,
}

impl LoopTimers {
    pub fn starting_at(timing: &TimingConfig, now_ms: u64) -> Self {
        Self {
            wifi: IntervalTimer::new(timing.wifi_recheck(), now_ms),
            broker: IntervalTimer::new(timing.broker_recheck(), now_ms),
            sensor: IntervalTimer::new(timing.sensor_publish(), now_ms),
            heartbeat: IntervalTimer::new(timing.heartbeat(), now_ms),
        }
    }
}
