//! Publish timing registers and the liveness watchdog

use std::time::{Duration, Instant};

pub const MIN_PUSH_PERIOD_MS: u32 = 1_000;
pub const MAX_PUSH_PERIOD_MS: u32 = 24 * 3600 * 1000;
pub const DEFAULT_PUSH_PERIOD_MS: u32 = 5_000;

/// Watchdog period never goes below this multiple of the push period
pub const WATCHDOG_PUSH_MULTIPLE: u32 = 3;

/// Telemetry push period and watchdog period, both in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    push_period_ms: u32,
    watchdog_period_ms: u32,
}

impl Timing {
    /// Build clamped timing; out-of-range values are adjusted, never rejected
    pub fn new(push_period_ms: u32, watchdog_period_ms: u32) -> Self {
        let push_period_ms = push_period_ms.clamp(MIN_PUSH_PERIOD_MS, MAX_PUSH_PERIOD_MS);
        let watchdog_period_ms = if watchdog_period_ms == 0 {
            0
        } else {
            watchdog_period_ms.max(push_period_ms.saturating_mul(WATCHDOG_PUSH_MULTIPLE))
        };

        Self {
            push_period_ms,
            watchdog_period_ms,
        }
    }

    pub fn push_period_ms(&self) -> u32 {
        self.push_period_ms
    }

    /// Zero means the watchdog is disabled
    pub fn watchdog_period_ms(&self) -> u32 {
        self.watchdog_period_ms
    }

    pub fn push_period(&self) -> Duration {
        Duration::from_millis(self.push_period_ms.into())
    }

    pub fn with_push_period(self, push_period_ms: u32) -> Self {
        Self::new(push_period_ms, self.watchdog_period_ms)
    }

    pub fn with_watchdog_period(self, watchdog_period_ms: u32) -> Self {
        Self::new(self.push_period_ms, watchdog_period_ms)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_PERIOD_MS, 0)
    }
}

/// Deadline by which the next successful publish must happen
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(period_ms: u32) -> Self {
        let mut watchdog = Self::default();
        watchdog.set_period(period_ms);
        watchdog
    }

    /// Change the period; zero disables and forgets any deadline
    pub fn set_period(&mut self, period_ms: u32) {
        if period_ms == 0 {
            self.period = None;
            self.deadline = None;
        } else {
            self.period = Some(Duration::from_millis(period_ms.into()));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }

    /// Push the deadline to `now + period`
    pub fn feed(&mut self, now: Instant) {
        if let Some(period) = self.period {
            self.deadline = Some(now + period);
        }
    }

    /// True once `now` is past an armed deadline of an enabled watchdog
    pub fn is_expired(&self, now: Instant) -> bool {
        match (self.period, self.deadline) {
            (Some(_), Some(deadline)) => now > deadline,
            _ => false,
        }
    }

    /// Forget the deadline until the next feed
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
