use crate::{Instant, Millis};

/// A periodic trigger.
///
/// Drives the watchdog sweep, the heartbeat check and retry backoff pacing.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Repeater {
    interval: Millis,
    last_acted: Instant,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Millis) -> Self {
        Self { interval, last_acted: Instant::ZERO }
    }

    /// Returns true and rearms once `interval` has passed since the last
    /// firing. A fresh repeater fires on the first call.
    #[inline]
    pub fn fired(&mut self) -> bool {
        if self.last_acted.elapsed() >= self.interval {
            self.last_acted = Instant::now();
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn interval(&self) -> Millis {
        self.interval
    }

    #[inline]
    pub fn set_interval(&mut self, interval: Millis) {
        self.interval = interval;
    }

    pub fn reset(&mut self) {
        self.last_acted = Instant::now();
    }

    pub fn force_fire(&mut self) {
        self.last_acted = Instant::ZERO;
    }
}
