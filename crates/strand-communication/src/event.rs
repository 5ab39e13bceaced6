use parking_lot::{Condvar, Mutex};
use strand_timing::{Instant, Millis};

/// A level-triggered event.
///
/// Manual-reset events stay set until `reset` and release every waiter;
/// auto-reset events release exactly one waiter per `set` and clear
/// themselves as that waiter passes.
#[derive(Debug)]
pub struct ResetEvent {
    state: Mutex<bool>,
    cond: Condvar,
    auto: bool,
}

impl ResetEvent {
    pub fn manual() -> Self {
        Self { state: Mutex::new(false), cond: Condvar::new(), auto: false }
    }

    pub fn auto() -> Self {
        Self { state: Mutex::new(false), cond: Condvar::new(), auto: true }
    }

    pub fn set(&self) {
        let mut s = self.state.lock();
        *s = true;
        if self.auto {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Waits for the event up to `timeout`. `Millis::ZERO` polls,
    /// [`Millis::INFINITE`] waits forever. Returns whether the event was
    /// observed set.
    pub fn wait(&self, timeout: Millis) -> bool {
        let deadline = Instant::now() + timeout;
        let mut s = self.state.lock();
        loop {
            if *s {
                if self.auto {
                    *s = false;
                }
                return true;
            }
            if timeout == Millis::ZERO {
                return false;
            }
            if timeout.is_infinite() {
                self.cond.wait(&mut s);
                continue;
            }
            let left = deadline.saturating_sub(Instant::now());
            if left == Millis::ZERO {
                return false;
            }
            let _ = self.cond.wait_for(&mut s, left.into());
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn manual_reset_is_level_triggered() {
        let e = ResetEvent::manual();
        e.set();
        assert!(e.wait(Millis::ZERO));
        // Still set: a manual event releases every subsequent waiter.
        assert!(e.is_set());
        assert!(e.wait(Millis::ZERO));
        e.reset();
        assert!(!e.wait(Millis::ZERO));
    }

    #[test]
    fn auto_reset_releases_one_waiter() {
        let e = ResetEvent::auto();
        e.set();
        assert!(e.wait(Millis::ZERO));
        assert!(!e.is_set());
        assert!(!e.wait(Millis::ZERO));
    }

    #[test]
    fn timed_wait_expires() {
        let e = ResetEvent::manual();
        let start = std::time::Instant::now();
        assert!(!e.wait(Millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn set_wakes_blocked_waiter() {
        let e = Arc::new(ResetEvent::manual());
        let e2 = e.clone();
        let h = thread::spawn(move || e2.wait(Millis::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        e.set();
        assert!(h.join().unwrap());
    }
}
