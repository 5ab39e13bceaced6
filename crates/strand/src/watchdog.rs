use std::sync::atomic::{AtomicU64, Ordering};

use strand_timing::{Instant, Millis, Repeater};
use strand_utils::Label;
use tracing::{error, warn};

use crate::{
    WorkerError,
    registry::registry,
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, WorkerSpec, spawn_worker},
};

pub const WATCHDOG_LABEL: &str = "WATCHDOG";

const SWEEP_INTERVAL: Millis = Millis::from_secs(1);
const SWEEP_NAP: Millis = Millis(100);
/// A heartbeat older than this declares the watchdog hung.
const HEARTBEAT_STALE: Millis = Millis::from_secs(10);

/// Last heartbeat, as monotonic milliseconds. Written by the watchdog,
/// read by the main thread.
static IMPULSE: AtomicU64 = AtomicU64::new(0);

fn beat() {
    IMPULSE.store(Instant::now().0, Ordering::Release);
}

/// Milliseconds since the watchdog last reported in.
pub fn heartbeat_age() -> Millis {
    Millis(Instant::now().0.saturating_sub(IMPULSE.load(Ordering::Acquire)))
}

/// The WATCHDOG thread: sweeps the registry for dead threads once per
/// second and stamps its own liveness for the main thread to check.
pub struct WatchdogWorker {
    sweep: Repeater,
}

impl WatchdogWorker {
    pub fn new() -> Self {
        Self { sweep: Repeater::every(SWEEP_INTERVAL) }
    }

    pub fn spec() -> WorkerSpec {
        let config = ThreadConfig::new(WATCHDOG_LABEL).expect("static label").essential();
        WorkerSpec::new(Self::new(), config)
    }
}

impl Default for WatchdogWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for WatchdogWorker {
    fn on_init(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        beat();
        Ok(())
    }

    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        while !shutdown_signalled() {
            if self.sweep.fired() {
                beat();
                for label in registry().check_all_threads() {
                    error!(%label, "thread died without reaching a terminal state");
                }
            }
            std::thread::sleep(SWEEP_NAP.into());
        }
        Ok(())
    }
}

/// Main-thread health check, run every few seconds: a stale heartbeat
/// means the watchdog itself hung or died, so its entry is torn down and
/// a fresh instance spawned.
pub fn check_watchdog() -> Result<(), WorkerError> {
    restart_if_stale(HEARTBEAT_STALE)
}

#[doc(hidden)]
pub fn restart_if_stale(stale_after: Millis) -> Result<(), WorkerError> {
    if shutdown_signalled() || heartbeat_age() <= stale_after {
        return Ok(());
    }
    let label = Label::new(WATCHDOG_LABEL).expect("static label");
    warn!(age_ms = heartbeat_age().as_u64(), "watchdog heartbeat stale, replacing it");
    if let Err(err) = registry().deregister(label) {
        // Already gone is fine; it died and cleaned up.
        tracing::debug!(%err, "while removing hung watchdog");
    }
    beat();
    let config = ThreadConfig::new(WATCHDOG_LABEL).expect("static label").essential();
    spawn_worker(Box::new(WatchdogWorker::new()), config)
}
