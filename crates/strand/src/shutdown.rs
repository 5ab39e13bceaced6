use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use once_cell::sync::Lazy;
use signal_hook::{
    consts::{SIGINT, SIGQUIT, SIGTERM},
    flag as signal_flag,
};

/// Holds the signal number that requested shutdown, 0 while running.
static STOP: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

static INSTALL: Once = Once::new();

/// Wires SIGINT/SIGTERM/SIGQUIT and the panic hook into the shutdown
/// latch. With `grace`, a fallback thread re-raises the default signal
/// behavior after giving workers that long to drain, in case a
/// non-cooperative thread never observes the latch.
pub fn install(grace: Option<Duration>) {
    INSTALL.call_once(|| {
        const SIGTERM_U: usize = SIGTERM as usize;
        const SIGINT_U: usize = SIGINT as usize;
        const SIGQUIT_U: usize = SIGQUIT as usize;
        signal_flag::register_usize(SIGTERM, Arc::clone(&STOP), SIGTERM_U)
            .expect("register SIGTERM");
        signal_flag::register_usize(SIGINT, Arc::clone(&STOP), SIGINT_U).expect("register SIGINT");
        signal_flag::register_usize(SIGQUIT, Arc::clone(&STOP), SIGQUIT_U)
            .expect("register SIGQUIT");

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            STOP.store(SIGINT as usize, Ordering::Relaxed);
            original_hook(panic_info);
        }));

        if let Some(grace) = grace {
            spawn_signal_fallback(Arc::clone(&STOP), grace);
        }
    });
}

// Re-raises the default handler if shutdown was signalled but the process
// is still alive after the grace period.
fn spawn_signal_fallback(stop: Arc<AtomicUsize>, grace: Duration) {
    thread::spawn(move || {
        loop {
            let sig = stop.load(Ordering::Relaxed);
            if sig != 0 {
                thread::sleep(grace);
                let _ = signal_hook::low_level::emulate_default_handler(sig as libc::c_int);
            }
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/// True once any shutdown source fired. Every blocking loop polls this at
/// least once per its timeout interval.
#[inline]
pub fn shutdown_signalled() -> bool {
    STOP.load(Ordering::Relaxed) != 0
}

/// Trips the latch from inside the process (fatal error paths, tests).
pub fn request_shutdown() {
    STOP.store(SIGINT as usize, Ordering::Relaxed);
}

#[doc(hidden)]
pub fn clear_shutdown() {
    STOP.store(0, Ordering::Relaxed);
}
