use strand::{
    ThreadState, WorkerError,
    logger::{LogSettings, LoggerWorker},
    registry,
    shutdown::request_shutdown,
    supervisor::{self, ThreadConfig, Worker, WorkerContext, WorkerSpec, start_threads},
    timing::{Instant, Millis},
    utils::Label,
    watchdog::{WATCHDOG_LABEL, restart_if_stale},
};

// Stands in for a watchdog that was killed externally: it registers under
// the WATCHDOG label and dies straight away, leaving no heartbeat behind.
struct DeadOnArrival;

impl Worker for DeadOnArrival {
    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }
}

#[test]
fn stale_watchdog_is_replaced() {
    let settings = LogSettings { screen: false, ..LogSettings::default() };
    strand::logger::init(&settings).unwrap();
    supervisor::register_current("MAIN").unwrap();
    start_threads(vec![LoggerWorker::spec(settings)], &[]).unwrap();

    let watchdog = Label::new(WATCHDOG_LABEL).unwrap();
    start_threads(
        vec![WorkerSpec::new(DeadOnArrival, ThreadConfig::new(WATCHDOG_LABEL).unwrap())],
        &[],
    )
    .unwrap();

    // The impostor exits and cleans itself up.
    let deadline = Instant::now() + Millis::from_secs(2);
    while registry().is_registered(watchdog) && Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(!registry().is_registered(watchdog));

    // The main-thread health check notices the missing heartbeat and
    // brings up a fresh instance.
    restart_if_stale(Millis::ZERO).unwrap();
    let deadline = Instant::now() + Millis::from_secs(2);
    while registry().get_state(watchdog) != ThreadState::Running && Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(registry().get_state(watchdog), ThreadState::Running);

    request_shutdown();
    registry().wait_others(Millis::from_secs(5)).unwrap();
    supervisor::deregister_current();
}
