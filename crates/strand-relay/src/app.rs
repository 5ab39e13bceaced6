use std::time::Duration;

use strand::{
    WorkerError,
    logger::{LOGGER_LABEL, LoggerWorker},
    registry::registry,
    shutdown::{self, shutdown_signalled},
    supervisor::{self, start_threads},
    watchdog::{self, WatchdogWorker},
};
use strand_network::{ClientConnector, FileFeeder, ServerListener};
use strand_timing::{Millis, Repeater};
use strand_utils::Label;
use tracing::{error, info, warn};

use crate::{AppError, Config};

const WATCHDOG_CHECK_EVERY: Millis = Millis::from_secs(5);
const MAIN_NAP: Millis = Millis(100);
const DRAIN_BUDGET: Millis = Millis::from_secs(5);
const SIGNAL_GRACE: Duration = Duration::from_secs(5);

/// Boots the runtime and supervises it until shutdown.
///
/// Boot order matters: the logger spec leads because every other worker
/// gates on the LOGGER label reaching `Running`.
pub fn run(config: &Config) -> Result<(), AppError> {
    let log_settings = config.log_settings()?;
    let server_settings = config.server_settings()?;

    shutdown::install(Some(SIGNAL_GRACE));
    strand::logger::init(&log_settings).map_err(AppError::Logger)?;
    supervisor::register_current("MAIN")?;

    let mut specs = vec![
        LoggerWorker::spec(log_settings),
        WatchdogWorker::spec(),
        ServerListener::spec(server_settings),
    ];
    if config.network.client.enabled {
        specs.push(ClientConnector::spec(config.client_settings()?));
    }
    if let Some(path) = &config.server.send_file {
        let target = Label::new(strand_network::SERVER_SEND_LABEL)
            .map_err(|e| AppError::Worker(WorkerError::Config(e.to_string())))?;
        specs.push(FileFeeder::spec(path.clone(), target));
    }

    start_threads(specs, &config.suppress_list()).map_err(|err| {
        let logger_failed = matches!(
            &err,
            WorkerError::EssentialFailed(label) if label.as_str() == LOGGER_LABEL
        );
        if logger_failed { AppError::Logger(err) } else { AppError::Worker(err) }
    })?;
    info!("runtime up");

    let mut watchdog_check = Repeater::every(WATCHDOG_CHECK_EVERY);
    while !shutdown_signalled() {
        if watchdog_check.fired() {
            if let Err(err) = watchdog::check_watchdog() {
                error!(%err, "couldn't replace the watchdog");
            }
        }
        std::thread::sleep(MAIN_NAP.into());
    }

    info!("shutdown signalled, draining workers");
    let drained = registry().wait_others(DRAIN_BUDGET);
    supervisor::deregister_current();
    match drained {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(%err, "a worker missed the drain deadline");
            Err(AppError::Worker(err.into()))
        }
    }
}
