mod layer;
mod worker;

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

pub use layer::QueueLayer;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use strand_communication::ResetEvent;
use strand_timing::{Millis, WallStamp};
use strand_utils::Label;
use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
pub use worker::LoggerWorker;

use crate::WorkerError;

/// Registry label of the logger thread. Everything else blocks on this
/// label reaching `Running` before initialising.
pub const LOGGER_LABEL: &str = "LOGGER";

const LOG_QUEUE_CAPACITY: usize = 4096;

/// Sink and filter selection for the logger thread.
#[derive(Clone, Debug)]
pub struct LogSettings {
    pub screen: bool,
    pub file: Option<PathBuf>,
    /// Extra file sinks keyed by thread label (case-insensitive).
    pub label_files: Vec<(String, PathBuf)>,
    pub level: Level,
    /// Forces `[file:line]` prefixes at all levels. Only effective in
    /// debug builds.
    pub force_location: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            screen: true,
            file: None,
            label_files: Vec::new(),
            level: Level::INFO,
            force_location: false,
        }
    }
}

/// One formatted-and-stamped log event.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub index: u64,
    pub level: Level,
    pub stamp: WallStamp,
    pub label: Label,
    pub text: String,
    pub origin: Option<(&'static str, u32)>,
}

/// The process-wide log queue. Producers never block: when the queue is
/// full the newest entry is dropped and counted.
struct LogQueue {
    entries: Mutex<VecDeque<LogEntry>>,
    not_empty: ResetEvent,
    seq: AtomicU64,
    dropped: AtomicU64,
}

static LOG_QUEUE: Lazy<LogQueue> = Lazy::new(|| LogQueue {
    entries: Mutex::new(VecDeque::with_capacity(LOG_QUEUE_CAPACITY)),
    not_empty: ResetEvent::manual(),
    seq: AtomicU64::new(0),
    dropped: AtomicU64::new(0),
});

impl LogQueue {
    fn publish(
        &self,
        level: Level,
        label: Label,
        text: String,
        origin: Option<(&'static str, u32)>,
    ) {
        let index = self.seq.fetch_add(1, Ordering::Relaxed);
        let entry = LogEntry { index, level, stamp: WallStamp::now(), label, text, origin };
        let mut entries = self.entries.lock();
        if entries.len() >= LOG_QUEUE_CAPACITY {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        entries.push_back(entry);
        self.not_empty.set();
    }

    fn take(&self, timeout: Millis) -> Option<LogEntry> {
        loop {
            {
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.pop_front() {
                    if entries.is_empty() {
                        self.not_empty.reset();
                    }
                    return Some(entry);
                }
            }
            if !self.not_empty.wait(timeout) {
                return None;
            }
        }
    }

    fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn log_queue() -> &'static LogQueue {
    &LOG_QUEUE
}

/// Installs the producer side: a level filter honoring `RUST_LOG` with
/// the configured default, feeding the queue layer. Failure here is a
/// logger initialisation error (exit code 3).
pub fn init(settings: &LogSettings) -> Result<(), WorkerError> {
    let filter = EnvFilter::builder()
        .with_default_directive(settings.level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(QueueLayer::new(settings.force_location))
        .try_init()
        .map_err(|e| WorkerError::Config(format!("couldn't install log subscriber: {e}")))
}

/// Renders one entry as a sink line:
/// `YYYY-MM-DD HH:MM:SS.nnn [LEVEL] [LABEL] message`.
fn format_entry(entry: &LogEntry, force_location: bool) -> String {
    let location = match entry.origin {
        Some((file, line)) if cfg!(debug_assertions) && force_location => {
            format!("[{file}:{line}] ")
        }
        _ => String::new(),
    };
    format!(
        "{} [{}] [{}] {}{}",
        entry.stamp, entry.level, entry.label, location, entry.text
    )
}
