use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};

use strand_timing::{Millis, Repeater};
use strand_utils::Label;

use crate::{
    WorkerError,
    logger::{LOGGER_LABEL, LogEntry, LogSettings, format_entry, log_queue},
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, WorkerSpec},
};

const DRAIN_WAIT: Millis = Millis(100);

struct LabelSink {
    label: String,
    writer: BufWriter<File>,
}

/// The LOGGER thread: drains the global log queue into the configured
/// sinks until shutdown, then finishes the backlog.
pub struct LoggerWorker {
    settings: LogSettings,
    default_file: Option<BufWriter<File>>,
    label_sinks: Vec<LabelSink>,
    drop_report: Repeater,
}

impl LoggerWorker {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            settings,
            default_file: None,
            label_sinks: Vec::new(),
            drop_report: Repeater::every(Millis::from_secs(5)),
        }
    }

    /// The logger's spec for `start_threads`: essential, first in line.
    pub fn spec(settings: LogSettings) -> WorkerSpec {
        let config = ThreadConfig::new(LOGGER_LABEL).expect("static label").essential();
        WorkerSpec::new(Self::new(settings), config)
    }

    fn open(path: &Path) -> Result<BufWriter<File>, WorkerError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(BufWriter::new)
            .map_err(|source| WorkerError::File { path: path.to_path_buf(), source })
    }

    fn write_line(&mut self, entry: &LogEntry) {
        let line = format_entry(entry, self.settings.force_location);
        if self.settings.screen {
            eprintln!("{line}");
        }
        if let Some(file) = &mut self.default_file {
            let _ = writeln!(file, "{line}");
        }
        for sink in &mut self.label_sinks {
            if entry.label.matches(&sink.label) {
                let _ = writeln!(sink.writer, "{line}");
            }
        }
    }

    fn report_drops(&mut self, label: Label) {
        if !self.drop_report.fired() {
            return;
        }
        let dropped = log_queue().take_dropped();
        if dropped > 0 {
            let entry = LogEntry {
                index: 0,
                level: tracing::Level::WARN,
                stamp: strand_timing::WallStamp::now(),
                label,
                text: format!("log queue overflow, {dropped} entries dropped"),
                origin: None,
            };
            self.write_line(&entry);
        }
    }

    fn flush(&mut self) {
        if let Some(file) = &mut self.default_file {
            let _ = file.flush();
        }
        for sink in &mut self.label_sinks {
            let _ = sink.writer.flush();
        }
    }
}

impl Worker for LoggerWorker {
    // Sinks open before registration: a logger that cannot write must
    // never reach Running, so the essential-boot wait turns a bad sink
    // into a startup failure instead of a mute process.
    fn on_post_create(&mut self, _cfg: &ThreadConfig) -> Result<(), WorkerError> {
        if let Some(path) = self.settings.file.clone() {
            self.default_file = Some(Self::open(&path)?);
        }
        for (label, path) in self.settings.label_files.clone() {
            self.label_sinks.push(LabelSink { label, writer: Self::open(&path)? });
        }
        Ok(())
    }

    fn run(&mut self, cx: &WorkerContext) -> Result<(), WorkerError> {
        loop {
            match log_queue().take(DRAIN_WAIT) {
                Some(entry) => self.write_line(&entry),
                None => {
                    if shutdown_signalled() && log_queue().is_empty() {
                        return Ok(());
                    }
                    self.flush();
                }
            }
            self.report_drops(cx.label());
        }
    }

    fn on_exit(&mut self) -> Result<(), WorkerError> {
        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use strand_timing::WallStamp;
    use tracing::Level;

    use super::*;

    fn entry(label: &str, text: &str) -> LogEntry {
        LogEntry {
            index: 0,
            level: Level::INFO,
            stamp: WallStamp::now(),
            label: strand_utils::Label::new(label).unwrap(),
            text: text.to_string(),
            origin: None,
        }
    }

    #[test]
    fn file_sinks_receive_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let all = dir.path().join("all.log");
        let net = dir.path().join("net.log");
        let settings = LogSettings {
            screen: false,
            file: Some(all.clone()),
            label_files: vec![("NET".to_string(), net.clone())],
            ..LogSettings::default()
        };
        let mut worker = LoggerWorker::new(settings.clone());
        worker.on_post_create(&ThreadConfig::new(LOGGER_LABEL).unwrap()).unwrap();

        worker.write_line(&entry("NET", "peer up"));
        worker.write_line(&entry("MAIN", "booted"));
        worker.flush();

        let all_text = std::fs::read_to_string(&all).unwrap();
        assert!(all_text.contains("[NET] peer up"));
        assert!(all_text.contains("[MAIN] booted"));
        // The per-label sink only sees its own label's lines.
        let net_text = std::fs::read_to_string(&net).unwrap();
        assert!(net_text.contains("[NET] peer up"));
        assert!(!net_text.contains("MAIN"));
    }

    #[test]
    fn unwritable_sink_fails_before_registration() {
        let settings = LogSettings {
            screen: false,
            file: Some("/nonexistent-dir/relay.log".into()),
            ..LogSettings::default()
        };
        let mut worker = LoggerWorker::new(settings);
        let result = worker.on_post_create(&ThreadConfig::new(LOGGER_LABEL).unwrap());
        assert!(matches!(result, Err(WorkerError::File { .. })));
    }
}
