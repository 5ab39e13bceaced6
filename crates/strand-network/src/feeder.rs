use std::{fs::File, io::Read, path::PathBuf};

use strand::{
    WorkerError,
    registry::{RegistryError, registry},
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, WorkerSpec},
};
use strand_communication::{MAX_PAYLOAD, Message, MessageKind};
use strand_timing::Millis;
use strand_utils::Label;
use tracing::{info, warn};

pub const FILE_READER_LABEL: &str = "FILE_READER";

const PUSH_TIMEOUT: Millis = Millis::from_secs(5);

/// The FILE_READER thread: streams a file into a send worker's queue as
/// `FileChunk` messages, then terminates.
pub struct FileFeeder {
    path: PathBuf,
    target: Label,
}

impl FileFeeder {
    pub fn new(path: PathBuf, target: Label) -> Self {
        Self { path, target }
    }

    pub fn spec(path: PathBuf, target: Label) -> WorkerSpec {
        let config = ThreadConfig::new(FILE_READER_LABEL).expect("static label");
        WorkerSpec::new(Self::new(path, target), config)
    }
}

impl Worker for FileFeeder {
    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        let mut file = File::open(&self.path)
            .map_err(|source| WorkerError::File { path: self.path.clone(), source })?;
        let mut buf = [0u8; MAX_PAYLOAD];
        let mut chunks = 0u64;
        loop {
            if shutdown_signalled() {
                return Ok(());
            }
            let n = file
                .read(&mut buf)
                .map_err(|source| WorkerError::File { path: self.path.clone(), source })?;
            if n == 0 {
                info!(path = %self.path.display(), chunks, "file fully queued");
                return Ok(());
            }
            let msg = Message::new(MessageKind::FileChunk, &buf[..n])?;
            // The send queue applies backpressure; keep offering until it
            // takes the chunk or shutdown wins.
            loop {
                match registry().push_message(self.target, &msg, PUSH_TIMEOUT) {
                    Ok(()) => break,
                    Err(RegistryError::QueueFull(_)) if !shutdown_signalled() => {
                        warn!(target = %self.target, "send queue saturated, still trying");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            chunks += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use strand::registry::ThreadState;

    use super::*;

    fn register_queue_owner(label: &str, capacity: usize) -> Label {
        let cfg = ThreadConfig::new(label).unwrap();
        registry().register(&cfg, true).unwrap();
        registry().update_state(cfg.label, ThreadState::Running).unwrap();
        registry().init_queue(cfg.label, capacity).unwrap();
        cfg.label
    }

    #[test]
    fn file_lands_in_queue_as_chunks() {
        let target = register_queue_owner("FEED.TARGET", 16);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        // One full chunk plus a 100-byte tail.
        tmp.write_all(&vec![7u8; MAX_PAYLOAD + 100]).unwrap();
        tmp.flush().unwrap();

        let mut feeder = FileFeeder::new(tmp.path().to_path_buf(), target);
        let cx_cfg = ThreadConfig::new("FEED.SELF").unwrap();
        let cx = strand::supervisor::WorkerContext { config: cx_cfg };
        feeder.run(&cx).unwrap();

        assert_eq!(registry().queue_len(target).unwrap(), 2);
        registry().deregister(target).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let target = register_queue_owner("FEED.NOFILE", 4);
        let mut feeder = FileFeeder::new(PathBuf::from("/nonexistent/sendfile.bin"), target);
        let cx = strand::supervisor::WorkerContext {
            config: ThreadConfig::new("FEED.SELF2").unwrap(),
        };
        assert!(matches!(feeder.run(&cx), Err(WorkerError::File { .. })));
        registry().deregister(target).unwrap();
    }
}
