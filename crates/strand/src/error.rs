use std::path::PathBuf;

use strand_communication::QueueError;
use strand_utils::Label;
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced by worker hooks and the supervisor.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("timed out waiting for the logger thread to come up")]
    LoggerTimeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("thread {0} already exists")]
    AlreadyExists(Label),
    #[error("couldn't create thread {label}")]
    CreateFailed { label: Label, source: std::io::Error },
    #[error("essential thread {0} failed to start")]
    EssentialFailed(Label),
    #[error("couldn't open or read {path}")]
    File { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}
