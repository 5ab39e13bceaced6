use std::path::PathBuf;

use strand::WorkerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't read config {path}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("couldn't parse config {path}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("unknown log level {0:?}")]
    BadLevel(String),
    #[error("unknown protocol {0:?}, expected \"tcp\" or \"udp\"")]
    BadProtocol(String),
    #[error("invalid value for {0}")]
    BadValue(&'static str),
}

/// Top-level failure classes, each with its process exit code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("logger initialisation failed: {0}")]
    Logger(WorkerError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Logger(_) => 3,
            AppError::Worker(_) => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_codes_per_failure_class() {
        assert_eq!(AppError::Config(ConfigError::BadValue("x")).exit_code(), 2);
        assert_eq!(
            AppError::Logger(WorkerError::Config("no sink".into())).exit_code(),
            3
        );
        assert_eq!(
            AppError::Worker(WorkerError::Config("boom".into())).exit_code(),
            1
        );
    }
}
