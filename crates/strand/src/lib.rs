extern crate self as strand;

pub mod error;
pub mod logger;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
pub mod watchdog;

pub use error::WorkerError;
pub use registry::{RegistryError, ThreadState, registry};
pub use strand_communication as communication;
pub use strand_timing as timing;
pub use strand_utils as utils;
pub use supervisor::{ThreadConfig, Worker, WorkerContext};
pub use tracing;
