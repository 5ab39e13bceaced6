mod error;
mod event;
mod message;
mod queue;

pub use error::QueueError;
pub use event::ResetEvent;
pub use message::{MAX_PAYLOAD, Message, MessageKind};
pub use queue::MessageQueue;
