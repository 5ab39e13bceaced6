use strand_communication::QueueError;
use strand_utils::Label;
use thiserror::Error;

use crate::registry::ThreadState;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("label {0} already registered")]
    DuplicateLabel(Label),
    #[error("no thread registered as {0}")]
    NotFound(Label),
    #[error("illegal state transition {from} -> {to} for {label}")]
    InvalidTransition { label: Label, from: ThreadState, to: ThreadState },
    #[error("thread {0} owns no queue")]
    NoQueue(Label),
    #[error("queue for {0} stayed full past the timeout")]
    QueueFull(Label),
    #[error("queue for {0} stayed empty past the timeout")]
    QueueEmpty(Label),
    #[error("thread '{caller}' may not pop the queue owned by {owner}")]
    Unauthorized { caller: String, owner: Label },
    #[error("timed out waiting for {0} to complete")]
    WaitTimeout(Label),
    #[error("queue allocation for {label} failed: {source}")]
    AllocationFailed { label: Label, source: QueueError },
}
