use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueError {
    #[error("queue full")]
    Full,
    #[error("queue empty")]
    Empty,
    #[error("payload of {len} bytes overflows the {max}-byte message buffer")]
    Oversize { len: usize, max: usize },
    #[error("queue capacity {cap} below minimum of 2")]
    BadCapacity { cap: usize },
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
}
