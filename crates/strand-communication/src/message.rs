use core::fmt;

use strum::{Display, FromRepr};

use crate::QueueError;

/// Largest payload a queued message can carry, in bytes.
pub const MAX_PAYLOAD: usize = 1024;

/// Wire-visible message kinds. `Relay` is the framing used when received
/// bytes are routed into a peer thread's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u32)]
pub enum MessageKind {
    Relay = 1,
    Control = 2,
    Data = 3,
    Test = 4,
    FileChunk = 5,
}

impl MessageKind {
    pub fn from_u32(v: u32) -> Result<Self, QueueError> {
        Self::from_repr(v).ok_or(QueueError::UnknownKind(v))
    }
}

/// A fixed-size queue record, copied by value in and out of queues.
///
/// Bytes past `content_size` are undefined and never inspected.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Message {
    kind: MessageKind,
    content_size: u32,
    payload: [u8; MAX_PAYLOAD],
}

impl Message {
    pub const EMPTY: Self =
        Self { kind: MessageKind::Control, content_size: 0, payload: [0; MAX_PAYLOAD] };

    pub fn new(kind: MessageKind, content: &[u8]) -> Result<Self, QueueError> {
        if content.len() > MAX_PAYLOAD {
            return Err(QueueError::Oversize { len: content.len(), max: MAX_PAYLOAD });
        }
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..content.len()].copy_from_slice(content);
        Ok(Self { kind, content_size: content.len() as u32, payload })
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    #[inline]
    pub fn content_size(&self) -> u32 {
        self.content_size
    }

    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.payload[..self.content_size as usize]
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.content() == other.content()
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("content_size", &self.content_size)
            .finish_non_exhaustive()
    }
}
