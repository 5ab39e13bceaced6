use core::{fmt, hash::Hash, ops::Deref, str};

use thiserror::Error;

/// Maximum byte length of a thread label.
pub const LABEL_CAPACITY: usize = 64;

/// A fixed-capacity, stack-allocated thread name.
///
/// Labels key the thread registry, name OS threads and tag log lines, so
/// they are `Copy` and never touch the heap. A label is always non-empty
/// valid UTF-8 of at most [`LABEL_CAPACITY`] bytes.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Label {
    len: u8,
    data: [u8; LABEL_CAPACITY],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label of {len} bytes exceeds capacity {LABEL_CAPACITY}")]
    TooLong { len: usize },
}

impl Label {
    pub fn new(s: &str) -> Result<Self, LabelError> {
        if s.is_empty() {
            return Err(LabelError::Empty);
        }
        if s.len() > LABEL_CAPACITY {
            return Err(LabelError::TooLong { len: s.len() });
        }
        let mut data = [0u8; LABEL_CAPACITY];
        data[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { len: s.len() as u8, data })
    }

    /// Builds `BASE` for id 0 and `BASE.{id}` otherwise.
    ///
    /// Used for per-connection worker labels: the first session keeps the
    /// plain role name, later concurrent sessions stay unique.
    pub fn indexed(base: &str, id: usize) -> Result<Self, LabelError> {
        if id == 0 {
            Self::new(base)
        } else {
            let s = format!("{base}.{id}");
            Self::new(&s)
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Constructors only accept str input, len never exceeds capacity.
        unsafe { str::from_utf8_unchecked(&self.data[..self.len as usize]) }
    }

    /// Case-insensitive, whitespace-trimmed match, as used by the
    /// suppression list.
    pub fn matches(&self, other: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(other.trim())
    }
}

impl TryFrom<&str> for Label {
    type Error = LabelError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl Deref for Label {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialEq<&str> for Label {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn construction_limits() {
        assert_eq!(Label::new(""), Err(LabelError::Empty));
        let long = "x".repeat(LABEL_CAPACITY + 1);
        assert_eq!(Label::new(&long), Err(LabelError::TooLong { len: LABEL_CAPACITY + 1 }));
        let max = "y".repeat(LABEL_CAPACITY);
        assert_eq!(Label::new(&max).unwrap().as_str(), max);
    }

    #[test]
    fn indexed_labels() {
        assert_eq!(Label::indexed("SERVER.SEND", 0).unwrap().as_str(), "SERVER.SEND");
        assert_eq!(Label::indexed("SERVER.SEND", 2).unwrap().as_str(), "SERVER.SEND.2");
    }

    #[test]
    fn suppression_match_is_loose() {
        let l = Label::new("Server").unwrap();
        assert!(l.matches(" server "));
        assert!(l.matches("SERVER"));
        assert!(!l.matches("serve"));
    }

    #[test]
    fn labels_key_maps() {
        use std::collections::HashMap;
        let mut m = HashMap::new();
        m.insert(Label::new("LOGGER").unwrap(), 1);
        assert_eq!(m.get(&Label::new("LOGGER").unwrap()), Some(&1));
    }
}
