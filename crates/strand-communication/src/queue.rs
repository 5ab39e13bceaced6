use parking_lot::Mutex;
use strand_timing::{Instant, Millis};
use strand_utils::Label;

use crate::{Message, QueueError, ResetEvent};

struct Ring {
    slots: Box<[Message]>,
    head: usize,
    tail: usize,
}

impl Ring {
    #[inline]
    fn size(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        (self.tail + 1) % self.slots.len() == self.head
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

/// Bounded blocking FIFO of fixed-size [`Message`]s.
///
/// One of these is owned by each registered thread; any thread may push,
/// only the owner pops. A queue of capacity `c` holds at most `c - 1`
/// messages. The `not_empty`/`not_full` events are level-triggered and
/// mutated only under the ring lock, so `is_set` always reflects the
/// fill state an observer could act on.
pub struct MessageQueue {
    ring: Mutex<Ring>,
    not_empty: ResetEvent,
    not_full: ResetEvent,
    owner: Label,
}

impl MessageQueue {
    pub fn new(owner: Label, capacity: usize) -> Result<Self, QueueError> {
        if capacity < 2 {
            return Err(QueueError::BadCapacity { cap: capacity });
        }
        let not_full = ResetEvent::manual();
        not_full.set();
        Ok(Self {
            ring: Mutex::new(Ring {
                slots: vec![Message::EMPTY; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
            }),
            not_empty: ResetEvent::manual(),
            not_full,
            owner,
        })
    }

    pub fn owner(&self) -> Label {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.ring.lock().size()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    /// Observable fill events, for diagnostics and tests.
    pub fn not_empty_is_set(&self) -> bool {
        self.not_empty.is_set()
    }

    pub fn not_full_is_set(&self) -> bool {
        self.not_full.is_set()
    }

    /// Copies `msg` into the queue, waiting on the `not_full` event up to
    /// `timeout`. `Millis::ZERO` never blocks. Fails with
    /// [`QueueError::Full`] once the timeout elapses.
    pub fn push(&self, msg: &Message, timeout: Millis) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut ring = self.ring.lock();
                if !ring.is_full() {
                    let cap = ring.slots.len();
                    let tail = ring.tail;
                    ring.slots[tail] = *msg;
                    ring.tail = (tail + 1) % cap;
                    self.not_empty.set();
                    if ring.is_full() {
                        self.not_full.reset();
                    }
                    return Ok(());
                }
            }
            if !self.wait_until(&self.not_full, timeout, deadline) {
                return Err(QueueError::Full);
            }
        }
    }

    /// Copies the head message into `out`. Symmetric to [`push`]; fails
    /// with [`QueueError::Empty`] on timeout.
    ///
    /// [`push`]: MessageQueue::push
    pub fn pop(&self, out: &mut Message, timeout: Millis) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut ring = self.ring.lock();
                if !ring.is_empty() {
                    let cap = ring.slots.len();
                    let head = ring.head;
                    *out = ring.slots[head];
                    ring.head = (head + 1) % cap;
                    self.not_full.set();
                    if ring.is_empty() {
                        self.not_empty.reset();
                    }
                    return Ok(());
                }
            }
            if !self.wait_until(&self.not_empty, timeout, deadline) {
                return Err(QueueError::Empty);
            }
        }
    }

    fn wait_until(&self, event: &ResetEvent, timeout: Millis, deadline: Instant) -> bool {
        if timeout == Millis::ZERO {
            return false;
        }
        let left =
            if timeout.is_infinite() { Millis::INFINITE } else { deadline.saturating_sub(Instant::now()) };
        if left == Millis::ZERO {
            return false;
        }
        event.wait(left)
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::MessageKind;

    fn q(cap: usize) -> MessageQueue {
        MessageQueue::new(Label::new("TEST").unwrap(), cap).unwrap()
    }

    fn msg(byte: u8) -> Message {
        Message::new(MessageKind::Test, &[byte]).unwrap()
    }

    #[test]
    fn capacity_floor() {
        assert!(MessageQueue::new(Label::new("T").unwrap(), 1).is_err());
        assert!(MessageQueue::new(Label::new("T").unwrap(), 2).is_ok());
    }

    #[test]
    fn fifo_roundtrip() {
        let q = q(8);
        for b in 0..5u8 {
            q.push(&msg(b), Millis::ZERO).unwrap();
        }
        let mut out = Message::EMPTY;
        for b in 0..5u8 {
            q.pop(&mut out, Millis::ZERO).unwrap();
            assert_eq!(out, msg(b));
        }
        assert_eq!(q.pop(&mut out, Millis::ZERO), Err(QueueError::Empty));
    }

    #[test]
    fn holds_capacity_minus_one() {
        let q = q(4);
        for b in 0..3u8 {
            q.push(&msg(b), Millis::ZERO).unwrap();
        }
        assert_eq!(q.push(&msg(9), Millis::ZERO), Err(QueueError::Full));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn events_track_fill_state() {
        let q = q(3);
        assert!(!q.not_empty_is_set());
        assert!(q.not_full_is_set());

        q.push(&msg(1), Millis::ZERO).unwrap();
        assert!(q.not_empty_is_set());
        assert!(q.not_full_is_set());

        q.push(&msg(2), Millis::ZERO).unwrap();
        assert!(!q.not_full_is_set());

        let mut out = Message::EMPTY;
        q.pop(&mut out, Millis::ZERO).unwrap();
        assert!(q.not_full_is_set());
        q.pop(&mut out, Millis::ZERO).unwrap();
        assert!(!q.not_empty_is_set());
    }

    #[test]
    fn timed_push_expires_on_full_queue() {
        let q = q(2);
        q.push(&msg(1), Millis::ZERO).unwrap();
        let t0 = std::time::Instant::now();
        assert_eq!(q.push(&msg(2), Millis(40)), Err(QueueError::Full));
        assert!(t0.elapsed() >= std::time::Duration::from_millis(35));
    }

    #[test]
    fn blocked_pop_wakes_on_push() {
        let q = Arc::new(q(4));
        let q2 = q.clone();
        let h = thread::spawn(move || {
            let mut out = Message::EMPTY;
            q2.pop(&mut out, Millis::from_secs(5)).map(|()| out)
        });
        thread::sleep(std::time::Duration::from_millis(20));
        q.push(&msg(7), Millis::ZERO).unwrap();
        assert_eq!(h.join().unwrap().unwrap(), msg(7));
    }

    #[test]
    fn concurrent_producers_single_consumer() {
        let q = Arc::new(q(8));
        let total = 200u32;
        let mut producers = Vec::new();
        for p in 0..4u8 {
            let q = q.clone();
            producers.push(thread::spawn(move || {
                for i in 0..total / 4 {
                    let m = Message::new(MessageKind::Data, &[p, i as u8]).unwrap();
                    q.push(&m, Millis::INFINITE).unwrap();
                }
            }));
        }
        let mut seen = 0;
        let mut out = Message::EMPTY;
        while seen < total {
            q.pop(&mut out, Millis::from_secs(5)).unwrap();
            seen += 1;
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(q.pop(&mut out, Millis::ZERO), Err(QueueError::Empty));
    }
}
