mod error;
mod state;

use std::{collections::HashMap, sync::Arc, thread::JoinHandle};

pub use error::RegistryError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
pub use state::ThreadState;
use strand_communication::{Message, MessageQueue, ResetEvent};
use strand_timing::{Instant, Millis};
use strand_utils::Label;
use tracing::debug;

use crate::supervisor::{ThreadConfig, current_label};

struct Entry {
    config: ThreadConfig,
    state: ThreadState,
    auto_cleanup: bool,
    queue: Option<Arc<MessageQueue>>,
    handle: Option<JoinHandle<()>>,
    completion: Arc<ResetEvent>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Label, Entry>,
    // Handles land here when the spawning thread attaches them before the
    // worker has registered itself; `register` claims them.
    pending_handles: HashMap<Label, JoinHandle<()>>,
}

/// Process-wide directory of live threads.
///
/// One coarse lock guards the whole map; critical sections are short and
/// the lock is never held across a queue or socket operation. Completion
/// events and queues are handed out as `Arc` clones and waited on outside
/// the lock.
pub struct ThreadRegistry {
    inner: Mutex<Inner>,
}

static REGISTRY: Lazy<ThreadRegistry> =
    Lazy::new(|| ThreadRegistry { inner: Mutex::new(Inner::default()) });

/// The process-wide registry.
pub fn registry() -> &'static ThreadRegistry {
    &REGISTRY
}

impl ThreadRegistry {
    /// Installs an entry in `Created` state. The label must be unused.
    pub fn register(&self, config: &ThreadConfig, auto_cleanup: bool) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&config.label) {
            return Err(RegistryError::DuplicateLabel(config.label));
        }
        // A parked handle from a spawn that died before registering is
        // stale; adopting it would mark this thread dead on arrival.
        let handle =
            inner.pending_handles.remove(&config.label).filter(|h| !h.is_finished());
        inner.entries.insert(config.label, Entry {
            config: config.clone(),
            state: ThreadState::Created,
            auto_cleanup,
            queue: None,
            handle,
            completion: Arc::new(ResetEvent::manual()),
        });
        debug!(label = %config.label, "thread registered");
        Ok(())
    }

    /// Hands the OS join handle to the entry. Safe to call before the
    /// worker has registered; the handle is parked until it does. The
    /// first handle per label wins; a duplicate spawn loses the
    /// registration race inside its wrapper and exits.
    pub fn attach_handle(&self, label: Label, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(&label) {
            Some(entry) => {
                if entry.handle.is_none() {
                    entry.handle = Some(handle);
                }
            }
            None => {
                inner.pending_handles.entry(label).or_insert(handle);
            }
        }
    }

    /// Moves `label` to `next`, enforcing the transition graph. Terminal
    /// transitions signal the completion event.
    pub fn update_state(&self, label: Label, next: ThreadState) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(&label).ok_or(RegistryError::NotFound(label))?;
        if !entry.state.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition { label, from: entry.state, to: next });
        }
        entry.state = next;
        if next.is_terminal() {
            entry.completion.set();
        }
        Ok(())
    }

    /// Removes the entry. With `auto_cleanup` the owned queue is dropped
    /// with it. Waiters holding the completion event are released even if
    /// the thread never reached a terminal state (forced removal of a
    /// hung thread).
    pub fn deregister(&self, label: Label) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let mut entry = inner.entries.remove(&label).ok_or(RegistryError::NotFound(label))?;
        inner.pending_handles.remove(&label);
        drop(inner);

        entry.completion.set();
        if entry.auto_cleanup {
            entry.queue = None;
        }
        debug!(%label, "thread deregistered");
        Ok(())
    }

    /// `Unknown` for anything not currently registered.
    pub fn get_state(&self, label: Label) -> ThreadState {
        self.inner.lock().entries.get(&label).map_or(ThreadState::Unknown, |e| e.state)
    }

    pub fn is_registered(&self, label: Label) -> bool {
        self.inner.lock().entries.contains_key(&label)
    }

    pub fn labels(&self) -> Vec<Label> {
        self.inner.lock().entries.keys().copied().collect()
    }

    /// Snapshot of the config a thread registered with.
    pub fn config_of(&self, label: Label) -> Option<ThreadConfig> {
        self.inner.lock().entries.get(&label).map(|e| e.config.clone())
    }

    /// Attaches a queue of `capacity` messages to the entry. Idempotent:
    /// an existing queue is kept.
    pub fn init_queue(&self, label: Label, capacity: usize) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(&label).ok_or(RegistryError::NotFound(label))?;
        if entry.queue.is_none() {
            let queue = MessageQueue::new(label, capacity)
                .map_err(|source| RegistryError::AllocationFailed { label, source })?;
            entry.queue = Some(Arc::new(queue));
        }
        Ok(())
    }

    /// Current fill of the queue owned by `label`.
    pub fn queue_len(&self, label: Label) -> Result<usize, RegistryError> {
        Ok(self.queue_of(label)?.len())
    }

    fn queue_of(&self, label: Label) -> Result<Arc<MessageQueue>, RegistryError> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(&label).ok_or(RegistryError::NotFound(label))?;
        entry.queue.clone().ok_or(RegistryError::NoQueue(label))
    }

    /// Copies `msg` into the queue owned by `label`. Any thread may push.
    pub fn push_message(
        &self,
        label: Label,
        msg: &Message,
        timeout: Millis,
    ) -> Result<(), RegistryError> {
        let queue = self.queue_of(label)?;
        queue.push(msg, timeout).map_err(|_| RegistryError::QueueFull(label))
    }

    /// Pops from the queue owned by `label`. Only the owning thread may
    /// pop; any other caller gets `Unauthorized`.
    pub fn pop_message(
        &self,
        label: Label,
        out: &mut Message,
        timeout: Millis,
    ) -> Result<(), RegistryError> {
        match current_label() {
            Some(caller) if caller == label => {}
            caller => {
                return Err(RegistryError::Unauthorized {
                    caller: caller.map_or_else(|| "?".to_string(), |l| l.to_string()),
                    owner: label,
                });
            }
        }
        let queue = self.queue_of(label)?;
        queue.pop(out, timeout).map_err(|_| RegistryError::QueueEmpty(label))
    }

    /// Blocks until `label` reaches a terminal state or is deregistered.
    pub fn wait_for_thread(&self, label: Label, timeout: Millis) -> Result<(), RegistryError> {
        let completion = {
            let inner = self.inner.lock();
            match inner.entries.get(&label) {
                // Absent means already finished and cleaned up.
                None => return Ok(()),
                Some(e) => e.completion.clone(),
            }
        };
        if completion.wait(timeout) { Ok(()) } else { Err(RegistryError::WaitTimeout(label)) }
    }

    /// Waits for every registered thread.
    pub fn wait_all(&self, timeout: Millis) -> Result<(), RegistryError> {
        let targets = self.completion_events(None);
        Self::wait_events(&targets, timeout)
    }

    /// Waits for every registered thread except the caller's own.
    pub fn wait_others(&self, timeout: Millis) -> Result<(), RegistryError> {
        let targets = self.completion_events(current_label());
        Self::wait_events(&targets, timeout)
    }

    /// Waits for the given labels; unregistered labels count as finished.
    pub fn wait_list(&self, labels: &[Label], timeout: Millis) -> Result<(), RegistryError> {
        let targets: Vec<_> = {
            let inner = self.inner.lock();
            labels
                .iter()
                .filter_map(|l| inner.entries.get(l).map(|e| (*l, e.completion.clone())))
                .collect()
        };
        Self::wait_events(&targets, timeout)
    }

    fn completion_events(&self, exclude: Option<Label>) -> Vec<(Label, Arc<ResetEvent>)> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(l, _)| exclude.map_or(true, |ex| **l != ex))
            .map(|(l, e)| (*l, e.completion.clone()))
            .collect()
    }

    fn wait_events(targets: &[(Label, Arc<ResetEvent>)], timeout: Millis) -> Result<(), RegistryError> {
        let deadline = Instant::now() + timeout;
        for (label, event) in targets {
            let left = if timeout.is_infinite() {
                Millis::INFINITE
            } else {
                deadline.saturating_sub(Instant::now())
            };
            if !event.wait(left) {
                return Err(RegistryError::WaitTimeout(*label));
            }
        }
        Ok(())
    }

    /// Sweeps every entry for OS-level thread death. A thread that died
    /// without reaching a terminal state is moved to `Failed` and its
    /// completion event signalled. Returns the newly failed labels.
    pub fn check_all_threads(&self) -> Vec<Label> {
        let mut failed = Vec::new();
        let mut inner = self.inner.lock();
        for (label, entry) in &mut inner.entries {
            if entry.state.is_terminal() {
                continue;
            }
            let dead = entry.handle.as_ref().is_some_and(JoinHandle::is_finished);
            if dead && entry.state == ThreadState::Running {
                entry.state = ThreadState::Failed;
                entry.completion.set();
                failed.push(*label);
            }
        }
        failed
    }
}

#[cfg(test)]
mod test {
    use strand_communication::MessageKind;

    use super::*;
    use crate::supervisor::set_current_label;

    fn cfg(label: &str) -> ThreadConfig {
        ThreadConfig::new(label).unwrap()
    }

    #[test]
    fn register_rejects_duplicates() {
        let reg = registry();
        let c = cfg("REG.DUP");
        reg.register(&c, true).unwrap();
        assert!(matches!(reg.register(&c, true), Err(RegistryError::DuplicateLabel(_))));
        assert_eq!(reg.config_of(c.label).unwrap().label, c.label);
        reg.deregister(c.label).unwrap();
        assert!(reg.config_of(c.label).is_none());
        assert!(matches!(reg.deregister(c.label), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn state_machine_is_enforced() {
        let reg = registry();
        let c = cfg("REG.STATE");
        reg.register(&c, true).unwrap();
        assert_eq!(reg.get_state(c.label), ThreadState::Created);

        assert!(matches!(
            reg.update_state(c.label, ThreadState::Terminated),
            Err(RegistryError::InvalidTransition { .. })
        ));
        reg.update_state(c.label, ThreadState::Running).unwrap();
        reg.update_state(c.label, ThreadState::Terminated).unwrap();
        // Terminal re-assertion is idempotent, regression is not.
        reg.update_state(c.label, ThreadState::Terminated).unwrap();
        assert!(reg.update_state(c.label, ThreadState::Running).is_err());

        reg.deregister(c.label).unwrap();
        assert!(matches!(
            reg.update_state(c.label, ThreadState::Terminated),
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(reg.get_state(c.label), ThreadState::Unknown);
    }

    #[test]
    fn queue_ownership_is_enforced() {
        let reg = registry();
        let owner = cfg("REG.OWNER");
        reg.register(&owner, true).unwrap();
        reg.update_state(owner.label, ThreadState::Running).unwrap();
        reg.init_queue(owner.label, 8).unwrap();
        reg.init_queue(owner.label, 8).unwrap(); // idempotent

        let msg = Message::new(MessageKind::Test, b"hi").unwrap();
        reg.push_message(owner.label, &msg, Millis::ZERO).unwrap();

        // This test thread is not the owner.
        set_current_label(Label::new("REG.INTRUDER").unwrap());
        let mut out = Message::EMPTY;
        assert!(matches!(
            reg.pop_message(owner.label, &mut out, Millis::ZERO),
            Err(RegistryError::Unauthorized { .. })
        ));

        set_current_label(owner.label);
        reg.pop_message(owner.label, &mut out, Millis::ZERO).unwrap();
        assert_eq!(out, msg);

        reg.deregister(owner.label).unwrap();
    }

    #[test]
    fn completion_wait_after_terminal() {
        let reg = registry();
        let c = cfg("REG.WAIT");
        reg.register(&c, true).unwrap();
        reg.update_state(c.label, ThreadState::Running).unwrap();

        assert!(matches!(
            reg.wait_for_thread(c.label, Millis(20)),
            Err(RegistryError::WaitTimeout(_))
        ));
        reg.update_state(c.label, ThreadState::Terminated).unwrap();
        reg.wait_for_thread(c.label, Millis::ZERO).unwrap();
        reg.deregister(c.label).unwrap();
        // Unregistered counts as complete.
        reg.wait_for_thread(c.label, Millis::ZERO).unwrap();
    }

    #[test]
    fn wait_list_blocks_until_terminal() {
        let reg = registry();
        let c = cfg("REG.LIST");
        reg.register(&c, true).unwrap();
        reg.update_state(c.label, ThreadState::Running).unwrap();

        assert!(matches!(
            reg.wait_list(&[c.label], Millis(20)),
            Err(RegistryError::WaitTimeout(_))
        ));
        reg.update_state(c.label, ThreadState::Terminated).unwrap();
        reg.wait_list(&[c.label], Millis::ZERO).unwrap();
        // Labels nobody registered count as already finished.
        reg.wait_list(&[Label::new("REG.NOBODY").unwrap()], Millis::ZERO).unwrap();
        reg.deregister(c.label).unwrap();
    }

    #[test]
    fn dead_running_thread_is_failed_by_sweep() {
        let reg = registry();
        let c = cfg("REG.SWEEP");
        let label = c.label;
        // A short-lived thread whose finished handle we can park.
        let handle = std::thread::spawn(|| {});
        while !handle.is_finished() {
            std::thread::yield_now();
        }
        reg.register(&c, true).unwrap();
        reg.attach_handle(label, handle);
        reg.update_state(label, ThreadState::Running).unwrap();

        let failed = reg.check_all_threads();
        assert!(failed.contains(&label));
        assert_eq!(reg.get_state(label), ThreadState::Failed);
        reg.wait_for_thread(label, Millis::ZERO).unwrap();
        reg.deregister(label).unwrap();
    }
}
