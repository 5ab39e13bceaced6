use strum::Display;

/// Lifecycle state of a registered thread.
///
/// `Unknown` is never stored; it is the query answer for a label that is
/// not registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ThreadState {
    Created,
    Running,
    Suspended,
    Stopping,
    Terminated,
    Failed,
    Unknown,
}

impl ThreadState {
    /// Terminal states are sinks until deregistration.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ThreadState::Terminated | ThreadState::Failed)
    }

    /// Whether `self -> next` is a legal transition. Re-asserting the
    /// current state is always legal and has no effect.
    pub fn can_transition_to(self, next: ThreadState) -> bool {
        use ThreadState::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Created, Running) => true,
            (Running, Suspended | Stopping | Terminated | Failed) => true,
            (Suspended, Running | Stopping | Terminated | Failed) => true,
            (Stopping, Terminated | Failed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::ThreadState::*;

    #[test]
    fn legal_paths() {
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Terminated));
        assert!(Running.can_transition_to(Failed));
        assert!(Suspended.can_transition_to(Running));
    }

    #[test]
    fn terminal_states_sink() {
        for s in [Terminated, Failed] {
            assert!(s.is_terminal());
            assert!(!s.can_transition_to(Running));
            assert!(!s.can_transition_to(Stopping));
            // Idempotent re-assertion stays legal.
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn no_regressions_or_skips() {
        assert!(!Created.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Created));
        assert!(!Running.can_transition_to(Created));
        assert!(!Unknown.can_transition_to(Running));
        assert!(!Running.can_transition_to(Unknown));
    }
}
