//! # Thread Handle States
//!
//! A handle starts in `Init` and takes exactly one terminal path: an
//! explicit detach moves it to `Detached`, the teardown of its execution
//! context moves it to `Exited`.

/// Thread handle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Created, not yet detached or torn down
    Init,
    /// Detached; never reclaimed by join or detach
    Detached,
    /// Execution context torn down; exit value final
    Exited,
}

impl HandleState {
    /// Check if joiners should stop waiting
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleState::Detached | HandleState::Exited)
    }

    /// Valid transitions from this state
    pub fn valid_transitions(&self) -> &[HandleState] {
        match self {
            HandleState::Init => &[HandleState::Detached, HandleState::Exited],
            HandleState::Detached => &[HandleState::Detached],
            HandleState::Exited => &[],
        }
    }

    /// Check whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: HandleState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl Default for HandleState {
    fn default() -> Self {
        HandleState::Init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!HandleState::Init.is_terminal());
        assert!(HandleState::Detached.is_terminal());
        assert!(HandleState::Exited.is_terminal());
    }

    #[test]
    fn test_exited_is_final() {
        assert!(HandleState::Init.can_transition_to(HandleState::Exited));
        assert!(HandleState::Init.can_transition_to(HandleState::Detached));
        assert!(!HandleState::Exited.can_transition_to(HandleState::Detached));
        assert!(!HandleState::Detached.can_transition_to(HandleState::Exited));
    }
}
