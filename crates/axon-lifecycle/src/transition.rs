//! Closed lifecycle transition table and the state machine that enforces
//! it: `created -> validated -> planned -> scheduled -> running ->
//! (tool_execution | memory_injection -> running)* -> (completed | failed |
//! aborted) -> snapshot_persisted`.

use axon_types::{KernelError, LifecycleState};

/// True when `(from, to)` is a legal transition in the closed table.
/// `running` is the hub state: both sub-states loop back to it, and any of
/// the three terminal states can be reached from it directly.
pub fn is_legal_transition(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;
    matches!(
        (from, to),
        (Created, Validated)
            | (Validated, Planned)
            | (Planned, Scheduled)
            | (Scheduled, Running)
            | (Running, ToolExecution)
            | (Running, MemoryInjection)
            | (ToolExecution, Running)
            | (MemoryInjection, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Aborted)
            | (Completed, SnapshotPersisted)
            | (Failed, SnapshotPersisted)
            | (Aborted, SnapshotPersisted)
    )
}

/// Drives one execution's `lifecycleState` field, rejecting any transition
/// outside the closed table.
pub struct StateMachine {
    current: LifecycleState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Created,
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    pub fn transition(&mut self, to: LifecycleState) -> Result<LifecycleState, KernelError> {
        if !is_legal_transition(self.current, to) {
            return Err(KernelError::ValidationError(format!(
                "illegal lifecycle transition {:?} -> {:?}",
                self.current, to
            )));
        }
        self.current = to;
        Ok(to)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn happy_path_through_completion() {
        let mut sm = StateMachine::new();
        for state in [Validated, Planned, Scheduled, Running, Completed, SnapshotPersisted] {
            sm.transition(state).unwrap();
        }
        assert_eq!(sm.current(), SnapshotPersisted);
    }

    #[test]
    fn running_can_loop_through_tool_execution_and_back() {
        let mut sm = StateMachine::new();
        for state in [Validated, Planned, Scheduled, Running, ToolExecution, Running] {
            sm.transition(state).unwrap();
        }
        assert_eq!(sm.current(), Running);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut sm = StateMachine::new();
        assert!(sm.transition(Running).is_err());
    }

    #[test]
    fn terminal_states_only_lead_to_snapshot_persisted() {
        let mut sm = StateMachine::new();
        for state in [Validated, Planned, Scheduled, Running, Failed] {
            sm.transition(state).unwrap();
        }
        assert!(sm.transition(Running).is_err());
        assert!(sm.transition(SnapshotPersisted).is_ok());
    }
}
