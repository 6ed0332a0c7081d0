//! Reload coalescing
//!
//! File events arrive in bursts. At most one reload runs at a time, and any
//! number of triggers during a reload collapse into a single rerun.

/// Where the reload loop is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReloadState {
    #[default]
    Idle,
    Running,
    RunningWithPendingRerun,
}

impl ReloadState {
    /// Record a trigger. Returns true when the caller must start the loop.
    pub fn trigger(&mut self) -> bool {
        match self {
            ReloadState::Idle => {
                *self = ReloadState::Running;
                true
            }
            ReloadState::Running => {
                *self = ReloadState::RunningWithPendingRerun;
                false
            }
            ReloadState::RunningWithPendingRerun => false,
        }
    }

    /// Record a finished reload. Returns true when another pass is due.
    pub fn finish(&mut self) -> bool {
        match self {
            ReloadState::RunningWithPendingRerun => {
                *self = ReloadState::Running;
                true
            }
            ReloadState::Running | ReloadState::Idle => {
                *self = ReloadState::Idle;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_trigger() {
        let mut state = ReloadState::default();
        assert!(state.trigger());
        assert_eq!(state, ReloadState::Running);
        assert!(!state.finish());
        assert_eq!(state, ReloadState::Idle);
    }

    #[test]
    fn test_burst_collapses_to_one_rerun() {
        let mut state = ReloadState::default();
        assert!(state.trigger());
        assert!(!state.trigger());
        assert!(!state.trigger());
        assert!(!state.trigger());
        assert_eq!(state, ReloadState::RunningWithPendingRerun);

        assert!(state.finish());
        assert_eq!(state, ReloadState::Running);
        assert!(!state.finish());
        assert_eq!(state, ReloadState::Idle);
    }

    #[test]
    fn test_trigger_during_rerun_queues_another() {
        let mut state = ReloadState::default();
        state.trigger();
        state.trigger();
        assert!(state.finish());
        assert!(!state.trigger());
        assert!(state.finish());
        assert!(!state.finish());
    }
}
