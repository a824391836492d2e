//! Pipeline lifecycle state machine.

use std::fmt;

use serde::Serialize;

/// Lifecycle of one document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Decomposing,
    Recognizing,
    Complete,
    Cancelled,
    Failed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Decomposing => "Decomposing",
            Self::Recognizing => "Recognizing",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

impl PipelinePhase {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: PipelinePhase) -> bool {
        matches!(
            (self, next),
            (PipelinePhase::Idle, PipelinePhase::Decomposing)
                | (PipelinePhase::Decomposing, PipelinePhase::Recognizing)
                | (PipelinePhase::Decomposing, PipelinePhase::Failed)
                | (PipelinePhase::Decomposing, PipelinePhase::Cancelled)
                | (PipelinePhase::Recognizing, PipelinePhase::Complete)
                | (PipelinePhase::Recognizing, PipelinePhase::Cancelled)
                // Re-run with a changed language configuration; pages are
                // not re-decomposed.
                | (PipelinePhase::Complete, PipelinePhase::Recognizing)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelinePhase::*;

    #[test]
    fn test_normal_lifecycle() {
        assert!(Idle.can_transition_to(Decomposing));
        assert!(Decomposing.can_transition_to(Recognizing));
        assert!(Recognizing.can_transition_to(Complete));
    }

    #[test]
    fn test_cancel_only_from_active_phases() {
        assert!(Decomposing.can_transition_to(Cancelled));
        assert!(Recognizing.can_transition_to(Cancelled));
        assert!(!Complete.can_transition_to(Cancelled));
        assert!(!Idle.can_transition_to(Cancelled));
    }

    #[test]
    fn test_failed_only_from_decomposing() {
        assert!(Decomposing.can_transition_to(Failed));
        assert!(!Recognizing.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Failed));
    }

    #[test]
    fn test_rerun_reenters_recognizing() {
        assert!(Complete.can_transition_to(Recognizing));
        assert!(!Cancelled.can_transition_to(Recognizing));
        assert!(!Failed.can_transition_to(Recognizing));
    }

    #[test]
    fn test_terminal_phases() {
        for phase in [Complete, Cancelled, Failed] {
            assert!(phase.is_terminal());
        }
        for phase in [Idle, Decomposing, Recognizing] {
            assert!(!phase.is_terminal());
        }
    }
}
