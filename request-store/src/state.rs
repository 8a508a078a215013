//! Pipeline state machine.
//!
//! The only legal request-state transitions are the edges encoded here; every
//! store write that changes `state` is validated against this graph. Rejected
//! is reachable from any non-terminal stage (triage reject, human reject
//! after architect, admin override).

use serde::{Deserialize, Serialize};

/// Pipeline position of a request. Persisted by textual name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    New,
    NeedsClarification,
    Triaged,
    ArchitectReview,
    Approved,
    InProgress,
    Done,
    Rejected,
}

impl PipelineState {
    /// Returns true when `self -> next` is an edge of the pipeline graph.
    ///
    /// Self-loops are allowed: workers re-commit rows without changing state
    /// (counter bumps, PR tracking updates) and resets re-enter the same
    /// stage.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        if self == next {
            return true;
        }
        match self {
            New => matches!(next, Triaged | NeedsClarification | Rejected),
            // Re-triage after a submitter comment goes straight to the
            // triage outcomes, same as from New.
            NeedsClarification => matches!(next, New | Triaged | Rejected),
            Triaged => matches!(next, ArchitectReview | Rejected),
            // Human approval or rejection of the architect's solution;
            // rejection sends the request back for another design round.
            ArchitectReview => matches!(next, Approved | Triaged | Rejected),
            Approved => matches!(next, InProgress | Rejected),
            // Implementation rejection returns to Approved for a re-trigger.
            InProgress => matches!(next, Done | Approved | Rejected),
            Done | Rejected => false,
        }
    }

    /// Stable lowercase-free name used in comments and labels.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::New => "New",
            PipelineState::NeedsClarification => "NeedsClarification",
            PipelineState::Triaged => "Triaged",
            PipelineState::ArchitectReview => "ArchitectReview",
            PipelineState::Approved => "Approved",
            PipelineState::InProgress => "InProgress",
            PipelineState::Done => "Done",
            PipelineState::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::*;

    #[test]
    fn happy_path_is_a_legal_walk() {
        let path = [New, Triaged, ArchitectReview, Approved, InProgress, Done];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{} -> {}", w[0], w[1]);
        }
    }

    #[test]
    fn clarification_loop_is_legal() {
        assert!(New.can_transition_to(NeedsClarification));
        assert!(NeedsClarification.can_transition_to(Triaged));
        assert!(NeedsClarification.can_transition_to(Rejected));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [
            New,
            NeedsClarification,
            Triaged,
            ArchitectReview,
            Approved,
            InProgress,
        ] {
            assert!(!Done.can_transition_to(next));
            assert!(!Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn skipping_stages_is_illegal() {
        assert!(!New.can_transition_to(Approved));
        assert!(!Triaged.can_transition_to(InProgress));
        assert!(!Approved.can_transition_to(Done));
    }

    #[test]
    fn implementation_rejection_returns_to_approved() {
        assert!(InProgress.can_transition_to(Approved));
    }
}
