//! The milestone state machine.
//!
//! The transition table is a pure function so legality is testable without
//! any storage; actor gating lives in the engine methods that call it. The
//! actual status write is conditional on the pre-state read here, so a race
//! between two actors resolves to exactly one winner.

use covenant_storage::MilestoneStatus;

/// Workflow actions a request can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MilestoneAction {
    SubmitProof,
    Approve,
    Reject,
    Dispute,
}

impl MilestoneAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneAction::SubmitProof => "submit_proof",
            MilestoneAction::Approve => "approve",
            MilestoneAction::Reject => "reject",
            MilestoneAction::Dispute => "dispute",
        }
    }
}

/// The legal transition table.
///
/// Unknown `(state, action)` pairs are `None` and must be rejected by the
/// caller; nothing ever defaults to a transition. `Approved` and `Dispute`
/// are terminal.
pub fn next_status(from: MilestoneStatus, action: MilestoneAction) -> Option<MilestoneStatus> {
    use MilestoneAction as A;
    use MilestoneStatus as S;

    match (from, action) {
        (S::Pending, A::SubmitProof) => Some(S::InReview),
        (S::InReview, A::Approve) => Some(S::Approved),
        (S::InReview, A::Reject) => Some(S::Pending),
        (S::InReview, A::Dispute) => Some(S::Dispute),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MilestoneAction as A;
    use MilestoneStatus as S;

    #[test]
    fn legal_edges() {
        assert_eq!(next_status(S::Pending, A::SubmitProof), Some(S::InReview));
        assert_eq!(next_status(S::InReview, A::Approve), Some(S::Approved));
        assert_eq!(next_status(S::InReview, A::Reject), Some(S::Pending));
        assert_eq!(next_status(S::InReview, A::Dispute), Some(S::Dispute));
    }

    #[test]
    fn review_actions_require_in_review() {
        assert_eq!(next_status(S::Pending, A::Approve), None);
        assert_eq!(next_status(S::Pending, A::Reject), None);
        assert_eq!(next_status(S::Pending, A::Dispute), None);
    }

    #[test]
    fn submit_requires_pending() {
        assert_eq!(next_status(S::InReview, A::SubmitProof), None);
        assert_eq!(next_status(S::Approved, A::SubmitProof), None);
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for action in [A::SubmitProof, A::Approve, A::Reject, A::Dispute] {
            assert_eq!(next_status(S::Approved, action), None);
            assert_eq!(next_status(S::Dispute, action), None);
        }
    }

    #[test]
    fn approved_and_dispute_only_reachable_from_in_review() {
        for from in [S::Pending, S::Approved, S::Dispute] {
            for action in [A::SubmitProof, A::Approve, A::Reject, A::Dispute] {
                if let Some(next) = next_status(from, action) {
                    assert!(
                        !matches!(next, S::Approved | S::Dispute),
                        "{:?} -> {:?} must not reach a terminal state",
                        from,
                        action
                    );
                }
            }
        }
    }
}
