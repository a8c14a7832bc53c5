//! Milestone types.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use super::MilestoneId;

/// Milestone workflow state.
///
/// Legal edges are defined by the workflow engine in covenant-core; backends
/// only ever move a milestone with a conditional update on the expected
/// pre-state, so an illegal or stale write never lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MilestoneStatus {
    Pending,
    InReview,
    Approved,
    Dispute,
}

impl FromStr for MilestoneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MilestoneStatus::Pending),
            "in_review" => Ok(MilestoneStatus::InReview),
            "approved" => Ok(MilestoneStatus::Approved),
            "dispute" => Ok(MilestoneStatus::Dispute),
            _ => Err(format!("invalid milestone status: {}", s)),
        }
    }
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::InReview => "in_review",
            MilestoneStatus::Approved => "approved",
            MilestoneStatus::Dispute => "dispute",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MilestoneStatus::Approved | MilestoneStatus::Dispute)
    }
}

/// Milestone record, embedded in its parent project.
#[derive(Clone, Debug)]
pub struct Milestone {
    pub id: MilestoneId,
    pub position: i64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub criteria: String,
    pub status: MilestoneStatus,
    pub proof_url: Option<String>,
    pub proof_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Milestone draft as delivered by the contract extraction upstream.
#[derive(Clone, Debug)]
pub struct MilestoneDraft {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub criteria: String,
}

/// Proof fields set when a vendor submits a deliverable.
#[derive(Clone, Debug)]
pub struct ProofSubmission {
    pub proof_url: String,
    pub proof_notes: Option<String>,
}

/// A conditional status write: move to `status` and, for submissions, stamp
/// the proof fields. Rejection passes `proof: None` so the prior proof is
/// retained for audit.
#[derive(Clone, Debug)]
pub struct MilestoneStatusUpdate {
    pub status: MilestoneStatus,
    pub proof: Option<ProofSubmission>,
    pub completed_at: Option<DateTime<Utc>>,
}
