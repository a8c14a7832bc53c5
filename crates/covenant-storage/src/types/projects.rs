//! Project types.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{ExternalId, Milestone, MilestoneDraft, ProjectId};

/// Project lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    Active,
    Processing,
    Completed,
    Archived,
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "processing" => Ok(ProjectStatus::Processing),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            _ => Err(format!("invalid project status: {}", s)),
        }
    }
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

/// Project record.
///
/// `owner_id` is always the *effective owner* resolved at creation time,
/// never the acting delegate. The vendor relation is a reference, not
/// ownership: deleting the vendor identity must not delete the project.
#[derive(Clone, Debug)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: ExternalId,
    pub contract_name: String,
    pub summary: String,
    /// Ordered party names as extracted from the contract.
    pub parties: Vec<String>,
    /// Free-form value string ("$12,000", "120h", ...); never parsed here.
    pub total_value: String,
    pub vendor_email: Option<String>,
    /// Bound exactly once, on the invited vendor's first authenticated open.
    pub vendor_id: Option<ExternalId>,
    pub vendor_joined_at: Option<DateTime<Utc>>,
    pub status: ProjectStatus,
    pub milestones: Vec<Milestone>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a project from an extracted contract.
#[derive(Clone, Debug)]
pub struct CreateProjectParams {
    pub owner_id: ExternalId,
    pub contract_name: String,
    pub summary: String,
    pub parties: Vec<String>,
    pub total_value: String,
    pub milestones: Vec<MilestoneDraft>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_status_roundtrip() {
        for status in [
            ProjectStatus::Active,
            ProjectStatus::Processing,
            ProjectStatus::Completed,
            ProjectStatus::Archived,
        ] {
            let parsed: ProjectStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn project_status_parse_invalid() {
        assert!("open".parse::<ProjectStatus>().is_err());
    }
}
