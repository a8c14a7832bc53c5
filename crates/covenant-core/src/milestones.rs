//! Milestone workflow operations, actor-gated.
//!
//! `submit_proof` belongs to the assigned vendor; `approve`, `reject`, and
//! `dispute` belong to the project's resolved owner. Any mismatch is a
//! forbidden-action error, never a silent no-op. The status write itself is
//! conditional on the state read here, so two instances of the same actor
//! racing the same transition produce exactly one winner.

use chrono::Utc;
use tracing::info;

use covenant_audit::{AuditAction, AuditEvent, AuditResult};
use covenant_storage::{
    Milestone, MilestoneId, MilestoneStatusUpdate, Project, ProjectId, ProjectStatus,
    ProofSubmission, Store, StoreError,
};

use crate::workflow::{next_status, MilestoneAction};
use crate::{CoreError, Engine, Resolution};

fn audit_action(action: MilestoneAction) -> AuditAction {
    match action {
        MilestoneAction::SubmitProof => AuditAction::MilestoneSubmit,
        MilestoneAction::Approve => AuditAction::MilestoneApprove,
        MilestoneAction::Reject => AuditAction::MilestoneReject,
        MilestoneAction::Dispute => AuditAction::MilestoneDispute,
    }
}

impl<S: Store> Engine<S> {
    /// Vendor submits a deliverable: `pending -> in_review`, stamping the
    /// proof fields and the completion time.
    pub async fn submit_proof(
        &self,
        token: &str,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
        proof: ProofSubmission,
    ) -> Result<Milestone, CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;

        if !self.is_assigned_vendor(&project, &res) {
            self.record_denied(&res, &project, MilestoneAction::SubmitProof)
                .await;
            return Err(CoreError::Forbidden(
                "only the assigned vendor can submit proof".into(),
            ));
        }

        self.transition(
            &res,
            &project,
            milestone_id,
            MilestoneAction::SubmitProof,
            Some(proof),
        )
        .await
    }

    /// Owner accepts the deliverable: `in_review -> approved`. When the last
    /// milestone is approved the project is marked completed.
    pub async fn approve_milestone(
        &self,
        token: &str,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
    ) -> Result<Milestone, CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;
        self.require_owner(&res, &project, MilestoneAction::Approve)
            .await?;

        let milestone = self
            .transition(&res, &project, milestone_id, MilestoneAction::Approve, None)
            .await?;

        if self.store.count_milestones_not_approved(&project.id).await? == 0 {
            self.store
                .set_project_status(&project.id, ProjectStatus::Completed)
                .await?;
            info!(project = %project.id, "all milestones approved, project completed");
        }

        Ok(milestone)
    }

    /// Owner sends the deliverable back: `in_review -> pending`. Proof
    /// fields are retained for the audit trail, not cleared.
    pub async fn reject_milestone(
        &self,
        token: &str,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
    ) -> Result<Milestone, CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;
        self.require_owner(&res, &project, MilestoneAction::Reject)
            .await?;

        self.transition(&res, &project, milestone_id, MilestoneAction::Reject, None)
            .await
    }

    /// Owner escalates: `in_review -> dispute` (terminal).
    pub async fn dispute_milestone(
        &self,
        token: &str,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
    ) -> Result<Milestone, CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;
        self.require_owner(&res, &project, MilestoneAction::Dispute)
            .await?;

        self.transition(&res, &project, milestone_id, MilestoneAction::Dispute, None)
            .await
    }

    /// The assigned vendor is the bound `vendor_id`; before any vendor has
    /// joined, the invite email stands in for it.
    fn is_assigned_vendor(&self, project: &Project, res: &Resolution) -> bool {
        match &project.vendor_id {
            Some(vendor_id) => *vendor_id == res.acting.external_id,
            None => self.email_matches_invite(project, res),
        }
    }

    async fn require_owner(
        &self,
        res: &Resolution,
        project: &Project,
        action: MilestoneAction,
    ) -> Result<(), CoreError> {
        if project.owner_id == res.owner.external_id {
            return Ok(());
        }
        self.record_denied(res, project, action).await;
        Err(CoreError::Forbidden(
            "only the project owner can review milestones".into(),
        ))
    }

    async fn record_denied(&self, res: &Resolution, project: &Project, action: MilestoneAction) {
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, audit_action(action))
                .resource("project", project.id.to_string())
                .project_id(Some(&project.id))
                .result(AuditResult::PermissionDenied)
                .build(),
        )
        .await;
    }

    /// Validate the transition against the state machine, then apply it with
    /// a condition on the state we read. A concurrent move of the same
    /// milestone surfaces as `InvalidTransition`, leaving the resource as
    /// the winner wrote it.
    async fn transition(
        &self,
        res: &Resolution,
        project: &Project,
        milestone_id: &MilestoneId,
        action: MilestoneAction,
        proof: Option<ProofSubmission>,
    ) -> Result<Milestone, CoreError> {
        let milestone = match self.store.get_milestone(&project.id, milestone_id).await {
            Ok(m) => m,
            Err(StoreError::NotFound) => return Err(CoreError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let Some(next) = next_status(milestone.status, action) else {
            return Err(CoreError::InvalidTransition {
                from: milestone.status,
                action,
            });
        };

        let update = MilestoneStatusUpdate {
            status: next,
            completed_at: proof.is_some().then(Utc::now),
            proof,
        };

        let updated = match self
            .store
            .update_milestone_status(&project.id, milestone_id, milestone.status, &update)
            .await
        {
            Ok(m) => m,
            Err(StoreError::Conflict) => {
                return Err(CoreError::InvalidTransition {
                    from: milestone.status,
                    action,
                })
            }
            Err(StoreError::NotFound) => return Err(CoreError::NotFound),
            Err(e) => return Err(e.into()),
        };

        info!(
            project = %project.id,
            milestone = %milestone_id,
            action = action.as_str(),
            from = milestone.status.as_str(),
            to = next.as_str(),
            "milestone transition"
        );
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, audit_action(action))
                .resource("milestone", milestone_id.to_string())
                .project_id(Some(&project.id))
                .details(serde_json::json!({
                    "from": milestone.status.as_str(),
                    "to": next.as_str(),
                }))
                .build(),
        )
        .await;

        Ok(updated)
    }
}
