//! Project lifecycle and vendor assignment.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use covenant_audit::{AuditAction, AuditEvent};
use covenant_storage::{
    CreateProjectParams, MilestoneDraft, Project, ProjectId, ProjectStatus, Role, Store,
    StoreError,
};

use crate::entitlement::project_limit;
use crate::role::effective_role;
use crate::{CoreError, Engine, Resolution};

/// Contract fields as returned by the extraction upstream.
///
/// The extraction call itself is an external collaborator; this is the fixed
/// JSON shape it hands back, deserialized at the boundary.
#[derive(Clone, Debug, Deserialize)]
pub struct ContractExtract {
    pub contract_name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub parties: Vec<String>,
    #[serde(default)]
    pub total_value: String,
    #[serde(default)]
    pub milestones: Vec<MilestoneExtract>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MilestoneExtract {
    pub title: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub criteria: String,
}

impl<S: Store> Engine<S> {
    /// Create a project from an extracted contract, subject to the quota
    /// gate. The project is stored under the *effective owner*, never the
    /// acting delegate; the quota is the owner's tier quota, re-resolved
    /// server-side regardless of what the client already displayed.
    pub async fn create_project(
        &self,
        token: &str,
        extract: ContractExtract,
    ) -> Result<Project, CoreError> {
        let res = self.resolve_token(token).await?;

        let owns_any = self.store.owns_any_project(&res.acting.external_id).await?;
        if effective_role(res.acting.current_role, owns_any) != Role::Client {
            return Err(CoreError::Forbidden(
                "switch to the client view to create projects".into(),
            ));
        }

        let limit = project_limit(res.owner.tier);
        let params = CreateProjectParams {
            owner_id: res.owner.external_id.clone(),
            contract_name: extract.contract_name,
            summary: extract.summary,
            parties: extract.parties,
            total_value: extract.total_value,
            milestones: extract
                .milestones
                .into_iter()
                .map(|m| MilestoneDraft {
                    title: m.title,
                    due_date: m.due_date,
                    criteria: m.criteria,
                })
                .collect(),
        };

        let project = match self.store.create_project_if_under_quota(&params, limit).await {
            Ok(project) => project,
            Err(StoreError::LimitReached) => {
                let usage = self
                    .store
                    .count_projects_for_owner(&res.owner.external_id)
                    .await?;
                return Err(CoreError::CapacityExceeded { usage, limit });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            project = %project.id,
            owner = %project.owner_id,
            acting = %res.acting.external_id,
            "project created"
        );
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::ProjectCreate)
                .resource("project", project.id.to_string())
                .project_id(Some(&project.id))
                .build(),
        )
        .await;

        Ok(project)
    }

    /// Open a project for viewing. Owners (and their delegates) always get
    /// through; an invited vendor is auto-bound on first open. Anyone else
    /// is denied without learning whether the project exists.
    pub async fn open_project(
        &self,
        token: &str,
        project_id: &ProjectId,
    ) -> Result<Project, CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;

        if project.owner_id == res.owner.external_id {
            return Ok(project);
        }

        match &project.vendor_id {
            Some(vendor_id) if *vendor_id == res.acting.external_id => Ok(project),
            Some(_) => Err(CoreError::access_denied()),
            None => {
                if !self.email_matches_invite(&project, &res) {
                    return Err(CoreError::access_denied());
                }
                let bound = self
                    .store
                    .bind_vendor_if_unset(&project.id, &res.acting.external_id, &res.acting.email)
                    .await?;
                if bound {
                    info!(project = %project.id, vendor = %res.acting.external_id, "vendor joined");
                    self.record_audit(
                        AuditEvent::builder(&res.acting.external_id, AuditAction::VendorJoin)
                            .resource("project", project.id.to_string())
                            .project_id(Some(&project.id))
                            .build(),
                    )
                    .await;
                }
                // Re-read: either we bound it, or a concurrent open did.
                // Post-bind, vendor access is by bound id only.
                let project = self.get_project_or_denied(project_id).await?;
                if project.vendor_id.as_ref() == Some(&res.acting.external_id) {
                    Ok(project)
                } else {
                    Err(CoreError::access_denied())
                }
            }
        }
    }

    /// Invite a vendor by email. Allowed while no vendor has joined; the
    /// notification is best-effort and never rolls back the assignment.
    pub async fn invite_vendor(
        &self,
        token: &str,
        project_id: &ProjectId,
        email: &str,
    ) -> Result<(), CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;
        if project.owner_id != res.owner.external_id {
            return Err(CoreError::access_denied());
        }

        match self.store.set_vendor_email(&project.id, email).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                return Err(CoreError::Forbidden(
                    "a vendor has already joined this project".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self
            .notifier
            .vendor_invited(email, &project.contract_name, &res.acting.email)
            .await
        {
            warn!(error = %e, project = %project.id, "vendor invite notification failed");
        }

        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::VendorInvite)
                .resource("project", project.id.to_string())
                .project_id(Some(&project.id))
                .details(serde_json::json!({ "vendor_email": email }))
                .build(),
        )
        .await;

        Ok(())
    }

    /// Projects owned by the effective owner (client dashboard).
    pub async fn client_projects(&self, token: &str) -> Result<Vec<Project>, CoreError> {
        let res = self.resolve_token(token).await?;
        Ok(self
            .store
            .list_projects_by_owner(&res.owner.external_id)
            .await?)
    }

    /// Projects this identity was invited to as a vendor (vendor dashboard).
    pub async fn vendor_projects(&self, token: &str) -> Result<Vec<Project>, CoreError> {
        let res = self.resolve_token(token).await?;
        if res.acting.email.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_projects_by_vendor_email(&res.acting.email)
            .await?)
    }

    /// Archive a project (owner only).
    pub async fn archive_project(
        &self,
        token: &str,
        project_id: &ProjectId,
    ) -> Result<(), CoreError> {
        let res = self.resolve_token(token).await?;
        let project = self.get_project_or_denied(project_id).await?;
        if project.owner_id != res.owner.external_id {
            return Err(CoreError::access_denied());
        }

        self.store
            .set_project_status(&project.id, ProjectStatus::Archived)
            .await?;
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::ProjectArchive)
                .resource("project", project.id.to_string())
                .project_id(Some(&project.id))
                .build(),
        )
        .await;
        Ok(())
    }

    /// Delete a project. The delete is owner-scoped in the store, so a
    /// non-owner gets `NotFound` and learns nothing.
    pub async fn delete_project(
        &self,
        token: &str,
        project_id: &ProjectId,
    ) -> Result<(), CoreError> {
        let res = self.resolve_token(token).await?;

        match self
            .store
            .delete_project_for_owner(project_id, &res.owner.external_id)
            .await
        {
            Ok(()) => {
                info!(project = %project_id, owner = %res.owner.external_id, "project deleted");
                self.record_audit(
                    AuditEvent::builder(&res.acting.external_id, AuditAction::ProjectDelete)
                        .resource("project", project_id.to_string())
                        .project_id(Some(project_id))
                        .build(),
                )
                .await;
                Ok(())
            }
            Err(StoreError::NotFound) => Err(CoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn get_project_or_denied(
        &self,
        project_id: &ProjectId,
    ) -> Result<Project, CoreError> {
        match self.store.get_project(project_id).await {
            Ok(project) => Ok(project),
            Err(StoreError::NotFound) => Err(CoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn email_matches_invite(&self, project: &Project, res: &Resolution) -> bool {
        !res.acting.email.is_empty()
            && project
                .vendor_email
                .as_deref()
                .map(|invited| invited.eq_ignore_ascii_case(&res.acting.email))
                .unwrap_or(false)
    }
}
