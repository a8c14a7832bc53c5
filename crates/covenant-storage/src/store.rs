//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait covenant-core depends on.
///
/// Every check-then-act sequence in the engine is expressed here as a single
/// conditional operation (an upsert keyed on a unique id, or an update with a
/// pre-state condition), so backends can make them atomic and the engine
/// never has to lock. Methods that condition on a pre-state report a failed
/// condition as `Conflict` (row exists, wrong state) and a missing row as
/// `NotFound`.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Identities ─────────────────────────────────────

    /// Idempotent get-or-create keyed on the external id (self-healing step of
    /// ownership resolution). Creates with defaults (`client`, `free`) when
    /// absent; fills email/display name into webhook-created placeholders;
    /// never clobbers a fully provisioned record. Retry-safe.
    async fn get_or_create_identity(
        &self,
        params: &NewIdentityParams,
    ) -> Result<Identity, StoreError>;

    /// Get identity by external id.
    async fn get_identity(&self, external_id: &ExternalId) -> Result<Identity, StoreError>;

    /// Set the identity's stored operating role (self-service toggle).
    async fn set_current_role(
        &self,
        external_id: &ExternalId,
        role: Role,
    ) -> Result<(), StoreError>;

    /// Ban or unban an identity.
    async fn set_banned(&self, external_id: &ExternalId, banned: bool) -> Result<(), StoreError>;

    /// Idempotent tier upsert for the billing webhook. Creates a placeholder
    /// identity when the payment event arrives before local provisioning, so
    /// a payment is never lost.
    async fn upsert_tier(&self, external_id: &ExternalId, tier: Tier) -> Result<(), StoreError>;

    /// Memoize a first-time delegation: set `linked_owner_id` only if it is
    /// currently unset. Returns whether this call won the write; a caller
    /// that lost must re-read and honor the stored owner.
    async fn link_owner_if_unset(
        &self,
        member: &ExternalId,
        owner: &ExternalId,
    ) -> Result<bool, StoreError>;

    /// Find an owner whose team list contains this email (case-insensitive).
    /// Ties resolve to the earliest invite.
    async fn find_team_owner_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Add an email to an owner's team list.
    async fn add_team_member(&self, owner: &ExternalId, email: &str) -> Result<(), StoreError>;

    /// Remove an email from an owner's team list.
    async fn remove_team_member(&self, owner: &ExternalId, email: &str) -> Result<(), StoreError>;

    /// List an owner's team member emails, in invite order.
    async fn list_team_members(&self, owner: &ExternalId) -> Result<Vec<String>, StoreError>;

    // ───────────────────────────────────── Projects ───────────────────────────────────────

    /// Count projects held by an owner (quota usage).
    async fn count_projects_for_owner(&self, owner: &ExternalId) -> Result<i64, StoreError>;

    /// Whether this identity owns at least one project (drives the dual-role
    /// view override).
    async fn owns_any_project(&self, owner: &ExternalId) -> Result<bool, StoreError>;

    /// Atomic count+insert: create the project (and its milestones) only if
    /// the owner currently holds fewer than `limit` projects; otherwise
    /// `LimitReached` and nothing is persisted.
    async fn create_project_if_under_quota(
        &self,
        params: &CreateProjectParams,
        limit: i64,
    ) -> Result<Project, StoreError>;

    /// Get a project with its milestones in order.
    async fn get_project(&self, project_id: &ProjectId) -> Result<Project, StoreError>;

    /// List projects held by an owner, newest first.
    async fn list_projects_by_owner(&self, owner: &ExternalId) -> Result<Vec<Project>, StoreError>;

    /// List projects whose vendor invite matches this email
    /// (case-insensitive); the vendor dashboard read path.
    async fn list_projects_by_vendor_email(
        &self,
        email: &str,
    ) -> Result<Vec<Project>, StoreError>;

    /// Set the invited vendor email. Conditional on no vendor having joined
    /// yet (`vendor_id` unset); re-inviting after a join is `Conflict`.
    async fn set_vendor_email(&self, project_id: &ProjectId, email: &str)
        -> Result<(), StoreError>;

    /// Bind the vendor identity, only if `vendor_id` is unset and the invite
    /// email matches (case-insensitive). Returns whether this call performed
    /// the bind. Once set, later calls never rebind.
    async fn bind_vendor_if_unset(
        &self,
        project_id: &ProjectId,
        vendor: &ExternalId,
        email: &str,
    ) -> Result<bool, StoreError>;

    /// Set the project lifecycle status.
    async fn set_project_status(
        &self,
        project_id: &ProjectId,
        status: ProjectStatus,
    ) -> Result<(), StoreError>;

    /// Owner-scoped delete: removes the project and its milestones only when
    /// `owner` matches. A non-owner gets `NotFound`, never confirmation that
    /// the project exists.
    async fn delete_project_for_owner(
        &self,
        project_id: &ProjectId,
        owner: &ExternalId,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Milestones ─────────────────────────────────────

    /// Get one milestone under a project. `NotFound` covers both a missing
    /// milestone and a milestone belonging to a different project.
    async fn get_milestone(
        &self,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
    ) -> Result<Milestone, StoreError>;

    /// Conditional workflow write: apply `update` only while the milestone is
    /// still in `expected`. A lost race (row moved on concurrently) is
    /// `Conflict`. Proof fields are only written when the update carries
    /// them; rejection retains the prior proof.
    async fn update_milestone_status(
        &self,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
        expected: MilestoneStatus,
        update: &MilestoneStatusUpdate,
    ) -> Result<Milestone, StoreError>;

    /// Count milestones not yet approved (drives project auto-completion).
    async fn count_milestones_not_approved(
        &self,
        project_id: &ProjectId,
    ) -> Result<i64, StoreError>;
}
