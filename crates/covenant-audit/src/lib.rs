//! Audit logging abstraction for covenant.
//!
//! This crate defines the `AuditLog` trait for persisting audit events and
//! the types representing auditable actions in the system. The engine records
//! an event after every state-changing operation; failures to record are
//! logged by the caller and never fail the main operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use covenant_storage::{ExternalId, ProjectId};

/// Unique identifier for an audit log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLogId(pub Uuid);

impl AuditLogId {
    /// Generate a new audit log ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Categories of auditable actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Project operations
    ProjectCreate,
    ProjectDelete,
    ProjectArchive,

    // Vendor operations
    VendorInvite,
    VendorJoin,

    // Milestone workflow
    MilestoneSubmit,
    MilestoneApprove,
    MilestoneReject,
    MilestoneDispute,

    // Identity operations
    RoleToggle,
    TeamMemberAdd,
    TeamMemberRemove,
    TierChange,
    IdentityBan,
    IdentityUnban,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::ProjectCreate => "project.create",
            AuditAction::ProjectDelete => "project.delete",
            AuditAction::ProjectArchive => "project.archive",
            AuditAction::VendorInvite => "vendor.invite",
            AuditAction::VendorJoin => "vendor.join",
            AuditAction::MilestoneSubmit => "milestone.submit",
            AuditAction::MilestoneApprove => "milestone.approve",
            AuditAction::MilestoneReject => "milestone.reject",
            AuditAction::MilestoneDispute => "milestone.dispute",
            AuditAction::RoleToggle => "role.toggle",
            AuditAction::TeamMemberAdd => "team.member_add",
            AuditAction::TeamMemberRemove => "team.member_remove",
            AuditAction::TierChange => "tier.change",
            AuditAction::IdentityBan => "identity.ban",
            AuditAction::IdentityUnban => "identity.unban",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project.create" => Ok(AuditAction::ProjectCreate),
            "project.delete" => Ok(AuditAction::ProjectDelete),
            "project.archive" => Ok(AuditAction::ProjectArchive),
            "vendor.invite" => Ok(AuditAction::VendorInvite),
            "vendor.join" => Ok(AuditAction::VendorJoin),
            "milestone.submit" => Ok(AuditAction::MilestoneSubmit),
            "milestone.approve" => Ok(AuditAction::MilestoneApprove),
            "milestone.reject" => Ok(AuditAction::MilestoneReject),
            "milestone.dispute" => Ok(AuditAction::MilestoneDispute),
            "role.toggle" => Ok(AuditAction::RoleToggle),
            "team.member_add" => Ok(AuditAction::TeamMemberAdd),
            "team.member_remove" => Ok(AuditAction::TeamMemberRemove),
            "tier.change" => Ok(AuditAction::TierChange),
            "identity.ban" => Ok(AuditAction::IdentityBan),
            "identity.unban" => Ok(AuditAction::IdentityUnban),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Result of an audited operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    PermissionDenied,
    NotFound,
    InvalidRequest,
    Error,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditResult::Success => "success",
            AuditResult::PermissionDenied => "permission_denied",
            AuditResult::NotFound => "not_found",
            AuditResult::InvalidRequest => "invalid_request",
            AuditResult::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// An audit log entry representing a single auditable action.
///
/// Uses raw strings/UUIDs for serialization compatibility. Use the builder to
/// construct events from typed IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this audit entry
    pub id: AuditLogId,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// External id of the identity that performed the action
    pub actor: String,
    /// The action that was performed
    pub action: AuditAction,
    /// Type of resource affected (e.g., "project", "milestone", "identity")
    pub resource_type: String,
    /// Identifier of the affected resource
    pub resource_id: String,
    /// Project context (if applicable)
    pub project_id: Option<Uuid>,
    /// Result of the operation
    pub result: AuditResult,
    /// Error message or additional context
    pub reason: Option<String>,
    /// Additional details as JSON (e.g., old/new status)
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event builder
    pub fn builder(actor: &ExternalId, action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(actor, action)
    }

    /// Get the actor as a typed id
    pub fn get_actor(&self) -> ExternalId {
        ExternalId(self.actor.clone())
    }

    /// Get the project id as a typed id (if present)
    pub fn get_project_id(&self) -> Option<ProjectId> {
        self.project_id.map(ProjectId)
    }
}

/// Builder for constructing audit events
pub struct AuditEventBuilder {
    actor: String,
    action: AuditAction,
    resource_type: String,
    resource_id: String,
    project_id: Option<Uuid>,
    result: AuditResult,
    reason: Option<String>,
    details: Option<serde_json::Value>,
}

impl AuditEventBuilder {
    pub fn new(actor: &ExternalId, action: AuditAction) -> Self {
        Self {
            actor: actor.as_str().to_string(),
            action,
            resource_type: String::new(),
            resource_id: String::new(),
            project_id: None,
            result: AuditResult::Success,
            reason: None,
            details: None,
        }
    }

    pub fn resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id.into();
        self
    }

    pub fn project_id(mut self, project_id: Option<&ProjectId>) -> Self {
        self.project_id = project_id.map(|p| p.0);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: AuditLogId::new(),
            timestamp: Utc::now(),
            actor: self.actor,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            project_id: self.project_id,
            result: self.result,
            reason: self.reason,
            details: self.details,
        }
    }
}

/// Filter for querying audit logs
#[derive(Clone, Debug, Default)]
pub struct AuditLogFilter {
    pub actor: Option<ExternalId>,
    pub action: Option<AuditAction>,
    pub project_id: Option<ProjectId>,
    pub result: Option<AuditResult>,
    /// Start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// End timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: ExternalId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn project_id(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(actor) = &self.actor {
            if event.actor != actor.as_str() {
                return false;
            }
        }
        if let Some(action) = self.action {
            if event.action != action {
                return false;
            }
        }
        if let Some(project_id) = self.project_id {
            if event.project_id != Some(project_id.0) {
                return false;
            }
        }
        if let Some(result) = self.result {
            if event.result != result {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp >= to {
                return false;
            }
        }
        true
    }
}

/// Error type for audit log operations
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("audit log not found: {0}")]
    NotFound(AuditLogId),
}

/// Trait for audit log persistence.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record an audit event.
    ///
    /// Called after each auditable operation completes. Failures should be
    /// logged by the caller but must not fail the main operation.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError>;

    /// Query audit logs, newest first.
    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError>;

    /// Get a specific audit log entry by ID.
    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError>;

    /// Count audit logs matching the filter criteria.
    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError>;
}

/// In-memory audit log.
///
/// Events live only within a single process; suitable for single-server
/// deployments and tests. Multi-replica deployments want a database-backed
/// implementation instead.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        events.push(event);
        Ok(())
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        let events = self
            .events
            .lock()
            .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.reverse(); // newest first
        if let Some(limit) = filter.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        let events = self
            .events
            .lock()
            .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(AuditLogError::NotFound(id))
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        let events = self
            .events
            .lock()
            .map_err(|e| AuditLogError::Backend(e.to_string()))?;
        Ok(events.iter().filter(|e| filter.matches(e)).count() as u64)
    }
}
