//! Core engine for covenant: ownership resolution, role selection, quota
//! enforcement, and the milestone workflow.
//!
//! Every inbound request carries a session token. The engine re-verifies it
//! with the identity provider, resolves the *effective owner* (self, or a
//! team owner under delegation), and only then touches the store. There is no
//! ambient "current user" anywhere: the resolved identity context is threaded
//! explicitly through every operation.
//!
//! All check-then-act sequences (delegation link, quota check, milestone
//! transition, vendor auto-bind) lean on the store's conditional operations,
//! so concurrent requests racing the same transition converge instead of
//! requiring locks.

use std::sync::Arc;

use tracing::warn;

use covenant_audit::{AuditEvent, AuditLog};
use covenant_storage::Store;

mod context;
mod entitlement;
mod error;
mod milestones;
mod notify;
mod ownership;
mod projects;
mod role;
mod session;
mod team;
mod workflow;

pub use context::ViewContext;
pub use entitlement::project_limit;
pub use error::CoreError;
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use ownership::Resolution;
pub use projects::{ContractExtract, MilestoneExtract};
pub use role::effective_role;
pub use session::{AuthSession, SessionError, SessionVerifier, StaticSessionVerifier};
pub use workflow::{next_status, MilestoneAction};

/// The engine tying resolution, authorization, and storage together.
///
/// Operations are grouped by domain across the submodules: ownership
/// resolution in `ownership`, project lifecycle and vendor assignment in
/// `projects`, the milestone workflow in `milestones`, team/role management
/// in `team`, and the per-request read model in `context`.
pub struct Engine<S> {
    store: Arc<S>,
    verifier: Arc<dyn SessionVerifier>,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> Engine<S> {
    pub fn new(
        store: Arc<S>,
        verifier: Arc<dyn SessionVerifier>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            verifier,
            audit,
            notifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record an audit event; failures are logged and never fail the
    /// operation being audited.
    pub(crate) async fn record_audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "failed to record audit event");
        }
    }
}
