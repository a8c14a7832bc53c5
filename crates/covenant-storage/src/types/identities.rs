//! Identity types.

use chrono::{DateTime, Utc};

use super::{ExternalId, Role, Tier};

/// Identity record, keyed by the identity provider's stable external id.
///
/// Created lazily on first resolution (self-healing), or as a placeholder by
/// the billing webhook when a payment event outruns local provisioning.
#[derive(Clone, Debug)]
pub struct Identity {
    pub external_id: ExternalId,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: Tier,
    pub current_role: Role,
    pub banned: bool,
    /// Set once this identity has been matched against an owner's team list.
    /// Written with an "is currently unset" precondition, so two concurrent
    /// first resolutions converge to the same owner.
    pub linked_owner_id: Option<ExternalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for the idempotent get-or-create of an identity.
///
/// `email`/`display_name` come from the verified provider session; they only
/// fill in records that were created as empty placeholders, never clobber a
/// fully provisioned row.
#[derive(Clone, Debug)]
pub struct NewIdentityParams {
    pub external_id: ExternalId,
    pub email: String,
    pub display_name: Option<String>,
}
