//! Per-request read model for page-level authorization decisions.

use covenant_storage::{ExternalId, Identity, Role, Store, Tier};

use crate::entitlement::project_limit;
use crate::role::effective_role;
use crate::{CoreError, Engine};

/// Everything a page needs to decide what to render: who is acting, whose
/// workspace applies, the effective role after the dual-role override, and
/// the owner's quota position.
#[derive(Clone, Debug)]
pub struct ViewContext {
    pub effective_owner_id: ExternalId,
    pub acting: Identity,
    pub is_owner: bool,
    /// Post-override operating role for this request.
    pub role: Role,
    /// The effective owner's tier, which governs entitlements.
    pub tier: Tier,
    pub limit: i64,
    pub usage: i64,
}

impl ViewContext {
    pub fn at_capacity(&self) -> bool {
        self.usage >= self.limit
    }
}

impl<S: Store> Engine<S> {
    /// Build the read model for one request.
    pub async fn view_context(&self, token: &str) -> Result<ViewContext, CoreError> {
        let res = self.resolve_token(token).await?;

        let usage = self
            .store
            .count_projects_for_owner(&res.owner.external_id)
            .await?;
        let owns_any = self.store.owns_any_project(&res.acting.external_id).await?;
        let role = effective_role(res.acting.current_role, owns_any);

        Ok(ViewContext {
            effective_owner_id: res.owner.external_id.clone(),
            is_owner: res.is_owner,
            role,
            tier: res.owner.tier,
            limit: project_limit(res.owner.tier),
            usage,
            acting: res.acting,
        })
    }
}
