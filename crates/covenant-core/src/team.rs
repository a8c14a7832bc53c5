//! Team delegation and identity self-service.

use tracing::info;

use covenant_audit::{AuditAction, AuditEvent};
use covenant_storage::{ExternalId, Role, Store, StoreError, Tier};

use crate::{CoreError, Engine};

/// Maximum delegates an agency owner can carry.
pub const TEAM_LIMIT: usize = 3;

impl<S: Store> Engine<S> {
    /// Flip the acting identity's stored role. The identity itself is the
    /// sole writer of this flag.
    pub async fn toggle_role(&self, token: &str) -> Result<Role, CoreError> {
        let res = self.resolve_token(token).await?;
        let new_role = res.acting.current_role.toggled();
        self.store
            .set_current_role(&res.acting.external_id, new_role)
            .await?;
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::RoleToggle)
                .resource("identity", res.acting.external_id.to_string())
                .details(serde_json::json!({ "role": new_role.as_str() }))
                .build(),
        )
        .await;
        Ok(new_role)
    }

    /// Invite an email onto the acting owner's team. Requires the agency
    /// tier; delegates cannot hold teams of their own (resolution order
    /// guarantees a linked identity never acts as an owner here).
    pub async fn add_team_member(&self, token: &str, email: &str) -> Result<(), CoreError> {
        let res = self.resolve_token(token).await?;
        if !res.is_owner {
            return Err(CoreError::Forbidden(
                "team members cannot manage a team of their own".into(),
            ));
        }
        if res.owner.tier != Tier::Agency {
            return Err(CoreError::Forbidden(
                "team delegation requires the agency tier".into(),
            ));
        }
        if email.eq_ignore_ascii_case(&res.acting.email) {
            return Err(CoreError::Forbidden("cannot invite yourself".into()));
        }

        let members = self.store.list_team_members(&res.owner.external_id).await?;
        if members.len() >= TEAM_LIMIT {
            return Err(CoreError::CapacityExceeded {
                usage: members.len() as i64,
                limit: TEAM_LIMIT as i64,
            });
        }

        match self
            .store
            .add_team_member(&res.owner.external_id, email)
            .await
        {
            Ok(()) => {}
            // Same email invited twice converges to one membership.
            Err(StoreError::AlreadyExists) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        info!(owner = %res.owner.external_id, member_email = %email, "team member invited");
        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::TeamMemberAdd)
                .resource("identity", res.owner.external_id.to_string())
                .details(serde_json::json!({ "email": email }))
                .build(),
        )
        .await;
        Ok(())
    }

    /// Drop an email from the team list. An already-memoized delegation link
    /// stays in place while the owner record exists; removal only stops new
    /// matches.
    pub async fn remove_team_member(&self, token: &str, email: &str) -> Result<(), CoreError> {
        let res = self.resolve_token(token).await?;
        if !res.is_owner {
            return Err(CoreError::Forbidden(
                "team members cannot manage a team of their own".into(),
            ));
        }

        match self
            .store
            .remove_team_member(&res.owner.external_id, email)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(CoreError::NotFound),
            Err(e) => return Err(e.into()),
        }

        self.record_audit(
            AuditEvent::builder(&res.acting.external_id, AuditAction::TeamMemberRemove)
                .resource("identity", res.owner.external_id.to_string())
                .details(serde_json::json!({ "email": email }))
                .build(),
        )
        .await;
        Ok(())
    }

    /// The acting owner's team list.
    pub async fn team_members(&self, token: &str) -> Result<Vec<String>, CoreError> {
        let res = self.resolve_token(token).await?;
        Ok(self.store.list_team_members(&res.owner.external_id).await?)
    }

    /// Administrative ban/unban, consumed by an out-of-scope admin surface.
    /// Takes no session: the admin boundary authenticates separately.
    pub async fn set_banned(
        &self,
        external_id: &ExternalId,
        banned: bool,
    ) -> Result<(), CoreError> {
        match self.store.set_banned(external_id, banned).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(CoreError::NotFound),
            Err(e) => return Err(e.into()),
        }

        let action = if banned {
            AuditAction::IdentityBan
        } else {
            AuditAction::IdentityUnban
        };
        self.record_audit(
            AuditEvent::builder(external_id, action)
                .resource("identity", external_id.to_string())
                .build(),
        )
        .await;
        Ok(())
    }
}
