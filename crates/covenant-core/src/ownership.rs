//! Ownership resolution: who acts on whose behalf.
//!
//! Delegation is discovered lazily from the owner's team list rather than
//! pushed eagerly, so an invited identity does not need to exist beforehand.
//! The link is memoized on first success to avoid repeated scans of team
//! lists; the memo write carries an "unset" precondition so concurrent first
//! resolutions converge to the same owner.

use covenant_storage::{ExternalId, Identity, NewIdentityParams, Store, StoreError};

use crate::{AuthSession, CoreError, Engine};

/// Result of resolving an acting identity to its effective owner.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// The authenticated identity making the request.
    pub acting: Identity,
    /// The identity whose resources and entitlements govern the request.
    pub owner: Identity,
    /// Whether the acting identity is its own owner.
    pub is_owner: bool,
}

impl Resolution {
    pub fn owner_id(&self) -> &ExternalId {
        &self.owner.external_id
    }
}

impl<S: Store> Engine<S> {
    /// Resolve a verified session to `{acting, owner, is_owner}`.
    ///
    /// Strict order, first match wins:
    /// 1. get-or-create the acting identity (self-healing; provider and local
    ///    store can fall out of sync on webhook races or first login);
    /// 2. a banned identity fails closed;
    /// 3. a memoized `linked_owner_id` short-circuits the team scan;
    /// 4. otherwise scan team lists by email and memoize the link;
    /// 5. otherwise the identity is its own owner.
    pub async fn resolve(&self, session: &AuthSession) -> Result<Resolution, CoreError> {
        let acting = self
            .store
            .get_or_create_identity(&NewIdentityParams {
                external_id: session.external_id.clone(),
                email: session.email.clone(),
                display_name: session.display_name.clone(),
            })
            .await?;

        if acting.banned {
            return Err(CoreError::Forbidden("account suspended".into()));
        }

        // Confirmed delegation.
        if let Some(owner_id) = &acting.linked_owner_id {
            match self.store.get_identity(owner_id).await {
                Ok(owner) => {
                    return Ok(Resolution {
                        acting,
                        owner,
                        is_owner: false,
                    })
                }
                // The linked owner was deleted; fall through to re-discovery
                // instead of failing every request from this member.
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // First-time delegation, discovered from team lists by email.
        if !acting.email.is_empty() {
            if let Some(owner) = self.store.find_team_owner_by_email(&acting.email).await? {
                if owner.external_id != acting.external_id {
                    let won = self
                        .store
                        .link_owner_if_unset(&acting.external_id, &owner.external_id)
                        .await?;
                    if won {
                        tracing::info!(
                            member = %acting.external_id,
                            owner = %owner.external_id,
                            "delegation link established"
                        );
                        return Ok(Resolution {
                            acting,
                            owner,
                            is_owner: false,
                        });
                    }
                    // Lost the race: honor whatever the winner stored.
                    let acting = self.store.get_identity(&acting.external_id).await?;
                    if let Some(owner_id) = &acting.linked_owner_id {
                        let owner = self.store.get_identity(owner_id).await?;
                        return Ok(Resolution {
                            acting: acting.clone(),
                            owner,
                            is_owner: false,
                        });
                    }
                }
            }
        }

        // Self-owned.
        Ok(Resolution {
            owner: acting.clone(),
            acting,
            is_owner: true,
        })
    }

    /// Verify the token with the identity provider, then resolve. Resolution
    /// fails closed when the session cannot be re-verified.
    pub async fn resolve_token(&self, token: &str) -> Result<Resolution, CoreError> {
        let session = self.verifier.verify(token).await?;
        self.resolve(&session).await
    }
}
