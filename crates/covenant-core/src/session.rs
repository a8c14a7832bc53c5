//! Identity-provider session verification seam.
//!
//! The provider is the source of truth for who is making a request; the
//! engine re-verifies every inbound token instead of trusting anything
//! cached locally. When verification cannot be performed, resolution fails
//! closed.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use covenant_storage::ExternalId;

use crate::CoreError;

/// Verified claims from the identity provider.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub external_id: ExternalId,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The token is missing, expired, or rejected by the provider.
    #[error("invalid session: {0}")]
    Invalid(String),

    /// The provider could not be reached to verify the token.
    #[error("identity provider unreachable: {0}")]
    Provider(String),
}

impl From<SessionError> for CoreError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Invalid(_) => CoreError::Unauthenticated,
            SessionError::Provider(msg) => CoreError::Upstream(msg),
        }
    }
}

/// Verifies an inbound session token with the identity provider.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthSession, SessionError>;
}

/// Fixed token→session map for tests and local development.
#[derive(Default)]
pub struct StaticSessionVerifier {
    sessions: HashMap<String, AuthSession>,
}

impl StaticSessionVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, session: AuthSession) {
        self.sessions.insert(token.into(), session);
    }

    pub fn with_session(mut self, token: impl Into<String>, session: AuthSession) -> Self {
        self.insert(token, session);
        self
    }
}

#[async_trait]
impl SessionVerifier for StaticSessionVerifier {
    async fn verify(&self, token: &str) -> Result<AuthSession, SessionError> {
        self.sessions
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::Invalid("unknown token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> AuthSession {
        AuthSession {
            external_id: ExternalId::from(id),
            email: format!("{}@example.com", id),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_tokens() {
        let verifier = StaticSessionVerifier::new().with_session("tok_1", session("user_1"));

        let claims = verifier.verify("tok_1").await.unwrap();
        assert_eq!(claims.external_id, ExternalId::from("user_1"));

        let err = verifier.verify("tok_2").await.unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));
    }

    #[test]
    fn session_errors_map_to_core_taxonomy() {
        assert!(matches!(
            CoreError::from(SessionError::Invalid("expired".into())),
            CoreError::Unauthenticated
        ));
        assert!(matches!(
            CoreError::from(SessionError::Provider("timeout".into())),
            CoreError::Upstream(_)
        ));
    }
}
