//! Error taxonomy for engine operations.

use thiserror::Error;

use covenant_storage::{MilestoneStatus, StoreError};

use crate::workflow::MilestoneAction;

/// Errors surfaced to the presentation layer.
///
/// The boundary mapping is fixed: `Unauthenticated` is a login redirect at
/// the page boundary and 401 at the API boundary; `Forbidden` a safe-default
/// redirect / 403; `NotFound` 404; `CapacityExceeded` 403 with usage and
/// limit so the caller can render an upgrade prompt; `InvalidTransition` 400
/// with the resource left unchanged.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not authenticated")]
    Unauthenticated,

    /// Authenticated but not entitled to the resource or action. Messages
    /// never confirm that a resource exists to an unauthorized actor.
    #[error("{0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    /// The owner's tier quota is exhausted; nothing was created.
    #[error("capacity exceeded: {usage} of {limit} used")]
    CapacityExceeded { usage: i64, limit: i64 },

    /// The requested workflow action is not legal from the current state.
    #[error("invalid transition: cannot {} from {}", .action.as_str(), .from.as_str())]
    InvalidTransition {
        from: MilestoneStatus,
        action: MilestoneAction,
    },

    /// An external collaborator (identity provider) was unreachable; the
    /// operation fails closed rather than trusting stale local data.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CoreError {
    /// Generic denial that hides whether the resource exists.
    pub(crate) fn access_denied() -> Self {
        CoreError::Forbidden("not found or access denied".into())
    }

    /// HTTP status for the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Unauthenticated => 401,
            CoreError::Forbidden(_) => 403,
            CoreError::NotFound => 404,
            CoreError::CapacityExceeded { .. } => 403,
            CoreError::InvalidTransition { .. } => 400,
            CoreError::Upstream(_) | CoreError::Storage(_) => 500,
        }
    }
}
