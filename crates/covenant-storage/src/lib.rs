//! Storage abstraction for covenant.
//!
//! Backend crates (e.g., covenant-store-sqlite) implement the [`Store`] trait
//! so covenant-core doesn't depend on any specific database engine or schema
//! details. Records are scoped by the *effective owner* of a workspace; the
//! trait exposes conditional updates so every check-then-act sequence in the
//! engine maps to a single atomic statement in the backend.

use thiserror::Error;

mod store;
pub mod types;

#[cfg(feature = "test-support")]
pub use store::MockStore;
pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A conditional update found the row, but its pre-state did not match.
    #[error("conflict")]
    Conflict,
    /// An atomic count+insert found the owner at or over its quota.
    #[error("limit reached")]
    LimitReached,
    #[error("backend error: {0}")]
    Backend(String),
}
