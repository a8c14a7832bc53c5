//! Type definitions for covenant storage.

mod identities;
mod ids;
mod milestones;
mod projects;
mod tiers;

// Re-export all types from submodules
pub use identities::*;
pub use ids::*;
pub use milestones::*;
pub use projects::*;
pub use tiers::*;
