//! Subscription entitlements.

use covenant_storage::Tier;

/// Fixed mapping from subscription tier to concurrent-project quota.
///
/// The quota always applies to the *effective owner's* tier, never the
/// acting delegate's.
pub fn project_limit(tier: Tier) -> i64 {
    match tier {
        Tier::Free => 1,
        Tier::Starter => 5,
        Tier::Agency => i64::MAX, // effectively unbounded
    }
}
