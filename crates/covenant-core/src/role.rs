//! Effective-role selection for read paths that branch client-vs-vendor.

use covenant_storage::Role;

/// Decide the role an identity effectively operates in.
///
/// Defaults to the stored role. The dual-role override: an identity labeled
/// `vendor` that owns at least one project is treated as acting in the
/// client capacity for owner-scoped views, rather than being redirected away
/// from its own resources by a stale label. This is a read-time decision
/// only; it never mutates the stored role.
pub fn effective_role(stored: Role, owns_any_project: bool) -> Role {
    match stored {
        Role::Vendor if owns_any_project => Role::Client,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_role_wins_without_owned_projects() {
        assert_eq!(effective_role(Role::Client, false), Role::Client);
        assert_eq!(effective_role(Role::Vendor, false), Role::Vendor);
    }

    #[test]
    fn ownership_overrides_stale_vendor_label() {
        assert_eq!(effective_role(Role::Vendor, true), Role::Client);
    }

    #[test]
    fn client_with_projects_stays_client() {
        assert_eq!(effective_role(Role::Client, true), Role::Client);
    }
}
