//! Subscription tier and operating-role enums.

use std::str::FromStr;

/// Subscription tier governing an owner's entitlements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Free,
    Starter,
    Agency,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "agency" => Ok(Tier::Agency),
            _ => Err(format!("invalid tier: {}", s)),
        }
    }
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Agency => "agency",
        }
    }
}

/// Operating role an identity is currently working in.
///
/// This is the *stored* role. Read paths may override it: see the role
/// selector in covenant-core (ownership of any project wins over a stale
/// vendor label for owner-scoped views).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Vendor,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "vendor" => Ok(Role::Vendor),
            _ => Err(format!("invalid role: {}", s)),
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Vendor => "vendor",
        }
    }

    /// The other role; used by the self-service role toggle.
    pub fn toggled(&self) -> Role {
        match self {
            Role::Client => Role::Vendor,
            Role::Vendor => Role::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_roundtrip() {
        for tier in [Tier::Free, Tier::Starter, Tier::Agency] {
            let parsed: Tier = tier.as_str().parse().unwrap();
            assert_eq!(tier, parsed);
        }
    }

    #[test]
    fn tier_parse_invalid() {
        assert!("pro".parse::<Tier>().is_err());
        assert!("Free".parse::<Tier>().is_err()); // Case sensitive
        assert!("".parse::<Tier>().is_err());
    }

    #[test]
    fn role_roundtrip() {
        for role in [Role::Client, Role::Vendor] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn role_toggled_flips_both_ways() {
        assert_eq!(Role::Client.toggled(), Role::Vendor);
        assert_eq!(Role::Vendor.toggled(), Role::Client);
    }
}
