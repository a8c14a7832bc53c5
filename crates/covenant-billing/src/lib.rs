//! covenant-billing - Billing integration for covenant
//!
//! This crate keeps subscription tiers in sync with the payment gateway:
//! - Webhook payload parsing (subscription lifecycle events)
//! - Tier upsert keyed by the customer's identity-provider external id
//!
//! # Architecture
//!
//! The gateway is the source of truth for what a customer pays for; this
//! crate only translates its webhook events into `upsert_tier` calls. The
//! upsert is tolerant of the identity not existing yet (it creates a
//! placeholder record), so a payment event is never lost even if local
//! provisioning lagged the payment gateway.

use std::str::FromStr;

use thiserror::Error;

use covenant_storage::{StoreError, Tier};

mod webhook;
pub use webhook::{
    parse_webhook_event, DefaultWebhookHandler, TierWebhookEvent, WebhookHandler,
};

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the billing integration
#[derive(Clone)]
pub struct BillingConfig {
    /// Webhook secret for signature verification
    pub webhook_secret: String,

    /// Price ID for the Starter tier
    pub starter_price_id: String,

    /// Price ID for the Agency tier
    pub agency_price_id: String,
}

impl BillingConfig {
    /// Create a new billing configuration from environment variables
    pub fn from_env() -> Result<Self, BillingError> {
        Ok(Self {
            webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("BILLING_WEBHOOK_SECRET not set".into()))?,
            starter_price_id: std::env::var("BILLING_STARTER_PRICE_ID")
                .map_err(|_| BillingError::Config("BILLING_STARTER_PRICE_ID not set".into()))?,
            agency_price_id: std::env::var("BILLING_AGENCY_PRICE_ID")
                .map_err(|_| BillingError::Config("BILLING_AGENCY_PRICE_ID not set".into()))?,
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            webhook_secret: String::new(),
            starter_price_id: "price_starter_test".into(),
            agency_price_id: "price_agency_test".into(),
        }
    }

    /// Map a gateway price id to a tier.
    ///
    /// Unknown price ids map to `Free` so a misconfigured price never grants
    /// unintended paid features.
    pub fn tier_for_price(&self, price_id: &str) -> Tier {
        if price_id == self.starter_price_id {
            Tier::Starter
        } else if price_id == self.agency_price_id {
            Tier::Agency
        } else {
            tracing::warn!(%price_id, "Unknown price id, defaulting to free tier");
            Tier::Free
        }
    }
}

/// Subscription status as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Trial period (no payment required yet)
    Trialing,

    /// Active subscription
    Active,

    /// Past due (payment failed, but still in grace period)
    PastDue,

    /// Canceled (scheduled to end)
    Canceled,

    /// Unpaid (payment failed, subscription suspended)
    Unpaid,

    /// Incomplete (initial payment incomplete)
    Incomplete,
}

impl SubscriptionStatus {
    /// Whether this status entitles the customer to its paid tier.
    pub fn grants_entitlement(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trialing => write!(f, "trialing"),
            Self::Active => write!(f, "active"),
            Self::PastDue => write!(f, "past_due"),
            Self::Canceled => write!(f, "canceled"),
            Self::Unpaid => write!(f, "unpaid"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            "incomplete" => Ok(Self::Incomplete),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_status_roundtrip() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
        ] {
            let parsed: SubscriptionStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn entitlement_statuses() {
        assert!(SubscriptionStatus::Active.grants_entitlement());
        assert!(SubscriptionStatus::Trialing.grants_entitlement());
        assert!(!SubscriptionStatus::PastDue.grants_entitlement());
        assert!(!SubscriptionStatus::Canceled.grants_entitlement());
    }

    #[test]
    fn tier_for_price_mapping() {
        let config = BillingConfig::test();
        assert_eq!(config.tier_for_price("price_starter_test"), Tier::Starter);
        assert_eq!(config.tier_for_price("price_agency_test"), Tier::Agency);
        assert_eq!(config.tier_for_price("price_unknown"), Tier::Free);
    }
}
