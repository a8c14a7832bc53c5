//! Billing webhook handling
//!
//! Handles incoming payment-gateway webhook events to keep subscription tiers
//! in sync with what customers actually pay for.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use covenant_storage::{ExternalId, Store};

use crate::{BillingConfig, BillingError, SubscriptionStatus};

/// Parsed billing webhook event.
///
/// The gateway is configured to stamp the customer's identity-provider
/// external id into subscription metadata (and `client_reference_id` for
/// checkout sessions), so events can be applied without a customer-id lookup
/// table.
#[derive(Debug, Clone)]
pub enum TierWebhookEvent {
    /// Subscription was created
    SubscriptionCreated {
        subscription_id: String,
        external_id: String,
        price_id: String,
        status: SubscriptionStatus,
    },

    /// Subscription was updated (plan change, renewal, etc.)
    SubscriptionUpdated {
        subscription_id: String,
        external_id: String,
        price_id: String,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    },

    /// Subscription was deleted/canceled
    SubscriptionDeleted {
        subscription_id: String,
        external_id: String,
    },

    /// Checkout session completed
    CheckoutCompleted {
        session_id: String,
        external_id: String,
        subscription_id: Option<String>,
    },

    /// Unknown or unhandled event
    Unknown { event_type: String },
}

/// Handler for billing webhook events
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle an incoming webhook event
    async fn handle_event(&self, event: TierWebhookEvent) -> Result<(), BillingError>;
}

/// Default webhook handler: translates subscription events into tier upserts.
pub struct DefaultWebhookHandler<S: Store> {
    config: BillingConfig,
    store: Arc<S>,
}

impl<S: Store> DefaultWebhookHandler<S> {
    /// Create a new webhook handler
    pub fn new(config: BillingConfig, store: Arc<S>) -> Self {
        Self { config, store }
    }

    async fn apply_tier(
        &self,
        external_id: &str,
        price_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), BillingError> {
        if external_id.is_empty() {
            warn!("Webhook event missing external id, skipping");
            return Ok(());
        }
        if !status.grants_entitlement() {
            info!(%external_id, %status, "Subscription not entitling, leaving tier unchanged");
            return Ok(());
        }

        let tier = self.config.tier_for_price(price_id);
        self.store
            .upsert_tier(&ExternalId(external_id.to_string()), tier)
            .await?;
        info!(%external_id, tier = tier.as_str(), "Tier updated from webhook");
        Ok(())
    }
}

#[async_trait]
impl<S: Store + 'static> WebhookHandler for DefaultWebhookHandler<S> {
    async fn handle_event(&self, event: TierWebhookEvent) -> Result<(), BillingError> {
        match event {
            TierWebhookEvent::SubscriptionCreated {
                subscription_id,
                external_id,
                price_id,
                status,
            } => {
                info!(%subscription_id, %external_id, %status, "Subscription created");
                self.apply_tier(&external_id, &price_id, status).await
            }

            TierWebhookEvent::SubscriptionUpdated {
                subscription_id,
                external_id,
                price_id,
                status,
                cancel_at_period_end,
            } => {
                info!(
                    %subscription_id,
                    %external_id,
                    %status,
                    cancel_at_period_end,
                    "Subscription updated"
                );
                self.apply_tier(&external_id, &price_id, status).await
            }

            TierWebhookEvent::SubscriptionDeleted {
                subscription_id,
                external_id,
            } => {
                info!(%subscription_id, %external_id, "Subscription deleted");
                if external_id.is_empty() {
                    warn!("Webhook event missing external id, skipping");
                    return Ok(());
                }
                // Downgrade to the free tier.
                self.store
                    .upsert_tier(
                        &ExternalId(external_id.clone()),
                        covenant_storage::Tier::Free,
                    )
                    .await?;
                info!(%external_id, "Identity downgraded to free tier");
                Ok(())
            }

            TierWebhookEvent::CheckoutCompleted {
                session_id,
                external_id,
                subscription_id,
            } => {
                // Subscription events carry the tier change; checkout is
                // informational only.
                info!(%session_id, %external_id, ?subscription_id, "Checkout completed");
                Ok(())
            }

            TierWebhookEvent::Unknown { event_type } => {
                info!(%event_type, "Unhandled webhook event type");
                Ok(())
            }
        }
    }
}

/// Parse a raw webhook payload into an event
///
/// # Arguments
/// * `payload` - Raw webhook body
/// * `signature` - Webhook signature header value
/// * `webhook_secret` - Webhook endpoint secret (empty string to disable verification)
///
/// # Security
/// When `webhook_secret` is configured, this function REQUIRES a valid
/// signature. Signature verification is not yet implemented, so providing a
/// webhook_secret will cause all requests to fail (fail-closed behavior).
///
/// For development/testing, pass an empty `webhook_secret` to skip
/// verification.
pub fn parse_webhook_event(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> Result<TierWebhookEvent, BillingError> {
    // When webhook_secret is configured, we MUST verify signatures; this
    // prevents attackers from forging billing events.
    if !webhook_secret.is_empty() {
        if signature.is_empty() {
            // Reject requests with missing signature when a secret is
            // configured; omitting the header must not bypass verification.
            return Err(BillingError::Provider(
                "Missing webhook signature. Signature verification is required when \
                 webhook_secret is configured."
                    .into(),
            ));
        }

        // Fail closed: reject events when signature verification is not
        // implemented but credentials are provided (indicates production use).
        return Err(BillingError::Provider(
            "Webhook signature verification not implemented. \
             Remove webhook_secret for development, \
             or implement HMAC verification for production."
                .into(),
        ));
    }

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| BillingError::Provider(e.to_string()))?;

    let event_type = value["type"]
        .as_str()
        .ok_or_else(|| BillingError::Provider("Missing event type".into()))?;

    match event_type {
        "customer.subscription.created" => {
            let sub = &value["data"]["object"];
            Ok(TierWebhookEvent::SubscriptionCreated {
                subscription_id: sub["id"].as_str().unwrap_or("").to_string(),
                external_id: sub["metadata"]["external_id"].as_str().unwrap_or("").to_string(),
                price_id: sub["items"]["data"][0]["price"]["id"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
                status: parse_subscription_status(sub["status"].as_str().unwrap_or("active")),
            })
        }

        "customer.subscription.updated" => {
            let sub = &value["data"]["object"];
            Ok(TierWebhookEvent::SubscriptionUpdated {
                subscription_id: sub["id"].as_str().unwrap_or("").to_string(),
                external_id: sub["metadata"]["external_id"].as_str().unwrap_or("").to_string(),
                price_id: sub["items"]["data"][0]["price"]["id"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
                status: parse_subscription_status(sub["status"].as_str().unwrap_or("active")),
                cancel_at_period_end: sub["cancel_at_period_end"].as_bool().unwrap_or(false),
            })
        }

        "customer.subscription.deleted" => {
            let sub = &value["data"]["object"];
            Ok(TierWebhookEvent::SubscriptionDeleted {
                subscription_id: sub["id"].as_str().unwrap_or("").to_string(),
                external_id: sub["metadata"]["external_id"].as_str().unwrap_or("").to_string(),
            })
        }

        "checkout.session.completed" => {
            let session = &value["data"]["object"];
            Ok(TierWebhookEvent::CheckoutCompleted {
                session_id: session["id"].as_str().unwrap_or("").to_string(),
                external_id: session["client_reference_id"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
                subscription_id: session["subscription"].as_str().map(|s| s.to_string()),
            })
        }

        _ => Ok(TierWebhookEvent::Unknown {
            event_type: event_type.to_string(),
        }),
    }
}

fn parse_subscription_status(status: &str) -> SubscriptionStatus {
    match SubscriptionStatus::from_str(status) {
        Ok(status) => status,
        // Default to Incomplete for unknown statuses to avoid granting
        // unintended access
        Err(_) => {
            warn!(%status, "Unknown subscription status, defaulting to Incomplete");
            SubscriptionStatus::Incomplete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_store_sqlite::SqliteStore;
    use covenant_storage::Tier;

    #[test]
    fn parse_subscription_created() {
        let payload = r#"{
            "type": "customer.subscription.created",
            "data": {
                "object": {
                    "id": "sub_123",
                    "status": "trialing",
                    "metadata": {"external_id": "user_456"},
                    "items": {
                        "data": [
                            {"price": {"id": "price_starter_test"}}
                        ]
                    }
                }
            }
        }"#;

        let event = parse_webhook_event(payload, "", "").unwrap();
        match event {
            TierWebhookEvent::SubscriptionCreated {
                subscription_id,
                external_id,
                price_id,
                status,
            } => {
                assert_eq!(subscription_id, "sub_123");
                assert_eq!(external_id, "user_456");
                assert_eq!(price_id, "price_starter_test");
                assert_eq!(status, SubscriptionStatus::Trialing);
            }
            _ => panic!("Expected SubscriptionCreated event"),
        }
    }

    #[test]
    fn parse_unknown_event() {
        let payload = r#"{"type": "some.unknown.event", "data": {}}"#;
        let event = parse_webhook_event(payload, "", "").unwrap();
        match event {
            TierWebhookEvent::Unknown { event_type } => {
                assert_eq!(event_type, "some.unknown.event");
            }
            _ => panic!("Expected Unknown event"),
        }
    }

    #[test]
    fn missing_signature_with_secret_configured_is_rejected() {
        // When webhook_secret is configured, missing signature MUST be
        // rejected so attackers cannot bypass verification by omitting the
        // header.
        let payload = r#"{"type": "customer.subscription.created", "data": {"object": {}}}"#;
        let result = parse_webhook_event(payload, "", "whsec_test_secret");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("Missing webhook signature"),
            "Expected 'Missing webhook signature' error, got: {}",
            err
        );
    }

    #[test]
    fn unknown_status_defaults_to_incomplete() {
        assert_eq!(
            parse_subscription_status("paused"),
            SubscriptionStatus::Incomplete
        );
    }

    #[tokio::test]
    async fn created_event_upserts_tier_for_unprovisioned_identity() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let handler = DefaultWebhookHandler::new(BillingConfig::test(), store.clone());

        handler
            .handle_event(TierWebhookEvent::SubscriptionCreated {
                subscription_id: "sub_1".into(),
                external_id: "user_pays_first".into(),
                price_id: "price_agency_test".into(),
                status: SubscriptionStatus::Active,
            })
            .await
            .unwrap();

        // Placeholder identity was created so the payment is not lost.
        let identity = store
            .get_identity(&ExternalId::from("user_pays_first"))
            .await
            .unwrap();
        assert_eq!(identity.tier, Tier::Agency);
    }

    #[tokio::test]
    async fn deleted_event_downgrades_to_free() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let handler = DefaultWebhookHandler::new(BillingConfig::test(), store.clone());

        store
            .upsert_tier(&ExternalId::from("user_1"), Tier::Starter)
            .await
            .unwrap();

        handler
            .handle_event(TierWebhookEvent::SubscriptionDeleted {
                subscription_id: "sub_1".into(),
                external_id: "user_1".into(),
            })
            .await
            .unwrap();

        let identity = store.get_identity(&ExternalId::from("user_1")).await.unwrap();
        assert_eq!(identity.tier, Tier::Free);
    }

    #[tokio::test]
    async fn non_entitling_status_leaves_tier_unchanged() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let handler = DefaultWebhookHandler::new(BillingConfig::test(), store.clone());

        store
            .upsert_tier(&ExternalId::from("user_1"), Tier::Starter)
            .await
            .unwrap();

        handler
            .handle_event(TierWebhookEvent::SubscriptionUpdated {
                subscription_id: "sub_1".into(),
                external_id: "user_1".into(),
                price_id: "price_agency_test".into(),
                status: SubscriptionStatus::PastDue,
                cancel_at_period_end: false,
            })
            .await
            .unwrap();

        let identity = store.get_identity(&ExternalId::from("user_1")).await.unwrap();
        assert_eq!(identity.tier, Tier::Starter);
    }
}
