//! Outbound notification seam.
//!
//! Delivery is an external collaborator; the engine only needs "best effort
//! send". Callers log failures and never roll back the state change that
//! triggered the notification.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    Send(String),
}

/// Sends user-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell an invited vendor about the project waiting for them.
    async fn vendor_invited(
        &self,
        to: &str,
        contract_name: &str,
        invited_by: &str,
    ) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them. Default for tests and
/// deployments without an email provider configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn vendor_invited(
        &self,
        to: &str,
        contract_name: &str,
        invited_by: &str,
    ) -> Result<(), NotifyError> {
        info!(%to, %contract_name, %invited_by, "vendor invite notification");
        Ok(())
    }
}
