//! Delivery seam for lifecycle and variance notifications.
//!
//! The engine decides *when* to notify and *with what payload*; delivery
//! mechanics (email, chat, push) live behind the `Notifier` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Payload handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferNotification {
    /// `created | approved | rejected | dispatched | received | variance`
    pub event_type: String,
    pub transfer_id: Uuid,
    pub payload: serde_json::Value,
    /// Role slugs the notification is addressed to; empty means the
    /// delivery subsystem routes by event type.
    pub recipient_roles: Vec<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: TransferNotification) -> Result<(), String>;
}

/// Default adapter: writes notifications to the structured log. Useful in
/// development and as the fallback when no delivery backend is wired.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: TransferNotification) -> Result<(), String> {
        info!(
            event_type = %notification.event_type,
            transfer_id = %notification.transfer_id,
            recipients = ?notification.recipient_roles,
            payload = %notification.payload,
            "transfer notification"
        );
        Ok(())
    }
}
