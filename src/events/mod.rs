//! Lifecycle events and the notification pipeline.
//!
//! Services emit events after a state transition commits. Delivery is
//! best-effort: a failed notification is logged and never rolls back or
//! fails the transition that produced it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::notifications::{Notifier, TransferNotification};

/// One flagged line inside a `VarianceDetected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceAlert {
    pub variance_id: Uuid,
    pub item_kind: String,
    pub item_id: Uuid,
    pub variance: i32,
    pub variance_value: Decimal,
    pub severity: String,
}

/// Events produced by the transfer lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TransferCreated {
        transfer_id: Uuid,
        transfer_number: String,
        source_outlet_id: Uuid,
        destination_outlet_id: Uuid,
        requested_by: Uuid,
    },
    TransferApproved {
        transfer_id: Uuid,
        approved_by: Uuid,
    },
    TransferRejected {
        transfer_id: Uuid,
        reason: String,
        rejected_by: Uuid,
    },
    TransferDispatched {
        transfer_id: Uuid,
        line_count: usize,
    },
    TransferReceived {
        transfer_id: Uuid,
        received_by: Uuid,
        variance_count: usize,
    },
    VarianceDetected {
        transfer_id: Uuid,
        alerts: Vec<VarianceAlert>,
    },
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TransferCreated { .. } => "created",
            Event::TransferApproved { .. } => "approved",
            Event::TransferRejected { .. } => "rejected",
            Event::TransferDispatched { .. } => "dispatched",
            Event::TransferReceived { .. } => "received",
            Event::VarianceDetected { .. } => "variance",
        }
    }

    pub fn transfer_id(&self) -> Uuid {
        match self {
            Event::TransferCreated { transfer_id, .. }
            | Event::TransferApproved { transfer_id, .. }
            | Event::TransferRejected { transfer_id, .. }
            | Event::TransferDispatched { transfer_id, .. }
            | Event::TransferReceived { transfer_id, .. }
            | Event::VarianceDetected { transfer_id, .. } => *transfer_id,
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            Event::TransferCreated {
                transfer_number,
                source_outlet_id,
                destination_outlet_id,
                requested_by,
                ..
            } => json!({
                "transfer_number": transfer_number,
                "source_outlet_id": source_outlet_id,
                "destination_outlet_id": destination_outlet_id,
                "requested_by": requested_by,
            }),
            Event::TransferApproved { approved_by, .. } => json!({
                "approved_by": approved_by,
            }),
            Event::TransferRejected {
                reason, rejected_by, ..
            } => json!({
                "reason": reason,
                "rejected_by": rejected_by,
            }),
            Event::TransferDispatched { line_count, .. } => json!({
                "line_count": line_count,
            }),
            Event::TransferReceived {
                received_by,
                variance_count,
                ..
            } => json!({
                "received_by": received_by,
                "variance_count": variance_count,
            }),
            Event::VarianceDetected { alerts, .. } => json!({
                "alerts": alerts,
            }),
        }
    }
}

/// Cloneable handle for emitting events into the pipeline.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Emit an event, logging (not propagating) any failure. State
    /// transitions must never fail because the notification pipeline is
    /// down.
    pub async fn emit(&self, event: Event) {
        let event_type = event.event_type();
        let transfer_id = event.transfer_id();
        if let Err(e) = self.send(event).await {
            warn!(
                event_type,
                %transfer_id,
                error = %e,
                "failed to enqueue lifecycle event"
            );
        }
    }
}

/// Drains the event channel, renders each event into a notification and
/// hands it to the delivery collaborator. Runs until the channel closes.
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
    alert_roles: Vec<String>,
) {
    info!("event processor started");

    while let Some(event) = receiver.recv().await {
        let recipient_roles = match &event {
            Event::VarianceDetected { .. } => alert_roles.clone(),
            _ => Vec::new(),
        };

        let notification = TransferNotification {
            event_type: event.event_type().to_string(),
            transfer_id: event.transfer_id(),
            payload: event.payload(),
            recipient_roles,
        };

        if let Err(e) = notifier.notify(notification).await {
            warn!(
                event_type = event.event_type(),
                transfer_id = %event.transfer_id(),
                error = %e,
                "notification delivery failed"
            );
        }
    }

    info!("event processor stopped");
}
