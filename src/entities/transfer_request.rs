use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a transfer request.
///
/// `Completed` is the happy-path terminal state (no variance);
/// `Received` marks completion with at least one open variance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Completed,
    Received,
    Rejected,
    Cancelled,
}

impl TransferStatus {
    /// Terminal statuses are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Rejected | TransferStatus::Cancelled
        )
    }

    /// Statuses from which the transfer may still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::Approved)
    }

    /// True once ledger movements exist for this transfer.
    pub fn has_ledger_entries(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Received)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfer_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-readable sequence number, e.g. `TRF-20260214-3f9a2c`.
    #[sea_orm(unique)]
    pub transfer_number: String,
    pub source_outlet_id: Uuid,
    pub destination_outlet_id: Uuid,
    pub status: String,
    pub notes: Option<String>,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub received_by: Option<Uuid>,
    pub cancelled_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub requested_at: DateTimeUtc,
    pub approved_at: Option<DateTimeUtc>,
    pub dispatched_at: Option<DateTimeUtc>,
    pub received_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn status(&self) -> TransferStatus {
        // An unparseable status is a data corruption bug; treat as pending
        // rather than panicking in a read path.
        self.status.parse().unwrap_or(TransferStatus::Pending)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transfer_line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::transfer_packaging_line_item::Entity")]
    PackagingLineItems,
    #[sea_orm(has_many = "super::transfer_variance::Entity")]
    Variances,
}

impl Related<super::transfer_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::transfer_packaging_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackagingLineItems.def()
    }
}

impl Related<super::transfer_variance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Variances.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
