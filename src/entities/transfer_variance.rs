use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Coarse severity bucket derived from the monetary magnitude of a
/// variance at receipt time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VarianceSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Investigation status of a variance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VarianceStatus {
    Open,
    Investigating,
    Resolved,
    WriteOff,
}

impl VarianceStatus {
    /// Closed variances no longer count toward cross-variance risk
    /// signals and cannot be investigated further.
    pub fn is_closed(&self) -> bool {
        matches!(self, VarianceStatus::Resolved | VarianceStatus::WriteOff)
    }
}

/// Which catalog a variance's item belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Product,
    Packaging,
}

/// A quantity discrepancy discovered at receipt.
///
/// Created only when `variance != 0`; mutated only by the investigation
/// workflow; never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfer_variances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub line_item_id: Uuid,
    pub item_kind: String,
    pub item_id: Uuid,
    /// Destination outlet where the count happened.
    pub outlet_id: Uuid,
    pub expected_quantity: i32,
    pub received_quantity: i32,
    /// `expected - received`; positive is a shortage, negative an overage.
    pub variance: i32,
    /// Unit cost snapshot taken at receipt; later catalog changes do not
    /// rewrite historical variance values.
    pub unit_cost: Decimal,
    pub variance_value: Decimal,
    pub severity: String,
    pub status: String,
    pub reason: Option<String>,
    pub root_cause: Option<String>,
    pub corrective_action: Option<String>,
    pub reported_by: Uuid,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub resolved_at: Option<DateTimeUtc>,
}

impl Model {
    pub fn status(&self) -> VarianceStatus {
        self.status.parse().unwrap_or(VarianceStatus::Open)
    }

    pub fn severity(&self) -> VarianceSeverity {
        self.severity.parse().unwrap_or(VarianceSeverity::Low)
    }

    pub fn item_kind(&self) -> ItemKind {
        self.item_kind.parse().unwrap_or(ItemKind::Product)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transfer_request::Entity",
        from = "Column::TransferId",
        to = "super::transfer_request::Column::Id"
    )]
    Transfer,
}

impl Related<super::transfer_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transfer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
