use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A packaging-material line on a transfer request.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfer_packaging_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub packaging_material_id: Uuid,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub received_quantity: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transfer_request::Entity",
        from = "Column::TransferId",
        to = "super::transfer_request::Column::Id"
    )]
    Transfer,
    #[sea_orm(
        belongs_to = "super::packaging_material::Entity",
        from = "Column::PackagingMaterialId",
        to = "super::packaging_material::Column::Id"
    )]
    PackagingMaterial,
}

impl Related<super::transfer_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transfer.def()
    }
}

impl Related<super::packaging_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackagingMaterial.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
