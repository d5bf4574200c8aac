use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "REMOVED")]
    Removed,
}

/// Link between a lot and a pen. Rows are never deleted; a quantity change
/// retires the row (REMOVED) and inserts a replacement.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "lot_pen_allocations")]
#[schema(as = LotPenAllocation)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub lot_id: Uuid,
    pub pen_id: Uuid,
    pub quantity: i32,
    /// Share of the lot's current head count at allocation time
    pub percentage_of_lot: f64,
    /// Share of the pen's capacity at allocation time
    pub percentage_of_pen: f64,
    pub allocation_date: DateTime<Utc>,
    pub status: AllocationStatus,
    pub removal_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cattle_lot::Entity",
        from = "Column::LotId",
        to = "super::cattle_lot::Column::Id"
    )]
    CattleLot,
    #[sea_orm(
        belongs_to = "super::pen::Entity",
        from = "Column::PenId",
        to = "super::pen::Column::Id"
    )]
    Pen,
}

impl Related<super::cattle_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CattleLot.def()
    }
}

impl Related<super::pen::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pen.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}
