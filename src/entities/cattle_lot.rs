use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a lot: PENDING on purchase, ACTIVE once received, SOLD or CLOSED at the end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "SOLD")]
    Sold,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

impl LotStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LotStatus::Sold | LotStatus::Closed)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "cattle_lots")]
#[schema(as = CattleLot)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub lot_code: String,

    /// Head count bought
    pub entry_quantity: i32,
    /// Head count still in the feedlot
    pub current_quantity: i32,
    pub death_count: i32,
    pub sold_quantity: i32,
    /// Sum of the lot's ACTIVE allocations
    pub allocated_quantity: i32,

    /// Total live weight at entry, in kg
    #[sea_orm(column_type = "Decimal(Some((16, 3)))")]
    pub entry_weight: Decimal,

    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub acquisition_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub feed_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub health_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub operational_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub freight_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub other_costs: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub total_cost: Decimal,

    pub entry_date: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub status: LotStatus,
    pub vendor_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lot_pen_allocation::Entity")]
    Allocations,
    #[sea_orm(has_many = "super::lot_movement::Entity")]
    Movements,
    #[sea_orm(has_many = "super::weight_reading::Entity")]
    WeightReadings,
}

impl Related<super::lot_pen_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl Related<super::lot_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

impl Related<super::weight_reading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WeightReadings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Head that are in the lot but not placed in any pen.
    pub fn unallocated_quantity(&self) -> i32 {
        self.current_quantity - self.allocated_quantity
    }
}
