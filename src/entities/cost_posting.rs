use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a posting was aimed at before it was spread over lots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostTarget {
    #[sea_orm(string_value = "LOT")]
    Lot,
    #[sea_orm(string_value = "PEN")]
    Pen,
    #[sea_orm(string_value = "GLOBAL")]
    Global,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostCategory {
    #[sea_orm(string_value = "FEED")]
    Feed,
    #[sea_orm(string_value = "HEALTH")]
    Health,
    #[sea_orm(string_value = "OPERATIONAL")]
    Operational,
    #[sea_orm(string_value = "FREIGHT")]
    Freight,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

impl CostCategory {
    /// Lot column that accumulates this category.
    pub fn lot_column(self) -> super::cattle_lot::Column {
        use super::cattle_lot::Column;
        match self {
            CostCategory::Feed => Column::FeedCost,
            CostCategory::Health => Column::HealthCost,
            CostCategory::Operational => Column::OperationalCost,
            CostCategory::Freight => Column::FreightCost,
            CostCategory::Other => Column::OtherCosts,
        }
    }
}

/// One share of a cost applied to one lot.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "cost_postings")]
#[schema(as = CostPosting)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Groups the rows produced by one split posting
    pub batch_id: Uuid,
    pub lot_id: Uuid,
    pub pen_id: Option<Uuid>,
    pub target: CostTarget,
    pub category: CostCategory,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub amount: Decimal,
    /// Share of the source amount, 100 for a direct lot posting
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub percentage: Decimal,
    pub description: Option<String>,
    pub posted_by: String,
    pub posted_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cattle_lot::Entity",
        from = "Column::LotId",
        to = "super::cattle_lot::Column::Id"
    )]
    CattleLot,
}

impl Related<super::cattle_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CattleLot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
