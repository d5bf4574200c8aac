use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NonCashExpenseType {
    #[sea_orm(string_value = "MORTALITY")]
    Mortality,
    #[sea_orm(string_value = "WEIGHT_LOSS")]
    WeightLoss,
}

/// Economic loss recorded for reporting. Never added to the lot's `total_cost`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "non_cash_expenses")]
#[schema(as = NonCashExpense)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub lot_id: Uuid,
    pub expense_type: NonCashExpenseType,
    pub quantity: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub total_value: Decimal,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
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
