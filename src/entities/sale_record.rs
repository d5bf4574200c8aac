use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sale_records")]
#[schema(as = SaleRecord)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub lot_id: Uuid,
    pub pen_id: Option<Uuid>,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 3)))")]
    pub total_weight: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub price_per_arroba: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 2)))")]
    pub total_value: Decimal,
    pub buyer_name: Option<String>,
    pub sale_date: DateTime<Utc>,
    pub recorded_by: String,
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
