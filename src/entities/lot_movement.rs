use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    #[sea_orm(string_value = "ALLOCATION")]
    Allocation,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    #[sea_orm(string_value = "REMOVAL")]
    Removal,
    #[sea_orm(string_value = "MORTALITY")]
    Mortality,
    #[sea_orm(string_value = "SALE")]
    Sale,
}

/// Append-only audit record. The auto-increment id is the creation order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "lot_movements")]
#[schema(as = LotMovement)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub lot_id: Uuid,
    pub from_pen_id: Option<Uuid>,
    pub to_pen_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reason: String,
    pub user_id: String,
    pub movement_date: DateTime<Utc>,
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
