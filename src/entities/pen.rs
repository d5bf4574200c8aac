use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenStatus {
    #[sea_orm(string_value = "AVAILABLE")]
    Available,
    #[sea_orm(string_value = "OCCUPIED")]
    Occupied,
    #[sea_orm(string_value = "MAINTENANCE")]
    Maintenance,
    #[sea_orm(string_value = "QUARANTINE")]
    Quarantine,
}

impl PenStatus {
    /// MAINTENANCE and QUARANTINE are set by operators and never derived from occupancy.
    pub fn is_manual(self) -> bool {
        matches!(self, PenStatus::Maintenance | PenStatus::Quarantine)
    }

    /// Status a pen should carry for the given occupancy.
    pub fn derive(current: PenStatus, occupied: i32, capacity: i32) -> PenStatus {
        if current.is_manual() {
            current
        } else if occupied >= capacity {
            PenStatus::Occupied
        } else {
            PenStatus::Available
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenType {
    #[sea_orm(string_value = "RECEPTION")]
    Reception,
    #[sea_orm(string_value = "FATTENING")]
    Fattening,
    #[sea_orm(string_value = "QUARANTINE")]
    Quarantine,
    #[sea_orm(string_value = "HOSPITAL")]
    Hospital,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "pens")]
#[schema(as = Pen)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub pen_number: String,
    pub capacity: i32,
    /// Sum of ACTIVE allocations in this pen, guarded against `capacity`
    pub occupied_quantity: i32,
    pub status: PenStatus,
    pub pen_type: PenType,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lot_pen_allocation::Entity")]
    Allocations,
}

impl Related<super::lot_pen_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn available_space(&self) -> i32 {
        (self.capacity - self.occupied_quantity).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PenStatus::Available, 0, 80, PenStatus::Available)]
    #[case(PenStatus::Available, 79, 80, PenStatus::Available)]
    #[case(PenStatus::Available, 80, 80, PenStatus::Occupied)]
    #[case(PenStatus::Occupied, 30, 80, PenStatus::Available)]
    #[case(PenStatus::Occupied, 0, 80, PenStatus::Available)]
    #[case(PenStatus::Maintenance, 0, 80, PenStatus::Maintenance)]
    #[case(PenStatus::Quarantine, 80, 80, PenStatus::Quarantine)]
    fn derives_status_from_occupancy(
        #[case] current: PenStatus,
        #[case] occupied: i32,
        #[case] capacity: i32,
        #[case] expected: PenStatus,
    ) {
        assert_eq!(PenStatus::derive(current, occupied, capacity), expected);
    }
}
