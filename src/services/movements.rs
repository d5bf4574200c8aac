use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{lot_movement, LotMovement, MovementType};
use crate::errors::ServiceError;

/// A movement about to be appended to the audit log
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub lot_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reason: String,
    pub user_id: String,
    pub from_pen_id: Option<Uuid>,
    pub to_pen_id: Option<Uuid>,
}

impl NewMovement {
    pub fn new(
        lot_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
        reason: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            lot_id,
            movement_type,
            quantity,
            reason: reason.into(),
            user_id: user_id.into(),
            from_pen_id: None,
            to_pen_id: None,
        }
    }

    pub fn from_pen(mut self, pen_id: Uuid) -> Self {
        self.from_pen_id = Some(pen_id);
        self
    }

    pub fn to_pen(mut self, pen_id: Uuid) -> Self {
        self.to_pen_id = Some(pen_id);
        self
    }
}

/// Append-only writer and reader of `lot_movements`.
pub struct MovementRecorder;

impl MovementRecorder {
    pub async fn record<C: ConnectionTrait>(
        conn: &C,
        movement: NewMovement,
    ) -> Result<lot_movement::Model, ServiceError> {
        if movement.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "movement quantity must be positive".to_string(),
            ));
        }

        let row = lot_movement::ActiveModel {
            lot_id: Set(movement.lot_id),
            from_pen_id: Set(movement.from_pen_id),
            to_pen_id: Set(movement.to_pen_id),
            movement_type: Set(movement.movement_type),
            quantity: Set(movement.quantity),
            reason: Set(movement.reason),
            user_id: Set(movement.user_id),
            movement_date: Set(Utc::now()),
            ..Default::default()
        };

        let saved = row.insert(conn).await.map_err(ServiceError::db_error)?;
        debug!(
            movement_id = saved.id,
            lot_id = %saved.lot_id,
            movement_type = ?saved.movement_type,
            quantity = saved.quantity,
            "Movement recorded"
        );
        Ok(saved)
    }

    /// Appends the movements in order, so their ids follow the input order.
    pub async fn record_many<C: ConnectionTrait>(
        conn: &C,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<lot_movement::Model>, ServiceError> {
        let mut saved = Vec::with_capacity(movements.len());
        for movement in movements {
            saved.push(Self::record(conn, movement).await?);
        }
        Ok(saved)
    }

    /// Newest first.
    pub async fn history<C: ConnectionTrait>(
        conn: &C,
        lot_id: Uuid,
        limit: u64,
    ) -> Result<Vec<lot_movement::Model>, ServiceError> {
        LotMovement::find()
            .filter(lot_movement::Column::LotId.eq(lot_id))
            .order_by_desc(lot_movement::Column::Id)
            .limit(limit)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }
}
