//! Pen and lot capacity counters.
//!
//! `pens.occupied_quantity` and `cattle_lots.allocated_quantity` are materialized
//! sums of ACTIVE allocations. Every change to them goes through a single
//! conditional `UPDATE` whose `WHERE` clause re-checks the limit, so two
//! transactions that both passed a read-time check cannot both commit.

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    cattle_lot, lot_pen_allocation, pen, AllocationStatus, CattleLot, LotPenAllocation, Pen,
    PenStatus,
};
use crate::errors::ServiceError;
use crate::events::Event;

/// Capacity snapshot of one pen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PenOccupancy {
    pub pen_id: Uuid,
    pub capacity: i32,
    pub occupied: i32,
    pub available: i32,
}

/// Comparison of a pen's counter with the allocation rows behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PenAudit {
    pub pen_id: Uuid,
    pub capacity: i32,
    pub occupied_quantity: i32,
    pub active_total: i32,
}

impl PenAudit {
    pub fn is_consistent(&self) -> bool {
        self.occupied_quantity == self.active_total && self.active_total <= self.capacity
    }
}

/// A pen status that moved as a result of an occupancy change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub pen_id: Uuid,
    pub old_status: PenStatus,
    pub new_status: PenStatus,
}

impl From<StatusChange> for Event {
    fn from(change: StatusChange) -> Self {
        Event::PenStatusChanged {
            pen_id: change.pen_id,
            old_status: change.old_status,
            new_status: change.new_status,
        }
    }
}

pub struct CapacityLedger;

impl CapacityLedger {
    pub async fn occupancy<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
    ) -> Result<PenOccupancy, ServiceError> {
        let pen = load_pen(conn, pen_id).await?;
        Ok(PenOccupancy {
            pen_id,
            capacity: pen.capacity,
            occupied: pen.occupied_quantity,
            available: pen.available_space(),
        })
    }

    /// `occupied + requested <= capacity` at the time of the read.
    pub async fn can_allocate<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
        requested: i32,
    ) -> Result<bool, ServiceError> {
        let occupancy = Self::occupancy(conn, pen_id).await?;
        Ok(i64::from(occupancy.occupied) + i64::from(requested) <= i64::from(occupancy.capacity))
    }

    /// Adds `quantity` head to a pen if it still fits.
    pub async fn reserve<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = Pen::update_many()
            .col_expr(
                pen::Column::OccupiedQuantity,
                Expr::col(pen::Column::OccupiedQuantity).add(quantity),
            )
            .col_expr(pen::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pen::Column::Id.eq(pen_id))
            .filter(
                Expr::col(pen::Column::OccupiedQuantity)
                    .lte(Expr::col(pen::Column::Capacity).sub(quantity)),
            )
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            load_pen(conn, pen_id).await?;
            warn!(pen_id = %pen_id, quantity, "Pen capacity taken by a concurrent allocation");
            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                "pen {} no longer has room for {} head",
                pen_id, quantity
            )));
        }

        debug!(pen_id = %pen_id, quantity, "Reserved pen capacity");
        Ok(())
    }

    /// Removes `quantity` head from a pen's counter.
    pub async fn release<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = Pen::update_many()
            .col_expr(
                pen::Column::OccupiedQuantity,
                Expr::col(pen::Column::OccupiedQuantity).sub(quantity),
            )
            .col_expr(pen::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pen::Column::Id.eq(pen_id))
            .filter(pen::Column::OccupiedQuantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            load_pen(conn, pen_id).await?;
            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                "pen {} holds fewer than {} head",
                pen_id, quantity
            )));
        }

        debug!(pen_id = %pen_id, quantity, "Released pen capacity");
        Ok(())
    }

    /// Marks `quantity` head of a lot as placed, if that many are still unplaced.
    pub async fn reserve_lot<C: ConnectionTrait>(
        conn: &C,
        lot_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = CattleLot::update_many()
            .col_expr(
                cattle_lot::Column::AllocatedQuantity,
                Expr::col(cattle_lot::Column::AllocatedQuantity).add(quantity),
            )
            .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cattle_lot::Column::Id.eq(lot_id))
            .filter(
                Expr::col(cattle_lot::Column::AllocatedQuantity)
                    .lte(Expr::col(cattle_lot::Column::CurrentQuantity).sub(quantity)),
            )
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            load_lot(conn, lot_id).await?;
            warn!(lot_id = %lot_id, quantity, "Lot head taken by a concurrent allocation");
            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                "lot {} no longer has {} unallocated head",
                lot_id, quantity
            )));
        }

        Ok(())
    }

    pub async fn release_lot<C: ConnectionTrait>(
        conn: &C,
        lot_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ensure_positive(quantity)?;

        let result = CattleLot::update_many()
            .col_expr(
                cattle_lot::Column::AllocatedQuantity,
                Expr::col(cattle_lot::Column::AllocatedQuantity).sub(quantity),
            )
            .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cattle_lot::Column::Id.eq(lot_id))
            .filter(cattle_lot::Column::AllocatedQuantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            load_lot(conn, lot_id).await?;
            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                "lot {} has fewer than {} allocated head",
                lot_id, quantity
            )));
        }

        Ok(())
    }

    /// Sum of the pen's ACTIVE allocation rows.
    pub async fn active_allocation_total<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let rows = LotPenAllocation::find()
            .filter(lot_pen_allocation::Column::PenId.eq(pen_id))
            .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.iter().map(|a| a.quantity).sum())
    }

    /// Sum of the lot's ACTIVE allocation rows.
    pub async fn lot_allocation_total<C: ConnectionTrait>(
        conn: &C,
        lot_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let rows = LotPenAllocation::find()
            .filter(lot_pen_allocation::Column::LotId.eq(lot_id))
            .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.iter().map(|a| a.quantity).sum())
    }

    pub async fn audit_pen<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
    ) -> Result<PenAudit, ServiceError> {
        let pen = load_pen(conn, pen_id).await?;
        let active_total = Self::active_allocation_total(conn, pen_id).await?;
        let audit = PenAudit {
            pen_id,
            capacity: pen.capacity,
            occupied_quantity: pen.occupied_quantity,
            active_total,
        };
        if !audit.is_consistent() {
            warn!(
                pen_id = %pen_id,
                occupied = audit.occupied_quantity,
                active_total,
                capacity = audit.capacity,
                "Pen occupancy drift detected"
            );
        }
        Ok(audit)
    }

    /// Re-derives the pen status from its counter. Manual statuses are left alone.
    pub async fn sync_status<C: ConnectionTrait>(
        conn: &C,
        pen_id: Uuid,
    ) -> Result<Option<StatusChange>, ServiceError> {
        let pen = load_pen(conn, pen_id).await?;
        let derived = PenStatus::derive(pen.status, pen.occupied_quantity, pen.capacity);
        if derived == pen.status {
            return Ok(None);
        }

        Pen::update_many()
            .col_expr(pen::Column::Status, Expr::value(derived))
            .col_expr(pen::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pen::Column::Id.eq(pen_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        debug!(pen_id = %pen_id, old = ?pen.status, new = ?derived, "Pen status derived");
        Ok(Some(StatusChange {
            pen_id,
            old_status: pen.status,
            new_status: derived,
        }))
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

pub(crate) async fn load_pen<C: ConnectionTrait>(
    conn: &C,
    pen_id: Uuid,
) -> Result<pen::Model, ServiceError> {
    Pen::find_by_id(pen_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or(ServiceError::PenNotFound(pen_id))
}

pub(crate) async fn load_lot<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
) -> Result<cattle_lot::Model, ServiceError> {
    CattleLot::find_by_id(lot_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or(ServiceError::LotNotFound(lot_id))
}
