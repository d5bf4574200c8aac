use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::calculations::share_percentage;
use crate::db::DatabaseAccess;
use crate::entities::{
    cattle_lot, lot_pen_allocation, pen, AllocationStatus, LotPenAllocation, Pen, PenStatus,
    PenType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::capacity::{load_pen, CapacityLedger, StatusChange};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePenInput {
    #[validate(length(min = 1, max = 50))]
    pub pen_number: String,
    #[validate(range(min = 1))]
    pub capacity: i32,
    pub pen_type: PenType,
    #[validate(length(max = 255))]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePenInput {
    #[validate(length(min = 1, max = 50))]
    pub pen_number: Option<String>,
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub pen_type: Option<PenType>,
}

/// One lot's share of a pen
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PenLotOccupancy {
    pub allocation_id: Uuid,
    pub lot_id: Uuid,
    pub lot_code: String,
    pub quantity: i32,
    pub percentage_of_pen: f64,
    pub allocation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PenOccupancyView {
    pub pen_id: Uuid,
    pub pen_number: String,
    pub status: PenStatus,
    pub capacity: i32,
    pub occupied: i32,
    pub available: i32,
    /// Occupied share of capacity, in percent
    pub occupation_rate: f64,
    pub lots: Vec<PenLotOccupancy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PenStats {
    pub total_pens: u64,
    pub active_pens: u64,
    pub available: u64,
    pub occupied: u64,
    pub maintenance: u64,
    pub quarantine: u64,
    pub total_capacity: i64,
    pub total_occupied: i64,
    pub free_space: i64,
    pub occupation_rate: f64,
}

/// Pen registry and status rules
#[derive(Clone)]
pub struct PenService {
    db: DatabaseAccess,
    event_sender: EventSender,
}

impl PenService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db: DatabaseAccess::new(db_pool),
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_pen(&self, input: CreatePenInput) -> Result<pen::Model, ServiceError> {
        input.validate()?;
        let pool = self.db.pool();
        self.ensure_number_free(&input.pen_number, None).await?;

        let now = Utc::now();
        let pen = pen::ActiveModel {
            id: Set(Uuid::new_v4()),
            pen_number: Set(input.pen_number),
            capacity: Set(input.capacity),
            occupied_quantity: Set(0),
            status: Set(PenStatus::Available),
            pen_type: Set(input.pen_type),
            location: Set(input.location),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool)
        .await
        .map_err(ServiceError::db_error)?;

        info!(
            pen_id = %pen.id,
            pen_number = %pen.pen_number,
            capacity = pen.capacity,
            "Pen created"
        );
        Ok(pen)
    }

    /// Updates pen attributes. Capacity cannot drop below the current occupancy.
    #[instrument(skip(self))]
    pub async fn update_pen(
        &self,
        pen_id: Uuid,
        input: UpdatePenInput,
    ) -> Result<pen::Model, ServiceError> {
        input.validate()?;
        if let Some(number) = &input.pen_number {
            self.ensure_number_free(number, Some(pen_id)).await?;
        }

        let (pen, change) = self
            .db
            .transaction("update_pen", move |txn| {
                Box::pin(async move {
                    let current = load_pen(txn, pen_id).await?;

                    if let Some(capacity) = input.capacity {
                        if capacity < current.occupied_quantity {
                            return Err(ServiceError::ValidationError(format!(
                                "capacity {} is below the {} head in pen {}",
                                capacity, current.occupied_quantity, current.pen_number
                            )));
                        }
                        let result = Pen::update_many()
                            .col_expr(pen::Column::Capacity, Expr::value(capacity))
                            .filter(pen::Column::Id.eq(pen_id))
                            .filter(pen::Column::OccupiedQuantity.lte(capacity))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        if result.rows_affected == 0 {
                            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                                "pen {} filled up while its capacity was being changed",
                                pen_id
                            )));
                        }
                    }

                    let mut active: pen::ActiveModel = load_pen(txn, pen_id).await?.into();
                    if let Some(number) = input.pen_number {
                        active.pen_number = Set(number);
                    }
                    if let Some(location) = input.location {
                        active.location = Set(Some(location));
                    }
                    if let Some(pen_type) = input.pen_type {
                        active.pen_type = Set(pen_type);
                    }
                    active.updated_at = Set(Utc::now());
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let change = CapacityLedger::sync_status(txn, pen_id).await?;
                    Ok((load_pen(txn, pen_id).await?, change))
                })
            })
            .await?;

        info!(pen_id = %pen_id, capacity = pen.capacity, "Pen updated");
        self.publish_change(change).await;
        Ok(pen)
    }

    /// Sets an operator status. MAINTENANCE and QUARANTINE need an empty pen;
    /// AVAILABLE and OCCUPIED are normalised to what the occupancy implies.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        pen_id: Uuid,
        status: PenStatus,
    ) -> Result<pen::Model, ServiceError> {
        let (pen, change) = self
            .db
            .transaction("update_pen_status", move |txn| {
                Box::pin(async move {
                    let current = load_pen(txn, pen_id).await?;
                    if status.is_manual() && current.occupied_quantity > 0 {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Pen {} holds {} head and cannot be set to {:?}",
                            current.pen_number, current.occupied_quantity, status
                        )));
                    }

                    let target = if status.is_manual() {
                        status
                    } else {
                        PenStatus::derive(status, current.occupied_quantity, current.capacity)
                    };

                    let mut update = Pen::update_many()
                        .col_expr(pen::Column::Status, Expr::value(target))
                        .col_expr(pen::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(pen::Column::Id.eq(pen_id));
                    if target.is_manual() {
                        update = update.filter(pen::Column::OccupiedQuantity.eq(0));
                    }
                    let result = update.exec(txn).await.map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentAllocationConflict(format!(
                            "pen {} received animals while its status was being changed",
                            pen_id
                        )));
                    }

                    let change = (target != current.status).then_some(StatusChange {
                        pen_id,
                        old_status: current.status,
                        new_status: target,
                    });
                    Ok((load_pen(txn, pen_id).await?, change))
                })
            })
            .await?;

        info!(pen_id = %pen_id, status = ?pen.status, "Pen status updated");
        self.publish_change(change).await;
        Ok(pen)
    }

    /// Takes an empty pen out of service.
    #[instrument(skip(self))]
    pub async fn deactivate_pen(&self, pen_id: Uuid) -> Result<pen::Model, ServiceError> {
        let pool = self.db.pool();
        let pen = load_pen(pool, pen_id).await?;
        if pen.occupied_quantity > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Pen {} still holds {} head",
                pen.pen_number, pen.occupied_quantity
            )));
        }

        let result = Pen::update_many()
            .col_expr(pen::Column::IsActive, Expr::value(false))
            .col_expr(pen::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(pen::Column::Id.eq(pen_id))
            .filter(pen::Column::OccupiedQuantity.eq(0))
            .exec(pool)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentAllocationConflict(format!(
                "pen {} received animals while being deactivated",
                pen_id
            )));
        }

        info!(pen_id = %pen_id, "Pen deactivated");
        load_pen(pool, pen_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_pen(&self, pen_id: Uuid) -> Result<pen::Model, ServiceError> {
        load_pen(self.db.pool(), pen_id).await
    }

    /// Pens ordered by number
    #[instrument(skip(self))]
    pub async fn list_pens(
        &self,
        status: Option<PenStatus>,
        active_only: bool,
    ) -> Result<Vec<pen::Model>, ServiceError> {
        let mut query = Pen::find();
        if let Some(status) = status {
            query = query.filter(pen::Column::Status.eq(status));
        }
        if active_only {
            query = query.filter(pen::Column::IsActive.eq(true));
        }
        query
            .order_by_asc(pen::Column::PenNumber)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Active, non-manual pens with at least `min_free` free places (1 by default).
    #[instrument(skip(self))]
    pub async fn find_available(
        &self,
        min_free: Option<i32>,
    ) -> Result<Vec<pen::Model>, ServiceError> {
        let min_free = min_free.unwrap_or(1).max(1);
        Pen::find()
            .filter(pen::Column::IsActive.eq(true))
            .filter(pen::Column::Status.eq(PenStatus::Available))
            .filter(
                Expr::col(pen::Column::OccupiedQuantity)
                    .lte(Expr::col(pen::Column::Capacity).sub(min_free)),
            )
            .order_by_asc(pen::Column::PenNumber)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn occupancy(&self, pen_id: Uuid) -> Result<PenOccupancyView, ServiceError> {
        let pool = self.db.pool();
        let pen = load_pen(pool, pen_id).await?;
        let rows = LotPenAllocation::find()
            .filter(lot_pen_allocation::Column::PenId.eq(pen_id))
            .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
            .order_by_asc(lot_pen_allocation::Column::AllocationDate)
            .find_also_related(cattle_lot::Entity)
            .all(pool)
            .await
            .map_err(ServiceError::db_error)?;

        let lots = rows
            .into_iter()
            .map(|(allocation, lot)| PenLotOccupancy {
                allocation_id: allocation.id,
                lot_id: allocation.lot_id,
                lot_code: lot.map(|l| l.lot_code).unwrap_or_default(),
                quantity: allocation.quantity,
                percentage_of_pen: allocation.percentage_of_pen,
                allocation_date: allocation.allocation_date,
            })
            .collect();

        Ok(PenOccupancyView {
            pen_id,
            pen_number: pen.pen_number.clone(),
            status: pen.status,
            capacity: pen.capacity,
            occupied: pen.occupied_quantity,
            available: pen.available_space(),
            occupation_rate: share_percentage(pen.occupied_quantity, pen.capacity),
            lots,
        })
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<PenStats, ServiceError> {
        let pens = Pen::find()
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(summarize(&pens))
    }

    async fn ensure_number_free(
        &self,
        pen_number: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Pen::find().filter(pen::Column::PenNumber.eq(pen_number));
        if let Some(id) = except {
            query = query.filter(pen::Column::Id.ne(id));
        }
        let taken = query
            .one(self.db.pool())
            .await
            .map_err(ServiceError::db_error)?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Pen number {} is already in use",
                pen_number
            )));
        }
        Ok(())
    }

    async fn publish_change(&self, change: Option<StatusChange>) {
        if let Some(change) = change {
            self.event_sender.publish(Event::from(change)).await;
        }
    }
}

fn summarize(pens: &[pen::Model]) -> PenStats {
    let mut stats = PenStats {
        total_pens: pens.len() as u64,
        ..Default::default()
    };
    for pen in pens {
        match pen.status {
            PenStatus::Available => stats.available += 1,
            PenStatus::Occupied => stats.occupied += 1,
            PenStatus::Maintenance => stats.maintenance += 1,
            PenStatus::Quarantine => stats.quarantine += 1,
        }
        if pen.is_active {
            stats.active_pens += 1;
            stats.total_capacity += i64::from(pen.capacity);
            stats.total_occupied += i64::from(pen.occupied_quantity);
        }
    }
    stats.free_space = stats.total_capacity - stats.total_occupied;
    stats.occupation_rate = if stats.total_capacity == 0 {
        0.0
    } else {
        stats.total_occupied as f64 / stats.total_capacity as f64 * 100.0
    };
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pen(status: PenStatus, capacity: i32, occupied: i32, is_active: bool) -> pen::Model {
        let now = Utc::now();
        pen::Model {
            id: Uuid::new_v4(),
            pen_number: "P-01".into(),
            capacity,
            occupied_quantity: occupied,
            status,
            pen_type: PenType::Fattening,
            location: None,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stats_count_statuses_and_active_space() {
        let pens = vec![
            pen(PenStatus::Available, 100, 25, true),
            pen(PenStatus::Occupied, 50, 50, true),
            pen(PenStatus::Maintenance, 30, 0, true),
            pen(PenStatus::Available, 40, 0, false),
        ];
        let stats = summarize(&pens);
        assert_eq!(stats.total_pens, 4);
        assert_eq!(stats.active_pens, 3);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.occupied, 1);
        assert_eq!(stats.maintenance, 1);
        assert_eq!(stats.total_capacity, 180);
        assert_eq!(stats.total_occupied, 75);
        assert_eq!(stats.free_space, 105);
        assert!((stats.occupation_rate - 41.666).abs() < 0.01);
    }

    #[test]
    fn stats_of_no_pens_are_zero() {
        assert_eq!(summarize(&[]), PenStats::default());
    }
}
