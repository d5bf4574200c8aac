use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::calculations::share_percentage;
use crate::db::DatabaseAccess;
use crate::entities::{
    cattle_lot, lot_movement, lot_pen_allocation, pen, AllocationStatus, LotPenAllocation,
    LotStatus, MovementType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::capacity::{load_lot, load_pen, CapacityLedger, StatusChange};
use crate::services::movements::{MovementRecorder, NewMovement};

/// Head of a lot to place in one pen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PenAllocationRequest {
    pub pen_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    pub from_pen_id: Uuid,
    pub to_pen_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferOutcome {
    /// What is left of the lot in the source pen, if anything
    pub source: Option<lot_pen_allocation::Model>,
    pub target: lot_pen_allocation::Model,
    pub movement: lot_movement::Model,
}

/// Rows written by an allocation batch, plus the pen statuses it moved.
#[derive(Debug, Clone)]
pub(crate) struct AllocationOutcome {
    pub allocations: Vec<lot_pen_allocation::Model>,
    pub status_changes: Vec<StatusChange>,
}

impl AllocationOutcome {
    pub(crate) fn events(&self, lot_id: Uuid) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.status_changes.len() + 1);
        if !self.allocations.is_empty() {
            events.push(Event::LotAllocated {
                lot_id,
                allocations: self.allocations.iter().map(|a| a.id).collect(),
                quantity: self.allocations.iter().map(|a| a.quantity).sum(),
            });
        }
        events.extend(self.status_changes.iter().copied().map(Event::from));
        events
    }
}

/// Places lots into pens and moves them between pens.
#[derive(Clone)]
pub struct AllocationService {
    db: DatabaseAccess,
    event_sender: EventSender,
}

impl AllocationService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db: DatabaseAccess::new(db_pool),
            event_sender,
        }
    }

    /// Allocates head of a lot across one or more pens. All or nothing.
    #[instrument(skip(self, requests), fields(pens = requests.len()))]
    pub async fn allocate(
        &self,
        lot_id: Uuid,
        requests: Vec<PenAllocationRequest>,
        user_id: &str,
    ) -> Result<Vec<lot_pen_allocation::Model>, ServiceError> {
        let user_id = user_id.to_string();
        let outcome = self
            .db
            .transaction("allocate_lot", move |txn| {
                Box::pin(async move { allocate_in_txn(txn, lot_id, requests, &user_id).await })
            })
            .await?;

        info!(
            lot_id = %lot_id,
            allocations = outcome.allocations.len(),
            "Lot allocated to pens"
        );
        for event in outcome.events(lot_id) {
            self.event_sender.publish(event).await;
        }
        Ok(outcome.allocations)
    }

    /// Retires an ACTIVE allocation and frees its pen space.
    #[instrument(skip(self))]
    pub async fn remove_allocation(
        &self,
        allocation_id: Uuid,
        reason: &str,
        user_id: &str,
    ) -> Result<lot_pen_allocation::Model, ServiceError> {
        let reason = reason.to_string();
        let user_id = user_id.to_string();
        let (removed, change) = self
            .db
            .transaction("remove_allocation", move |txn| {
                Box::pin(async move {
                    let allocation = LotPenAllocation::find_by_id(allocation_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Allocation {}", allocation_id))
                        })?;
                    if !allocation.is_active() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Allocation {} is already removed",
                            allocation_id
                        )));
                    }

                    let now = Utc::now();
                    retire_allocation(txn, &allocation, now).await?;
                    CapacityLedger::release(txn, allocation.pen_id, allocation.quantity).await?;
                    CapacityLedger::release_lot(txn, allocation.lot_id, allocation.quantity)
                        .await?;
                    let change = CapacityLedger::sync_status(txn, allocation.pen_id).await?;

                    MovementRecorder::record(
                        txn,
                        NewMovement::new(
                            allocation.lot_id,
                            MovementType::Removal,
                            allocation.quantity,
                            reason,
                            user_id,
                        )
                        .from_pen(allocation.pen_id),
                    )
                    .await?;

                    let removed = lot_pen_allocation::Model {
                        status: AllocationStatus::Removed,
                        removal_date: Some(now),
                        ..allocation
                    };
                    Ok((removed, change))
                })
            })
            .await?;

        info!(allocation_id = %allocation_id, lot_id = %removed.lot_id, "Allocation removed");
        self.event_sender
            .publish(Event::AllocationRemoved {
                allocation_id,
                lot_id: removed.lot_id,
                pen_id: removed.pen_id,
                quantity: removed.quantity,
            })
            .await;
        if let Some(change) = change {
            self.event_sender.publish(change.into()).await;
        }
        Ok(removed)
    }

    /// Moves head of one lot from one pen to another.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        lot_id: Uuid,
        request: TransferRequest,
        user_id: &str,
    ) -> Result<TransferOutcome, ServiceError> {
        request.validate()?;
        if request.from_pen_id == request.to_pen_id {
            return Err(ServiceError::ValidationError(
                "source and target pen must differ".to_string(),
            ));
        }

        let user_id = user_id.to_string();
        let (outcome, changes) = self
            .db
            .transaction("transfer_animals", move |txn| {
                Box::pin(async move { transfer_in_txn(txn, lot_id, request, &user_id).await })
            })
            .await?;

        info!(
            lot_id = %lot_id,
            quantity = outcome.movement.quantity,
            "Animals transferred between pens"
        );
        self.event_sender
            .publish(Event::AnimalsTransferred {
                lot_id,
                from_pen_id: outcome.movement.from_pen_id.unwrap_or_default(),
                to_pen_id: outcome.target.pen_id,
                quantity: outcome.movement.quantity,
            })
            .await;
        for change in changes {
            self.event_sender.publish(change.into()).await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn allocations_for_lot(
        &self,
        lot_id: Uuid,
        include_removed: bool,
    ) -> Result<Vec<lot_pen_allocation::Model>, ServiceError> {
        let mut query =
            LotPenAllocation::find().filter(lot_pen_allocation::Column::LotId.eq(lot_id));
        if !include_removed {
            query = query.filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active));
        }
        query
            .order_by_asc(lot_pen_allocation::Column::CreatedAt)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }

    /// ACTIVE allocations of a pen
    #[instrument(skip(self))]
    pub async fn allocations_for_pen(
        &self,
        pen_id: Uuid,
    ) -> Result<Vec<lot_pen_allocation::Model>, ServiceError> {
        active_in_pen(self.db.pool(), pen_id).await
    }
}

/// Allocation body shared by `allocate` and lot reception.
pub(crate) async fn allocate_in_txn<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    requests: Vec<PenAllocationRequest>,
    user_id: &str,
) -> Result<AllocationOutcome, ServiceError> {
    let merged = merge_requests(requests)?;

    let lot = load_lot(conn, lot_id).await?;
    if lot.status != LotStatus::Active {
        return Err(ServiceError::InvalidOperation(format!(
            "Lot {} is {:?}; only ACTIVE lots can be allocated",
            lot.lot_code, lot.status
        )));
    }

    let already_allocated = CapacityLedger::lot_allocation_total(conn, lot_id).await?;
    let to_allocate: i64 = merged.iter().map(|(_, q)| i64::from(*q)).sum();
    if i64::from(already_allocated) + to_allocate > i64::from(lot.current_quantity) {
        return Err(ServiceError::InsufficientLotQuantity {
            lot_id,
            requested: i32::try_from(to_allocate).unwrap_or(i32::MAX),
            available: lot.current_quantity - already_allocated,
        });
    }

    let mut pens = Vec::with_capacity(merged.len());
    for (pen_id, quantity) in &merged {
        let pen = load_pen(conn, *pen_id).await?;
        ensure_pen_accepts_animals(&pen)?;
        if !CapacityLedger::can_allocate(conn, pen.id, *quantity).await? {
            return Err(ServiceError::CapacityExceeded {
                pen_id: *pen_id,
                requested: *quantity,
                available: pen.available_space(),
            });
        }
        pens.push((pen, *quantity));
    }

    // Counters first: a lost race fails here before any row is written.
    CapacityLedger::reserve_lot(conn, lot_id, to_allocate as i32).await?;
    for (pen, quantity) in &pens {
        CapacityLedger::reserve(conn, pen.id, *quantity).await?;
    }

    let now = Utc::now();
    let mut allocations = Vec::with_capacity(pens.len());
    let mut status_changes = Vec::new();
    let mut movements = Vec::with_capacity(pens.len());
    for (pen, quantity) in &pens {
        let allocation =
            insert_allocation(conn, lot_id, pen, *quantity, lot.current_quantity, now).await?;
        allocations.push(allocation);
        if let Some(change) = CapacityLedger::sync_status(conn, pen.id).await? {
            status_changes.push(change);
        }
        movements.push(
            NewMovement::new(
                lot_id,
                MovementType::Allocation,
                *quantity,
                format!("Allocated to pen {}", pen.pen_number),
                user_id,
            )
            .to_pen(pen.id),
        );
    }
    MovementRecorder::record_many(conn, movements).await?;

    Ok(AllocationOutcome {
        allocations,
        status_changes,
    })
}

async fn transfer_in_txn<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    request: TransferRequest,
    user_id: &str,
) -> Result<(TransferOutcome, Vec<StatusChange>), ServiceError> {
    let lot = load_lot(conn, lot_id).await?;
    if lot.status != LotStatus::Active {
        return Err(ServiceError::InvalidOperation(format!(
            "Lot {} is {:?}; only ACTIVE lots can be transferred",
            lot.lot_code, lot.status
        )));
    }

    load_pen(conn, request.from_pen_id).await?;
    let target_pen = load_pen(conn, request.to_pen_id).await?;
    ensure_pen_accepts_animals(&target_pen)?;
    if !CapacityLedger::can_allocate(conn, target_pen.id, request.quantity).await? {
        return Err(ServiceError::CapacityExceeded {
            pen_id: target_pen.id,
            requested: request.quantity,
            available: target_pen.available_space(),
        });
    }

    let now = Utc::now();
    let source = withdraw_from_pen(
        conn,
        &lot,
        request.from_pen_id,
        request.quantity,
        lot.current_quantity,
        now,
    )
    .await?;

    CapacityLedger::reserve(conn, target_pen.id, request.quantity).await?;
    let existing = active_for(conn, lot_id, target_pen.id).await?;
    let mut merged_quantity = request.quantity;
    for row in &existing {
        retire_allocation(conn, row, now).await?;
        merged_quantity += row.quantity;
    }
    let target = insert_allocation(
        conn,
        lot_id,
        &target_pen,
        merged_quantity,
        lot.current_quantity,
        now,
    )
    .await?;

    let mut changes = Vec::new();
    for pen_id in [request.from_pen_id, request.to_pen_id] {
        if let Some(change) = CapacityLedger::sync_status(conn, pen_id).await? {
            changes.push(change);
        }
    }

    let movement = MovementRecorder::record(
        conn,
        NewMovement::new(
            lot_id,
            MovementType::Transfer,
            request.quantity,
            request.reason,
            user_id,
        )
        .from_pen(request.from_pen_id)
        .to_pen(request.to_pen_id),
    )
    .await?;

    Ok((
        TransferOutcome {
            source,
            target,
            movement,
        },
        changes,
    ))
}

/// Takes `quantity` head of `lot` out of a pen.
///
/// The lot's ACTIVE rows in that pen are retired and, when head remain, replaced
/// by one row holding the remainder with percentages computed against
/// `lot_current`. The pen counter is released; the lot counter is left to the
/// caller.
pub(crate) async fn withdraw_from_pen<C: ConnectionTrait>(
    conn: &C,
    lot: &cattle_lot::Model,
    pen_id: Uuid,
    quantity: i32,
    lot_current: i32,
    now: DateTime<Utc>,
) -> Result<Option<lot_pen_allocation::Model>, ServiceError> {
    let rows = active_for(conn, lot.id, pen_id).await?;
    let in_pen: i32 = rows.iter().map(|a| a.quantity).sum();
    if in_pen < quantity {
        return Err(ServiceError::InsufficientLotQuantity {
            lot_id: lot.id,
            requested: quantity,
            available: in_pen,
        });
    }

    for row in &rows {
        retire_allocation(conn, row, now).await?;
    }
    CapacityLedger::release(conn, pen_id, quantity).await?;

    let remaining = in_pen - quantity;
    if remaining == 0 {
        return Ok(None);
    }
    let pen = load_pen(conn, pen_id).await?;
    let replacement = insert_allocation(conn, lot.id, &pen, remaining, lot_current, now).await?;
    Ok(Some(replacement))
}

/// Flips an ACTIVE row to REMOVED. Fails if another writer got there first.
pub(crate) async fn retire_allocation<C: ConnectionTrait>(
    conn: &C,
    allocation: &lot_pen_allocation::Model,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let result = LotPenAllocation::update_many()
        .col_expr(
            lot_pen_allocation::Column::Status,
            Expr::value(AllocationStatus::Removed),
        )
        .col_expr(lot_pen_allocation::Column::RemovalDate, Expr::value(Some(now)))
        .filter(lot_pen_allocation::Column::Id.eq(allocation.id))
        .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentAllocationConflict(format!(
            "allocation {} was changed by another request",
            allocation.id
        )));
    }
    Ok(())
}

async fn insert_allocation<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    pen: &pen::Model,
    quantity: i32,
    lot_current: i32,
    now: DateTime<Utc>,
) -> Result<lot_pen_allocation::Model, ServiceError> {
    lot_pen_allocation::ActiveModel {
        id: Set(Uuid::new_v4()),
        lot_id: Set(lot_id),
        pen_id: Set(pen.id),
        quantity: Set(quantity),
        percentage_of_lot: Set(share_percentage(quantity, lot_current)),
        percentage_of_pen: Set(share_percentage(quantity, pen.capacity)),
        allocation_date: Set(now),
        status: Set(AllocationStatus::Active),
        removal_date: Set(None),
        created_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

async fn active_for<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    pen_id: Uuid,
) -> Result<Vec<lot_pen_allocation::Model>, ServiceError> {
    LotPenAllocation::find()
        .filter(lot_pen_allocation::Column::LotId.eq(lot_id))
        .filter(lot_pen_allocation::Column::PenId.eq(pen_id))
        .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn active_in_pen<C: ConnectionTrait>(
    conn: &C,
    pen_id: Uuid,
) -> Result<Vec<lot_pen_allocation::Model>, ServiceError> {
    LotPenAllocation::find()
        .filter(lot_pen_allocation::Column::PenId.eq(pen_id))
        .filter(lot_pen_allocation::Column::Status.eq(AllocationStatus::Active))
        .order_by_asc(lot_pen_allocation::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn ensure_pen_accepts_animals(pen: &pen::Model) -> Result<(), ServiceError> {
    if !pen.is_active {
        return Err(ServiceError::InvalidOperation(format!(
            "Pen {} is inactive",
            pen.pen_number
        )));
    }
    if pen.status.is_manual() {
        return Err(ServiceError::InvalidOperation(format!(
            "Pen {} is under {:?}",
            pen.pen_number, pen.status
        )));
    }
    Ok(())
}

/// Validates a batch and folds repeated pens into one request, keeping first-seen order.
fn merge_requests(requests: Vec<PenAllocationRequest>) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    if requests.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one pen allocation is required".to_string(),
        ));
    }

    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(requests.len());
    for request in requests {
        if request.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for pen {} must be positive",
                request.pen_id
            )));
        }
        match merged.iter_mut().find(|(pen_id, _)| *pen_id == request.pen_id) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(request.quantity).ok_or_else(|| {
                    ServiceError::ValidationError("allocation quantity overflow".to_string())
                })?
            }
            None => merged.push((request.pen_id, request.quantity)),
        }
    }
    Ok(merged)
}
