use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::calculations::{self, LotMetrics, DEFAULT_CARCASS_YIELD, MAX_MONEY, MAX_WEIGHT_KG};
use crate::db::DatabaseAccess;
use crate::entities::{
    cattle_lot, lot_movement, lot_pen_allocation, non_cash_expense, sale_record, weight_reading,
    CattleLot, LotStatus, MovementType, NonCashExpense, NonCashExpenseType, WeightReading,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::allocation::{allocate_in_txn, withdraw_from_pen, PenAllocationRequest};
use crate::services::capacity::{load_lot, CapacityLedger, StatusChange};
use crate::services::movements::{MovementRecorder, NewMovement};

const LOT_CODE_PREFIX: &str = "LOT-";

fn positive_weight(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    if *value > MAX_WEIGHT_KG {
        return Err(ValidationError::new("weight_out_of_range"));
    }
    Ok(())
}

fn positive_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    if *value > MAX_MONEY {
        return Err(ValidationError::new("amount_out_of_range"));
    }
    Ok(())
}

fn non_negative_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    if *value > MAX_MONEY {
        return Err(ValidationError::new("amount_out_of_range"));
    }
    Ok(())
}

fn amount_overflow(what: &str) -> ServiceError {
    ServiceError::ValidationError(format!("{} is too large to store", what))
}

/// A confirmed purchase entering the feedlot
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLotInput {
    #[validate(range(min = 1))]
    pub entry_quantity: i32,
    /// Purchase live weight, in kg
    #[validate(custom = "positive_weight")]
    pub entry_weight: Decimal,
    /// Overrides the arroba based price when given
    pub acquisition_cost: Option<Decimal>,
    pub price_per_arroba: Option<Decimal>,
    /// Carcass yield percentage, 50 when omitted
    pub carcass_yield: Option<Decimal>,
    #[serde(default)]
    #[validate(custom = "non_negative_money")]
    pub freight_cost: Decimal,
    #[serde(default)]
    #[validate(custom = "non_negative_money")]
    pub commission: Decimal,
    pub entry_date: Option<DateTime<Utc>>,
    #[validate(length(max = 255))]
    pub vendor_name: Option<String>,
    pub notes: Option<String>,
}

impl CreateLotInput {
    fn resolved_acquisition_cost(&self) -> Result<Decimal, ServiceError> {
        if let Some(cost) = self.acquisition_cost {
            if cost.is_sign_negative() {
                return Err(ServiceError::ValidationError(
                    "acquisition_cost must not be negative".to_string(),
                ));
            }
            if cost > MAX_MONEY {
                return Err(amount_overflow("acquisition_cost"));
            }
            return Ok(calculations::round_money(cost));
        }
        let price = self.price_per_arroba.ok_or_else(|| {
            ServiceError::ValidationError(
                "either acquisition_cost or price_per_arroba is required".to_string(),
            )
        })?;
        if price <= Decimal::ZERO || price > MAX_MONEY {
            return Err(ServiceError::ValidationError(
                "price_per_arroba must be positive and storable".to_string(),
            ));
        }
        let carcass_yield = self.carcass_yield.unwrap_or(DEFAULT_CARCASS_YIELD);
        if carcass_yield <= Decimal::ZERO || carcass_yield > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "carcass_yield must be within (0, 100]".to_string(),
            ));
        }
        calculations::acquisition_cost(self.entry_weight, carcass_yield, price)
            .ok_or_else(|| amount_overflow("acquisition cost"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReceiveLotInput {
    #[validate(range(min = 0))]
    pub received_quantity: i32,
    /// Weight on arrival, in kg
    #[validate(custom = "positive_weight")]
    pub received_weight: Decimal,
    pub received_at: Option<DateTime<Utc>>,
    /// Initial placement; must cover exactly the received head
    pub allocations: Option<Vec<PenAllocationRequest>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReceiveOutcome {
    pub lot: cattle_lot::Model,
    pub allocations: Vec<lot_pen_allocation::Model>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct MortalityInput {
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Pen the animals died in; omitted for unallocated head
    pub pen_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub cause: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SaleInput {
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub pen_id: Option<Uuid>,
    /// Total live weight sold, in kg
    #[validate(custom = "positive_weight")]
    pub total_weight: Decimal,
    #[validate(custom = "positive_price")]
    pub price_per_arroba: Decimal,
    #[validate(length(max = 255))]
    pub buyer_name: Option<String>,
    pub sale_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleOutcome {
    pub lot: cattle_lot::Model,
    pub sale: sale_record::Model,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WeightInput {
    #[validate(custom = "positive_weight")]
    pub total_weight: Decimal,
    #[validate(range(min = 1))]
    pub animal_count: i32,
    pub reading_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WeightLossInput {
    #[validate(custom = "positive_weight")]
    pub expected_weight: Decimal,
    #[validate(custom = "positive_weight")]
    pub actual_weight: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum HeadExit {
    Death,
    Sale,
}

impl HeadExit {
    fn counter(self) -> cattle_lot::Column {
        match self {
            HeadExit::Death => cattle_lot::Column::DeathCount,
            HeadExit::Sale => cattle_lot::Column::SoldQuantity,
        }
    }

    fn movement_type(self) -> MovementType {
        match self {
            HeadExit::Death => MovementType::Mortality,
            HeadExit::Sale => MovementType::Sale,
        }
    }
}

/// Lot lifecycle, head count changes and metrics
#[derive(Clone)]
pub struct LotService {
    db: DatabaseAccess,
    event_sender: EventSender,
    history_limit: u64,
}

impl LotService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        history_limit: u64,
    ) -> Self {
        Self {
            db: DatabaseAccess::new(db_pool),
            event_sender,
            history_limit,
        }
    }

    /// Registers a purchased lot as PENDING.
    #[instrument(skip(self, input))]
    pub async fn create_lot(
        &self,
        input: CreateLotInput,
    ) -> Result<cattle_lot::Model, ServiceError> {
        input.validate()?;
        let acquisition_cost = input.resolved_acquisition_cost()?;
        let freight_cost = calculations::round_money(input.freight_cost);
        let commission = calculations::round_money(input.commission);
        let total_cost = calculations::money_total(&[acquisition_cost, freight_cost, commission])
            .ok_or_else(|| amount_overflow("total cost"))?;
        let now = Utc::now();
        let entry_date = input.entry_date.unwrap_or(now);

        let lot = self
            .db
            .transaction("create_lot", move |txn| {
                Box::pin(async move {
                    let lot_code = generate_lot_code(txn, entry_date).await?;
                    cattle_lot::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        lot_code: Set(lot_code),
                        entry_quantity: Set(input.entry_quantity),
                        current_quantity: Set(input.entry_quantity),
                        death_count: Set(0),
                        sold_quantity: Set(0),
                        allocated_quantity: Set(0),
                        entry_weight: Set(input.entry_weight),
                        acquisition_cost: Set(acquisition_cost),
                        feed_cost: Set(Decimal::ZERO),
                        health_cost: Set(Decimal::ZERO),
                        operational_cost: Set(Decimal::ZERO),
                        freight_cost: Set(freight_cost),
                        other_costs: Set(commission),
                        total_cost: Set(total_cost),
                        entry_date: Set(entry_date),
                        received_at: Set(None),
                        status: Set(LotStatus::Pending),
                        vendor_name: Set(input.vendor_name),
                        notes: Set(input.notes),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)
                })
            })
            .await?;

        info!(lot_id = %lot.id, lot_code = %lot.lot_code, "Lot created");
        Ok(lot)
    }

    /// Moves a PENDING lot to ACTIVE, booking transport deaths and optional placement.
    #[instrument(skip(self, input))]
    pub async fn receive_lot(
        &self,
        lot_id: Uuid,
        input: ReceiveLotInput,
        user_id: &str,
    ) -> Result<ReceiveOutcome, ServiceError> {
        input.validate()?;
        if let Some(requests) = &input.allocations {
            let placed: i64 = requests.iter().map(|r| i64::from(r.quantity)).sum();
            if placed != i64::from(input.received_quantity) {
                return Err(ServiceError::ValidationError(format!(
                    "allocations place {} head but {} were received",
                    placed, input.received_quantity
                )));
            }
        }

        let user_id = user_id.to_string();
        let received_at = input.received_at.unwrap_or_else(Utc::now);
        let (lot, transport_deaths, allocation) = self
            .db
            .transaction("receive_lot", move |txn| {
                Box::pin(async move {
                    let lot = load_lot(txn, lot_id).await?;
                    if lot.status != LotStatus::Pending {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Lot {} is {:?}; only PENDING lots can be received",
                            lot.lot_code, lot.status
                        )));
                    }
                    if input.received_quantity > lot.entry_quantity {
                        return Err(ServiceError::ValidationError(format!(
                            "received {} head but only {} were bought",
                            input.received_quantity, lot.entry_quantity
                        )));
                    }

                    let deaths = lot.entry_quantity - input.received_quantity;
                    let result = CattleLot::update_many()
                        .col_expr(cattle_lot::Column::Status, Expr::value(LotStatus::Active))
                        .col_expr(cattle_lot::Column::ReceivedAt, Expr::value(Some(received_at)))
                        .col_expr(
                            cattle_lot::Column::EntryWeight,
                            Expr::value(input.received_weight),
                        )
                        .col_expr(
                            cattle_lot::Column::CurrentQuantity,
                            Expr::col(cattle_lot::Column::CurrentQuantity).sub(deaths),
                        )
                        .col_expr(
                            cattle_lot::Column::DeathCount,
                            Expr::col(cattle_lot::Column::DeathCount).add(deaths),
                        )
                        .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(cattle_lot::Column::Id.eq(lot_id))
                        .filter(cattle_lot::Column::Status.eq(LotStatus::Pending))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentAllocationConflict(format!(
                            "lot {} was received by another request",
                            lot_id
                        )));
                    }

                    if deaths > 0 {
                        MovementRecorder::record(
                            txn,
                            NewMovement::new(
                                lot_id,
                                MovementType::Mortality,
                                deaths,
                                "Transport mortality",
                                user_id.clone(),
                            ),
                        )
                        .await?;
                        insert_expense(
                            txn,
                            lot_id,
                            NonCashExpenseType::Mortality,
                            Some(deaths),
                            calculations::mortality_loss(
                                lot.total_cost,
                                lot.entry_quantity,
                                deaths,
                            ),
                            format!("{} head lost in transport", deaths),
                        )
                        .await?;
                    }

                    let allocation = match input.allocations {
                        Some(requests) if !requests.is_empty() => {
                            Some(allocate_in_txn(txn, lot_id, requests, &user_id).await?)
                        }
                        _ => None,
                    };

                    let lot = load_lot(txn, lot_id).await?;
                    Ok((lot, deaths, allocation))
                })
            })
            .await?;

        info!(
            lot_id = %lot_id,
            received = lot.current_quantity,
            transport_deaths,
            "Lot received"
        );

        self.event_sender
            .publish(Event::LotReceived {
                lot_id,
                received_quantity: lot.current_quantity,
                received_at,
            })
            .await;
        if transport_deaths > 0 {
            self.event_sender
                .publish(Event::MortalityRecorded {
                    lot_id,
                    pen_id: None,
                    quantity: transport_deaths,
                })
                .await;
        }
        let allocations = match allocation {
            Some(outcome) => {
                for event in outcome.events(lot_id) {
                    self.event_sender.publish(event).await;
                }
                outcome.allocations
            }
            None => Vec::new(),
        };

        Ok(ReceiveOutcome { lot, allocations })
    }

    #[instrument(skip(self))]
    pub async fn get_lot(&self, lot_id: Uuid) -> Result<cattle_lot::Model, ServiceError> {
        load_lot(self.db.pool(), lot_id).await
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_lots(
        &self,
        status: Option<LotStatus>,
    ) -> Result<Vec<cattle_lot::Model>, ServiceError> {
        let mut query = CattleLot::find();
        if let Some(status) = status {
            query = query.filter(cattle_lot::Column::Status.eq(status));
        }
        query
            .order_by_desc(cattle_lot::Column::CreatedAt)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input))]
    pub async fn record_mortality(
        &self,
        lot_id: Uuid,
        input: MortalityInput,
        user_id: &str,
    ) -> Result<cattle_lot::Model, ServiceError> {
        input.validate()?;
        let user_id = user_id.to_string();
        let quantity = input.quantity;
        let pen_id = input.pen_id;

        let (lot, change) = self
            .db
            .transaction("record_mortality", move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let lot = load_lot(txn, lot_id).await?;
                    let change =
                        take_head(txn, &lot, quantity, pen_id, HeadExit::Death, now).await?;

                    let mut movement = NewMovement::new(
                        lot_id,
                        MovementType::Mortality,
                        quantity,
                        input.cause.clone(),
                        user_id,
                    );
                    if let Some(pen_id) = pen_id {
                        movement = movement.from_pen(pen_id);
                    }
                    MovementRecorder::record(txn, movement).await?;

                    insert_expense(
                        txn,
                        lot_id,
                        NonCashExpenseType::Mortality,
                        Some(quantity),
                        calculations::mortality_loss(lot.total_cost, lot.entry_quantity, quantity),
                        input.cause,
                    )
                    .await?;

                    Ok((load_lot(txn, lot_id).await?, change))
                })
            })
            .await?;

        info!(lot_id = %lot_id, quantity, deaths = lot.death_count, "Mortality recorded");
        self.event_sender
            .publish(Event::MortalityRecorded {
                lot_id,
                pen_id,
                quantity,
            })
            .await;
        if let Some(change) = change {
            self.event_sender.publish(change.into()).await;
        }
        Ok(lot)
    }

    /// Sells head of a lot. The lot becomes SOLD when no head remain.
    #[instrument(skip(self, input))]
    pub async fn record_sale(
        &self,
        lot_id: Uuid,
        input: SaleInput,
        user_id: &str,
    ) -> Result<SaleOutcome, ServiceError> {
        input.validate()?;
        let user_id = user_id.to_string();
        let quantity = input.quantity;

        let (outcome, change) = self
            .db
            .transaction("record_sale", move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let total_value =
                        calculations::sale_value(input.total_weight, input.price_per_arroba)
                            .ok_or_else(|| amount_overflow("sale value"))?;
                    let lot = load_lot(txn, lot_id).await?;
                    let change =
                        take_head(txn, &lot, quantity, input.pen_id, HeadExit::Sale, now).await?;

                    if lot.current_quantity == quantity {
                        CattleLot::update_many()
                            .col_expr(cattle_lot::Column::Status, Expr::value(LotStatus::Sold))
                            .filter(cattle_lot::Column::Id.eq(lot_id))
                            .filter(cattle_lot::Column::CurrentQuantity.eq(0))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                    }

                    let sale = sale_record::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        lot_id: Set(lot_id),
                        pen_id: Set(input.pen_id),
                        quantity: Set(quantity),
                        total_weight: Set(input.total_weight),
                        price_per_arroba: Set(input.price_per_arroba),
                        total_value: Set(total_value),
                        buyer_name: Set(input.buyer_name),
                        sale_date: Set(input.sale_date.unwrap_or(now)),
                        recorded_by: Set(user_id.clone()),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let mut movement = NewMovement::new(
                        lot_id,
                        MovementType::Sale,
                        quantity,
                        format!("Sale {}", sale.id),
                        user_id,
                    );
                    if let Some(pen_id) = input.pen_id {
                        movement = movement.from_pen(pen_id);
                    }
                    MovementRecorder::record(txn, movement).await?;

                    let lot = load_lot(txn, lot_id).await?;
                    Ok((SaleOutcome { lot, sale }, change))
                })
            })
            .await?;

        info!(
            lot_id = %lot_id,
            quantity,
            remaining = outcome.lot.current_quantity,
            "Sale recorded"
        );
        self.event_sender
            .publish(Event::SaleRecorded {
                lot_id,
                sale_id: outcome.sale.id,
                quantity,
                total_value: outcome.sale.total_value,
            })
            .await;
        if let Some(change) = change {
            self.event_sender.publish(change.into()).await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self, input))]
    pub async fn record_weight(
        &self,
        lot_id: Uuid,
        input: WeightInput,
        user_id: &str,
    ) -> Result<weight_reading::Model, ServiceError> {
        input.validate()?;
        let pool = self.db.pool();
        let lot = load_lot(pool, lot_id).await?;
        if input.animal_count > lot.current_quantity {
            return Err(ServiceError::ValidationError(format!(
                "weighed {} head but lot {} has {}",
                input.animal_count, lot.lot_code, lot.current_quantity
            )));
        }

        let now = Utc::now();
        let reading = weight_reading::ActiveModel {
            id: Set(Uuid::new_v4()),
            lot_id: Set(lot_id),
            total_weight: Set(input.total_weight),
            animal_count: Set(input.animal_count),
            reading_date: Set(input.reading_date.unwrap_or(now)),
            notes: Set(input.notes),
            recorded_by: Set(user_id.to_string()),
            created_at: Set(now),
        }
        .insert(pool)
        .await
        .map_err(ServiceError::db_error)?;

        info!(lot_id = %lot_id, animal_count = reading.animal_count, "Weight recorded");
        Ok(reading)
    }

    /// Books shrink between expected and weighed live weight as a non-cash expense.
    #[instrument(skip(self, input))]
    pub async fn record_weight_loss(
        &self,
        lot_id: Uuid,
        input: WeightLossInput,
    ) -> Result<non_cash_expense::Model, ServiceError> {
        input.validate()?;
        if input.actual_weight >= input.expected_weight {
            return Err(ServiceError::ValidationError(
                "actual weight must be below the expected weight".to_string(),
            ));
        }

        let pool = self.db.pool();
        let lot = load_lot(pool, lot_id).await?;
        let value = calculations::weight_loss_value(
            input.expected_weight,
            input.actual_weight,
            lot.total_cost,
            lot.entry_weight,
        )
        .ok_or_else(|| amount_overflow("weight loss value"))?;
        let description = input.description.unwrap_or_else(|| {
            format!(
                "Weight loss of {} kg",
                (input.expected_weight - input.actual_weight).normalize()
            )
        });
        insert_expense(
            pool,
            lot_id,
            NonCashExpenseType::WeightLoss,
            None,
            value,
            description,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn close_lot(&self, lot_id: Uuid) -> Result<cattle_lot::Model, ServiceError> {
        let lot = self
            .db
            .transaction("close_lot", move |txn| {
                Box::pin(async move {
                    let lot = load_lot(txn, lot_id).await?;
                    if lot.status.is_terminal() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Lot {} is already {:?}",
                            lot.lot_code, lot.status
                        )));
                    }
                    let allocated = CapacityLedger::lot_allocation_total(txn, lot_id).await?;
                    if allocated > 0 {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Lot {} still has {} head in pens",
                            lot.lot_code, allocated
                        )));
                    }

                    let result = CattleLot::update_many()
                        .col_expr(cattle_lot::Column::Status, Expr::value(LotStatus::Closed))
                        .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(cattle_lot::Column::Id.eq(lot_id))
                        .filter(cattle_lot::Column::AllocatedQuantity.eq(0))
                        .filter(
                            cattle_lot::Column::Status
                                .is_in([LotStatus::Pending, LotStatus::Active]),
                        )
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentAllocationConflict(format!(
                            "lot {} changed while closing",
                            lot_id
                        )));
                    }
                    load_lot(txn, lot_id).await
                })
            })
            .await?;

        info!(lot_id = %lot_id, "Lot closed");
        self.event_sender.publish(Event::LotClosed(lot_id)).await;
        Ok(lot)
    }

    /// Metrics as of `as_of`, now when omitted.
    #[instrument(skip(self))]
    pub async fn lot_metrics(
        &self,
        lot_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<LotMetrics, ServiceError> {
        let pool = self.db.pool();
        let lot = load_lot(pool, lot_id).await?;
        let latest = WeightReading::find()
            .filter(weight_reading::Column::LotId.eq(lot_id))
            .order_by_desc(weight_reading::Column::ReadingDate)
            .order_by_desc(weight_reading::Column::CreatedAt)
            .one(pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(calculations::lot_metrics(
            &lot,
            latest.as_ref(),
            as_of.unwrap_or_else(Utc::now),
        ))
    }

    /// Newest first; the configured default limit applies when `limit` is omitted.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        lot_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<lot_movement::Model>, ServiceError> {
        let pool = self.db.pool();
        load_lot(pool, lot_id).await?;
        MovementRecorder::history(pool, lot_id, limit.unwrap_or(self.history_limit)).await
    }

    #[instrument(skip(self))]
    pub async fn non_cash_expenses(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<non_cash_expense::Model>, ServiceError> {
        NonCashExpense::find()
            .filter(non_cash_expense::Column::LotId.eq(lot_id))
            .order_by_asc(non_cash_expense::Column::RecordedAt)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Removes head from an ACTIVE lot for a death or a sale.
///
/// With a pen, the lot's allocation there shrinks and both counters are
/// released. Without one, only unallocated head can leave.
async fn take_head<C: ConnectionTrait>(
    conn: &C,
    lot: &cattle_lot::Model,
    quantity: i32,
    pen_id: Option<Uuid>,
    exit: HeadExit,
    now: DateTime<Utc>,
) -> Result<Option<StatusChange>, ServiceError> {
    if lot.status != LotStatus::Active {
        return Err(ServiceError::InvalidOperation(format!(
            "Lot {} is {:?}; {:?} requires an ACTIVE lot",
            lot.lot_code,
            lot.status,
            exit.movement_type()
        )));
    }
    if quantity > lot.current_quantity {
        return Err(ServiceError::InsufficientLotQuantity {
            lot_id: lot.id,
            requested: quantity,
            available: lot.current_quantity,
        });
    }

    let change = match pen_id {
        Some(pen_id) => {
            withdraw_from_pen(
                conn,
                lot,
                pen_id,
                quantity,
                lot.current_quantity - quantity,
                now,
            )
            .await?;
            CapacityLedger::release_lot(conn, lot.id, quantity).await?;
            CapacityLedger::sync_status(conn, pen_id).await?
        }
        None => {
            if lot.unallocated_quantity() < quantity {
                return Err(ServiceError::InvalidOperation(format!(
                    "Lot {} has {} unallocated head; name the pen for the remaining {}",
                    lot.lot_code,
                    lot.unallocated_quantity(),
                    quantity - lot.unallocated_quantity().max(0)
                )));
            }
            None
        }
    };

    let counter = exit.counter();
    let result = CattleLot::update_many()
        .col_expr(
            cattle_lot::Column::CurrentQuantity,
            Expr::col(cattle_lot::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(counter, Expr::col(counter).add(quantity))
        .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(now))
        .filter(cattle_lot::Column::Id.eq(lot.id))
        .filter(
            Expr::col(cattle_lot::Column::AllocatedQuantity)
                .lte(Expr::col(cattle_lot::Column::CurrentQuantity).sub(quantity)),
        )
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        warn!(lot_id = %lot.id, quantity, "Lot head changed concurrently");
        return Err(ServiceError::ConcurrentAllocationConflict(format!(
            "lot {} head count changed by another request",
            lot.id
        )));
    }

    Ok(change)
}

async fn insert_expense<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    expense_type: NonCashExpenseType,
    quantity: Option<i32>,
    total_value: Decimal,
    description: String,
) -> Result<non_cash_expense::Model, ServiceError> {
    non_cash_expense::ActiveModel {
        id: Set(Uuid::new_v4()),
        lot_id: Set(lot_id),
        expense_type: Set(expense_type),
        quantity: Set(quantity),
        total_value: Set(total_value),
        description: Set(description),
        recorded_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

async fn generate_lot_code<C: ConnectionTrait>(
    conn: &C,
    entry_date: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let prefix = lot_code_prefix(entry_date);
    let existing: Vec<String> = CattleLot::find()
        .select_only()
        .column(cattle_lot::Column::LotCode)
        .filter(cattle_lot::Column::LotCode.starts_with(&prefix))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(next_lot_code(&prefix, existing.iter().map(String::as_str)))
}

fn lot_code_prefix(date: DateTime<Utc>) -> String {
    format!("{}{}", LOT_CODE_PREFIX, date.format("%y%m"))
}

/// `LOT-YYMMNNN`: one past the highest sequence already used in the month.
fn next_lot_code<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let next = existing
        .filter_map(|code| code.strip_prefix(prefix))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .map_or(1, |n| n + 1);
    format!("{}{:03}", prefix, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn lot_codes_follow_the_month_sequence() {
        let date = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let prefix = lot_code_prefix(date);
        assert_eq!(prefix, "LOT-2403");
        assert_eq!(next_lot_code(&prefix, std::iter::empty()), "LOT-2403001");
        assert_eq!(
            next_lot_code(&prefix, ["LOT-2403001", "LOT-2403009", "LOT-2402050"].into_iter()),
            "LOT-2403010"
        );
        assert_eq!(
            next_lot_code(&prefix, ["LOT-2403999"].into_iter()),
            "LOT-24031000"
        );
    }

    fn lot_input() -> CreateLotInput {
        CreateLotInput {
            entry_quantity: 100,
            entry_weight: dec!(30000),
            acquisition_cost: None,
            price_per_arroba: Some(dec!(300)),
            carcass_yield: None,
            freight_cost: Decimal::ZERO,
            commission: Decimal::ZERO,
            entry_date: None,
            vendor_name: None,
            notes: None,
        }
    }

    #[test]
    fn acquisition_cost_is_derived_from_arroba_price() {
        assert_eq!(lot_input().resolved_acquisition_cost().unwrap(), dec!(300000));

        let mut input = lot_input();
        input.carcass_yield = Some(dec!(52));
        assert_eq!(input.resolved_acquisition_cost().unwrap(), dec!(312000));

        input.acquisition_cost = Some(dec!(123.456));
        assert_eq!(input.resolved_acquisition_cost().unwrap(), dec!(123.46));
    }

    #[test]
    fn acquisition_cost_needs_a_price() {
        let mut input = lot_input();
        input.price_per_arroba = None;
        assert!(matches!(
            input.resolved_acquisition_cost(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn negative_freight_fails_validation() {
        let mut input = lot_input();
        input.freight_cost = dec!(-1);
        assert!(input.validate().is_err());
    }
}
