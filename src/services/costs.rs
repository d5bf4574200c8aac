use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::calculations::{split_amount, MAX_MONEY};
use crate::config::NegativeCostPolicy;
use crate::db::DatabaseAccess;
use crate::entities::{
    cattle_lot, cost_posting, CattleLot, CostCategory, CostPosting, CostTarget, LotStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::allocation::active_in_pen;
use crate::services::capacity::{load_lot, load_pen};

const FULL_SHARE: Decimal = dec!(100);
const SHARE_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CostInput {
    pub category: CostCategory,
    /// Negative amounts are reversals
    #[validate(custom = "non_zero_amount")]
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// One lot's percentage of a manually split cost
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LotShare {
    pub lot_id: Uuid,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SplitCostInput {
    #[validate]
    #[serde(flatten)]
    pub cost: CostInput,
    #[validate(length(min = 1))]
    pub shares: Vec<LotShare>,
}

/// Postings written by one split operation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CostBatch {
    pub batch_id: Uuid,
    pub target: CostTarget,
    pub category: CostCategory,
    pub amount: Decimal,
    pub postings: Vec<cost_posting::Model>,
}

fn non_zero_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_zero() {
        let mut err = ValidationError::new("amount");
        err.message = Some("amount must not be zero".into());
        return Err(err);
    }
    if amount.abs() > MAX_MONEY {
        let mut err = ValidationError::new("amount");
        err.message = Some("amount is too large to store".into());
        return Err(err);
    }
    Ok(())
}

/// A share ready to be applied to one lot.
struct Share {
    lot_id: Uuid,
    pen_id: Option<Uuid>,
    amount: Decimal,
    percentage: Decimal,
}

/// Adds costs to lots, directly or spread over several lots.
#[derive(Clone)]
pub struct CostAccumulator {
    db: DatabaseAccess,
    event_sender: EventSender,
    policy: NegativeCostPolicy,
}

impl CostAccumulator {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        policy: NegativeCostPolicy,
    ) -> Self {
        Self {
            db: DatabaseAccess::new(db_pool),
            event_sender,
            policy,
        }
    }

    pub fn policy(&self) -> NegativeCostPolicy {
        self.policy
    }

    /// Adds `amount` to one cost category of a lot and to its total.
    #[instrument(skip(self, input), fields(category = ?input.category, amount = %input.amount))]
    pub async fn post_cost(
        &self,
        lot_id: Uuid,
        input: CostInput,
        user_id: &str,
    ) -> Result<cattle_lot::Model, ServiceError> {
        input.validate()?;
        let shares = vec![Share {
            lot_id,
            pen_id: None,
            amount: input.amount,
            percentage: FULL_SHARE,
        }];

        let batch = self
            .apply_batch("post_lot_cost", CostTarget::Lot, input, shares, user_id)
            .await?;
        info!(lot_id = %lot_id, batch_id = %batch.batch_id, "Cost posted to lot");

        load_lot(self.db.pool(), lot_id).await
    }

    /// Spreads a cost over the lots in a pen, by head count.
    #[instrument(skip(self, input), fields(category = ?input.category, amount = %input.amount))]
    pub async fn post_pen_cost(
        &self,
        pen_id: Uuid,
        input: CostInput,
        user_id: &str,
    ) -> Result<CostBatch, ServiceError> {
        input.validate()?;
        let pool = self.db.pool();
        load_pen(pool, pen_id).await?;

        let mut heads: Vec<(Uuid, i32)> = Vec::new();
        for allocation in active_in_pen(pool, pen_id).await? {
            match heads.iter_mut().find(|(lot_id, _)| *lot_id == allocation.lot_id) {
                Some((_, q)) => *q += allocation.quantity,
                None => heads.push((allocation.lot_id, allocation.quantity)),
            }
        }
        if heads.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "pen {} has no animals to charge",
                pen_id
            )));
        }

        let shares = shares_by_head(input.amount, &heads, Some(pen_id));
        self.apply_batch("post_pen_cost", CostTarget::Pen, input, shares, user_id)
            .await
    }

    /// Spreads a cost over every ACTIVE lot, by current head count.
    #[instrument(skip(self, input), fields(category = ?input.category, amount = %input.amount))]
    pub async fn post_global_cost(
        &self,
        input: CostInput,
        user_id: &str,
    ) -> Result<CostBatch, ServiceError> {
        input.validate()?;
        let lots = CattleLot::find()
            .filter(cattle_lot::Column::Status.eq(LotStatus::Active))
            .filter(cattle_lot::Column::CurrentQuantity.gt(0))
            .order_by_asc(cattle_lot::Column::LotCode)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)?;
        if lots.is_empty() {
            return Err(ServiceError::ValidationError(
                "there are no active lots to charge".to_string(),
            ));
        }

        let heads: Vec<(Uuid, i32)> = lots.iter().map(|l| (l.id, l.current_quantity)).collect();
        let shares = shares_by_head(input.amount, &heads, None);
        self.apply_batch("post_global_cost", CostTarget::Global, input, shares, user_id)
            .await
    }

    /// Splits a cost over explicit lot percentages that add up to 100.
    #[instrument(skip(self, input), fields(lots = input.shares.len()))]
    pub async fn post_split_cost(
        &self,
        input: SplitCostInput,
        user_id: &str,
    ) -> Result<CostBatch, ServiceError> {
        input.validate()?;

        let mut seen = HashSet::new();
        for share in &input.shares {
            if share.percentage <= Decimal::ZERO || share.percentage > FULL_SHARE {
                return Err(ServiceError::ValidationError(format!(
                    "percentage for lot {} must be within (0, 100]",
                    share.lot_id
                )));
            }
            if !seen.insert(share.lot_id) {
                return Err(ServiceError::ValidationError(format!(
                    "lot {} appears more than once",
                    share.lot_id
                )));
            }
        }
        let total: Decimal = input.shares.iter().map(|s| s.percentage).sum();
        if (total - FULL_SHARE).abs() > SHARE_TOLERANCE {
            return Err(ServiceError::ValidationError(format!(
                "percentages must add up to 100, got {}",
                total
            )));
        }

        let weights: Vec<Decimal> = input.shares.iter().map(|s| s.percentage).collect();
        let shares = split_amount(input.cost.amount, &weights)
            .into_iter()
            .zip(&input.shares)
            .map(|(amount, share)| Share {
                lot_id: share.lot_id,
                pen_id: None,
                amount,
                percentage: share.percentage,
            })
            .collect();

        self.apply_batch("post_split_cost", CostTarget::Lot, input.cost, shares, user_id)
            .await
    }

    /// Postings of a lot, oldest first.
    #[instrument(skip(self))]
    pub async fn postings_for_lot(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<cost_posting::Model>, ServiceError> {
        CostPosting::find()
            .filter(cost_posting::Column::LotId.eq(lot_id))
            .order_by_asc(cost_posting::Column::PostedAt)
            .all(self.db.pool())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn apply_batch(
        &self,
        operation: &'static str,
        target: CostTarget,
        input: CostInput,
        shares: Vec<Share>,
        user_id: &str,
    ) -> Result<CostBatch, ServiceError> {
        let policy = self.policy;
        let user_id = user_id.to_string();
        let category = input.category;
        let amount = input.amount;
        let description = input.description;

        let batch = self
            .db
            .transaction(operation, move |txn| {
                Box::pin(async move {
                    let batch_id = Uuid::new_v4();
                    let now = Utc::now();
                    let mut postings = Vec::with_capacity(shares.len());
                    for share in shares {
                        apply_to_lot(txn, share.lot_id, category, share.amount, policy, now)
                            .await?;
                        postings.push(
                            insert_posting(
                                txn,
                                batch_id,
                                target,
                                category,
                                &share,
                                description.clone(),
                                &user_id,
                                now,
                            )
                            .await?,
                        );
                    }
                    Ok(CostBatch {
                        batch_id,
                        target,
                        category,
                        amount,
                        postings,
                    })
                })
            })
            .await?;

        self.event_sender
            .publish(Event::CostPosted {
                batch_id: batch.batch_id,
                target,
                category,
                amount,
                lots: batch.postings.iter().map(|p| p.lot_id).collect(),
            })
            .await;
        Ok(batch)
    }
}

fn shares_by_head(amount: Decimal, heads: &[(Uuid, i32)], pen_id: Option<Uuid>) -> Vec<Share> {
    let weights: Vec<Decimal> = heads.iter().map(|(_, q)| Decimal::from(*q)).collect();
    let total: Decimal = weights.iter().copied().sum();
    split_amount(amount, &weights)
        .into_iter()
        .zip(heads.iter().zip(&weights))
        .map(|(share, ((lot_id, _), weight))| Share {
            lot_id: *lot_id,
            pen_id,
            amount: share,
            percentage: (*weight * FULL_SHARE / total).round_dp(4),
        })
        .collect()
}

/// Atomic `field += amount, total_cost += amount` on one lot.
///
/// Under [`NegativeCostPolicy::RejectBelowZero`] a negative amount only applies
/// when neither column would drop below zero.
async fn apply_to_lot<C: ConnectionTrait>(
    conn: &C,
    lot_id: Uuid,
    category: CostCategory,
    amount: Decimal,
    policy: NegativeCostPolicy,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let column = category.lot_column();
    let mut update = CattleLot::update_many()
        .col_expr(column, Expr::col(column).add(amount))
        .col_expr(
            cattle_lot::Column::TotalCost,
            Expr::col(cattle_lot::Column::TotalCost).add(amount),
        )
        .col_expr(cattle_lot::Column::UpdatedAt, Expr::value(now))
        .filter(cattle_lot::Column::Id.eq(lot_id));

    let guarded = policy == NegativeCostPolicy::RejectBelowZero && amount.is_sign_negative();
    if guarded {
        update = update
            .filter(Expr::col(column).gte(-amount))
            .filter(Expr::col(cattle_lot::Column::TotalCost).gte(-amount));
    }

    let result = update.exec(conn).await.map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        load_lot(conn, lot_id).await?;
        warn!(lot_id = %lot_id, amount = %amount, "Reversal rejected below zero");
        return Err(ServiceError::ValidationError(format!(
            "reversal of {} would leave {:?} cost of lot {} below zero",
            amount.abs(),
            category,
            lot_id
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_posting<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    target: CostTarget,
    category: CostCategory,
    share: &Share,
    description: Option<String>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<cost_posting::Model, ServiceError> {
    cost_posting::ActiveModel {
        id: Set(Uuid::new_v4()),
        batch_id: Set(batch_id),
        lot_id: Set(share.lot_id),
        pen_id: Set(share.pen_id),
        target: Set(target),
        category: Set(category),
        amount: Set(share.amount),
        percentage: Set(share.percentage),
        description: Set(description),
        posted_by: Set(user_id.to_string()),
        posted_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}
