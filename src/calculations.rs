//! Feedlot formulas.
//!
//! Everything here is a pure function of its arguments. Metrics are computed on
//! read from the stored lot and its latest weight reading and are never persisted.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{cattle_lot, weight_reading};

/// One arroba is 15 kg of carcass.
pub const ARROBA_KG: Decimal = dec!(15);

/// Carcass yield assumed when a purchase does not state one.
pub const DEFAULT_CARCASS_YIELD: Decimal = dec!(50);

/// Largest amount a money column (`DECIMAL(16,2)`) stores.
pub const MAX_MONEY: Decimal = dec!(99999999999999.99);

/// Largest weight a weight column (`DECIMAL(16,3)`) stores, in kg.
pub const MAX_WEIGHT_KG: Decimal = dec!(9999999999999.999);

const HUNDRED: Decimal = dec!(100);

/// Rounds a money value to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds to cents, `None` when the result does not fit a money column.
fn storable_money(value: Decimal) -> Option<Decimal> {
    let rounded = round_money(value);
    (rounded.abs() <= MAX_MONEY).then_some(rounded)
}

/// Sum of money amounts, `None` on overflow or when it does not fit a money column.
pub fn money_total(parts: &[Decimal]) -> Option<Decimal> {
    parts
        .iter()
        .try_fold(Decimal::ZERO, |acc, part| acc.checked_add(*part))
        .and_then(storable_money)
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// `death_count / entry_quantity * 100`, zero for an empty lot.
pub fn mortality_rate(death_count: i32, entry_quantity: i32) -> Decimal {
    ratio(
        Decimal::from(death_count) * HUNDRED,
        Decimal::from(entry_quantity),
    )
    .round_dp(2)
}

/// `total_cost / current_quantity`, zero when no head remain.
pub fn cost_per_head(total_cost: Decimal, current_quantity: i32) -> Decimal {
    round_money(ratio(total_cost, Decimal::from(current_quantity)))
}

/// Average live weight per head in kg.
///
/// Uses the latest weighing when there is one, otherwise the entry weight spread
/// over the entry head count.
pub fn average_weight(
    lot: &cattle_lot::Model,
    latest_reading: Option<&weight_reading::Model>,
) -> Decimal {
    let avg = match latest_reading {
        Some(reading) if reading.animal_count > 0 => {
            reading.total_weight / Decimal::from(reading.animal_count)
        }
        _ => ratio(lot.entry_weight, Decimal::from(lot.entry_quantity)),
    };
    avg.round_dp(3)
}

/// `total_cost / (average_weight * current_quantity / 15)`, zero when there is no weight.
pub fn cost_per_arroba(
    total_cost: Decimal,
    average_weight: Decimal,
    current_quantity: i32,
) -> Decimal {
    let arrobas = average_weight * Decimal::from(current_quantity) / ARROBA_KG;
    round_money(ratio(total_cost, arrobas))
}

/// Whole days from reception (or entry when not yet received) to `as_of`.
pub fn days_in_confinement(lot: &cattle_lot::Model, as_of: DateTime<Utc>) -> i64 {
    let start = lot.received_at.unwrap_or(lot.entry_date);
    (as_of - start).num_days().max(0)
}

/// Purchase price of live weight bought by carcass arroba.
///
/// `None` when the price does not fit a money column.
pub fn acquisition_cost(
    purchase_weight: Decimal,
    carcass_yield_pct: Decimal,
    price_per_arroba: Decimal,
) -> Option<Decimal> {
    purchase_weight
        .checked_mul(carcass_yield_pct)?
        .checked_div(HUNDRED)?
        .checked_div(ARROBA_KG)?
        .checked_mul(price_per_arroba)
        .and_then(storable_money)
}

/// `total_weight / 15 * price_per_arroba`, `None` when it does not fit a money column.
pub fn sale_value(total_weight: Decimal, price_per_arroba: Decimal) -> Option<Decimal> {
    total_weight
        .checked_div(ARROBA_KG)?
        .checked_mul(price_per_arroba)
        .and_then(storable_money)
}

/// Book value lost with dead animals: `total_cost / entry_quantity * deaths`.
pub fn mortality_loss(total_cost: Decimal, entry_quantity: i32, deaths: i32) -> Decimal {
    round_money(ratio(total_cost, Decimal::from(entry_quantity)) * Decimal::from(deaths))
}

/// Value of missing weight at the lot's cost per entry kg.
pub fn weight_loss_value(
    expected_weight: Decimal,
    actual_weight: Decimal,
    total_cost: Decimal,
    entry_weight: Decimal,
) -> Option<Decimal> {
    expected_weight
        .checked_sub(actual_weight)?
        .checked_mul(ratio(total_cost, entry_weight))
        .and_then(storable_money)
}

/// `part / whole * 100` as a float snapshot, zero when `whole` is zero.
pub fn share_percentage(part: i32, whole: i32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}

/// Splits `amount` proportionally to `weights`.
///
/// Each share is rounded to cents and the last share takes the remainder, so the
/// result always sums to `amount` exactly. Returns an empty vector when the
/// weights do not add up to a positive value.
pub fn split_amount(amount: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let total: Decimal = weights.iter().copied().sum();
    if weights.is_empty() || total <= Decimal::ZERO {
        return Vec::new();
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for (idx, weight) in weights.iter().enumerate() {
        let share = if idx == weights.len() - 1 {
            amount - assigned
        } else {
            round_money(amount * *weight / total)
        };
        assigned += share;
        shares.push(share);
    }
    shares
}

/// Metrics of one lot at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LotMetrics {
    pub lot_id: Uuid,
    pub lot_code: String,
    /// Percentage of entry head that died
    pub mortality_rate: Decimal,
    pub cost_per_head: Decimal,
    /// Average live weight per head, in kg
    pub average_weight: Decimal,
    pub cost_per_arroba: Decimal,
    pub days_in_confinement: i64,
    /// Estimated live weight of the remaining head, in kg
    pub current_weight: Decimal,
    pub total_investment: Decimal,
    pub remaining_animals: i32,
    pub as_of: DateTime<Utc>,
}

pub fn lot_metrics(
    lot: &cattle_lot::Model,
    latest_reading: Option<&weight_reading::Model>,
    as_of: DateTime<Utc>,
) -> LotMetrics {
    let avg = average_weight(lot, latest_reading);
    LotMetrics {
        lot_id: lot.id,
        lot_code: lot.lot_code.clone(),
        mortality_rate: mortality_rate(lot.death_count, lot.entry_quantity),
        cost_per_head: cost_per_head(lot.total_cost, lot.current_quantity),
        average_weight: avg,
        cost_per_arroba: cost_per_arroba(lot.total_cost, avg, lot.current_quantity),
        days_in_confinement: days_in_confinement(lot, as_of),
        current_weight: (avg * Decimal::from(lot.current_quantity)).round_dp(3),
        total_investment: lot.total_cost,
        remaining_animals: lot.current_quantity,
        as_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::LotStatus;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn lot(
        entry: i32,
        deaths: i32,
        sold: i32,
        entry_weight: Decimal,
        total_cost: Decimal,
    ) -> cattle_lot::Model {
        let entry_date = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        cattle_lot::Model {
            id: Uuid::new_v4(),
            lot_code: "LOT-2403001".into(),
            entry_quantity: entry,
            current_quantity: entry - deaths - sold,
            death_count: deaths,
            sold_quantity: sold,
            allocated_quantity: 0,
            entry_weight,
            acquisition_cost: total_cost,
            feed_cost: Decimal::ZERO,
            health_cost: Decimal::ZERO,
            operational_cost: Decimal::ZERO,
            freight_cost: Decimal::ZERO,
            other_costs: Decimal::ZERO,
            total_cost,
            entry_date,
            received_at: None,
            status: LotStatus::Active,
            vendor_name: None,
            notes: None,
            created_at: entry_date,
            updated_at: entry_date,
        }
    }

    fn reading(lot_id: Uuid, total_weight: Decimal, animal_count: i32) -> weight_reading::Model {
        let now = Utc::now();
        weight_reading::Model {
            id: Uuid::new_v4(),
            lot_id,
            total_weight,
            animal_count,
            reading_date: now,
            notes: None,
            recorded_by: "tester".into(),
            created_at: now,
        }
    }

    #[rstest]
    #[case(3, 100, dec!(3))]
    #[case(0, 100, dec!(0))]
    #[case(1, 3, dec!(33.33))]
    #[case(5, 0, dec!(0))]
    fn mortality_rate_cases(#[case] deaths: i32, #[case] entry: i32, #[case] expected: Decimal) {
        assert_eq!(mortality_rate(deaths, entry), expected);
    }

    #[rstest]
    #[case(dec!(10000), 100, dec!(100))]
    #[case(dec!(1000), 3, dec!(333.33))]
    #[case(dec!(500), 0, dec!(0))]
    fn cost_per_head_cases(
        #[case] total: Decimal,
        #[case] current: i32,
        #[case] expected: Decimal,
    ) {
        assert_eq!(cost_per_head(total, current), expected);
    }

    #[test]
    fn average_weight_prefers_latest_reading() {
        let l = lot(100, 0, 0, dec!(30000), dec!(100000));
        assert_eq!(average_weight(&l, None), dec!(300));

        let r = reading(l.id, dec!(4200), 10);
        assert_eq!(average_weight(&l, Some(&r)), dec!(420));
    }

    #[test]
    fn average_weight_ignores_empty_reading() {
        let l = lot(10, 0, 0, dec!(3000), dec!(1000));
        let r = reading(l.id, dec!(0), 0);
        assert_eq!(average_weight(&l, Some(&r)), dec!(300));
    }

    #[test]
    fn cost_per_arroba_uses_current_head_count() {
        // 100 head at 300 kg = 2000 arrobas
        assert_eq!(cost_per_arroba(dec!(100000), dec!(300), 100), dec!(50));
        assert_eq!(cost_per_arroba(dec!(100000), dec!(0), 100), dec!(0));
        assert_eq!(cost_per_arroba(dec!(100000), dec!(300), 0), dec!(0));
    }

    #[test]
    fn acquisition_cost_defaults_to_half_carcass_yield() {
        // 30000 kg * 50% / 15 = 1000 arrobas at 300
        assert_eq!(
            acquisition_cost(dec!(30000), DEFAULT_CARCASS_YIELD, dec!(300)),
            Some(dec!(300000))
        );
    }

    #[test]
    fn sale_value_is_priced_per_arroba() {
        assert_eq!(sale_value(dec!(15000), dec!(310.50)), Some(dec!(310500)));
        assert_eq!(sale_value(dec!(100), dec!(10)), Some(dec!(66.67)));
    }

    #[test]
    fn values_too_large_for_a_money_column_are_refused() {
        let weight = dec!(100000000000000000000);
        assert_eq!(
            acquisition_cost(weight, DEFAULT_CARCASS_YIELD, dec!(1000000000000)),
            None
        );
        assert_eq!(sale_value(Decimal::MAX, Decimal::MAX), None);
        assert_eq!(sale_value(MAX_WEIGHT_KG, MAX_MONEY), None);
        assert_eq!(money_total(&[dec!(100.10), dec!(0.25)]), Some(dec!(100.35)));
        assert_eq!(money_total(&[MAX_MONEY, dec!(0.01)]), None);
        assert_eq!(money_total(&[Decimal::MAX, Decimal::MAX]), None);
    }

    #[test]
    fn loss_values() {
        assert_eq!(mortality_loss(dec!(100000), 100, 3), dec!(3000));
        assert_eq!(mortality_loss(dec!(100000), 0, 3), dec!(0));
        assert_eq!(
            weight_loss_value(dec!(30000), dec!(29700), dec!(90000), dec!(30000)),
            Some(dec!(900))
        );
    }

    #[test]
    fn days_in_confinement_starts_at_reception() {
        let mut l = lot(10, 0, 0, dec!(3000), dec!(1000));
        let as_of = l.entry_date + Duration::days(30);
        assert_eq!(days_in_confinement(&l, as_of), 30);

        l.received_at = Some(l.entry_date + Duration::days(2));
        assert_eq!(days_in_confinement(&l, as_of), 28);

        assert_eq!(days_in_confinement(&l, l.entry_date), 0);
    }

    #[rstest]
    #[case(dec!(100), vec![dec!(1), dec!(1), dec!(1)], vec![dec!(33.33), dec!(33.33), dec!(33.34)])]
    #[case(dec!(1000), vec![dec!(30), dec!(70)], vec![dec!(300), dec!(700)])]
    #[case(dec!(-90), vec![dec!(50), dec!(50)], vec![dec!(-45), dec!(-45)])]
    #[case(dec!(0.05), vec![dec!(1), dec!(1)], vec![dec!(0.03), dec!(0.02)])]
    fn split_amount_sums_exactly(
        #[case] amount: Decimal,
        #[case] weights: Vec<Decimal>,
        #[case] expected: Vec<Decimal>,
    ) {
        let shares = split_amount(amount, &weights);
        assert_eq!(shares, expected);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), amount);
    }

    #[test]
    fn split_amount_rejects_empty_weights() {
        assert!(split_amount(dec!(10), &[]).is_empty());
        assert!(split_amount(dec!(10), &[Decimal::ZERO]).is_empty());
    }

    #[test]
    fn share_percentage_snapshot() {
        assert_eq!(share_percentage(50, 100), 50.0);
        assert_eq!(share_percentage(30, 0), 0.0);
        assert!((share_percentage(1, 3) - 33.333).abs() < 0.001);
    }

    #[test]
    fn lot_metrics_is_repeatable() {
        let l = lot(100, 3, 0, dec!(30000), dec!(97000));
        let as_of = l.entry_date + Duration::days(10);
        let first = lot_metrics(&l, None, as_of);
        let second = lot_metrics(&l, None, as_of);
        assert_eq!(first, second);
        assert_eq!(first.mortality_rate, dec!(3));
        assert_eq!(first.cost_per_head, dec!(1000));
        assert_eq!(first.remaining_animals, 97);
        assert_eq!(first.current_weight, dec!(29100));
        assert_eq!(first.days_in_confinement, 10);
    }
}
