mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{lot_input, TestApp, OPERATOR};
use feedlot_api::entities::{LotStatus, MovementType, NonCashExpenseType, PenStatus};
use feedlot_api::errors::ServiceError;
use feedlot_api::services::allocation::PenAllocationRequest;
use feedlot_api::services::lots::{
    CreateLotInput, MortalityInput, ReceiveLotInput, SaleInput, WeightInput, WeightLossInput,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn assert_conserved(lot: &feedlot_api::entities::cattle_lot::Model) {
    assert_eq!(
        lot.current_quantity + lot.death_count + lot.sold_quantity,
        lot.entry_quantity,
        "head count must be conserved"
    );
    assert!(lot.allocated_quantity <= lot.current_quantity);
}

#[tokio::test]
async fn new_lot_is_pending_with_generated_code() {
    let app = TestApp::new().await;
    let first = app.create_lot(10, dec!(5000)).await;
    let second = app.create_lot(10, dec!(5000)).await;

    assert_eq!(first.status, LotStatus::Pending);
    assert!(first.lot_code.starts_with("LOT-"));
    assert_ne!(first.lot_code, second.lot_code);
    assert_eq!(first.current_quantity, 10);
    assert_eq!(first.total_cost.round_dp(2), dec!(5000));
    assert_conserved(&first);
}

#[tokio::test]
async fn acquisition_cost_is_priced_by_carcass_arroba() {
    let app = TestApp::new().await;
    let lot = app
        .services()
        .lots
        .create_lot(CreateLotInput {
            acquisition_cost: None,
            price_per_arroba: Some(dec!(300)),
            carcass_yield: Some(dec!(52)),
            freight_cost: dec!(1500),
            commission: dec!(250),
            ..lot_input(10, Decimal::ZERO)
        })
        .await
        .unwrap();

    // 3000 kg * 52% / 15 * 300
    assert_eq!(lot.acquisition_cost.round_dp(2), dec!(31200));
    assert_eq!(lot.freight_cost.round_dp(2), dec!(1500));
    assert_eq!(lot.total_cost.round_dp(2), dec!(32950));
}

#[tokio::test]
async fn lot_without_any_price_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .lots
        .create_lot(CreateLotInput {
            acquisition_cost: None,
            ..lot_input(10, Decimal::ZERO)
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn reception_books_transport_deaths_and_places_the_lot() {
    let app = TestApp::new().await;
    let pen = app.create_pen("R-01", 50).await;
    let lot = app.create_lot(50, dec!(50000)).await;

    let outcome = app
        .services()
        .lots
        .receive_lot(
            lot.id,
            ReceiveLotInput {
                received_quantity: 48,
                received_weight: dec!(14200),
                received_at: None,
                allocations: Some(vec![PenAllocationRequest {
                    pen_id: pen.id,
                    quantity: 48,
                }]),
            },
            OPERATOR,
        )
        .await
        .unwrap();

    assert_eq!(outcome.lot.status, LotStatus::Active);
    assert_eq!(outcome.lot.current_quantity, 48);
    assert_eq!(outcome.lot.death_count, 2);
    assert_eq!(outcome.lot.allocated_quantity, 48);
    assert!(outcome.lot.received_at.is_some());
    assert_eq!(outcome.allocations.len(), 1);
    assert_conserved(&outcome.lot);
    assert_eq!(app.pen(pen.id).await.occupied_quantity, 48);

    let expenses = app.services().lots.non_cash_expenses(lot.id).await.unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].expense_type, NonCashExpenseType::Mortality);
    assert_eq!(expenses[0].quantity, Some(2));
    assert_eq!(expenses[0].total_value.round_dp(2), dec!(2000));

    let err = app
        .services()
        .lots
        .receive_lot(
            lot.id,
            ReceiveLotInput {
                received_quantity: 48,
                received_weight: dec!(14200),
                received_at: None,
                allocations: None,
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn reception_placement_must_cover_received_head() {
    let app = TestApp::new().await;
    let pen = app.create_pen("R-01", 50).await;
    let lot = app.create_lot(20, dec!(20000)).await;

    let err = app
        .services()
        .lots
        .receive_lot(
            lot.id,
            ReceiveLotInput {
                received_quantity: 20,
                received_weight: dec!(6000),
                received_at: None,
                allocations: Some(vec![PenAllocationRequest {
                    pen_id: pen.id,
                    quantity: 15,
                }]),
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.lot(lot.id).await.status, LotStatus::Pending);
}

#[tokio::test]
async fn mortality_in_a_pen_shrinks_the_allocation() {
    let app = TestApp::new().await;
    let pen = app.create_pen("A-01", 20).await;
    let lot = app.active_lot(20).await;
    app.services()
        .allocations
        .allocate(
            lot.id,
            vec![PenAllocationRequest {
                pen_id: pen.id,
                quantity: 20,
            }],
            OPERATOR,
        )
        .await
        .unwrap();
    assert_eq!(app.pen(pen.id).await.status, PenStatus::Occupied);

    let lot = app
        .services()
        .lots
        .record_mortality(
            lot.id,
            MortalityInput {
                quantity: 2,
                pen_id: Some(pen.id),
                cause: "Pneumonia".to_string(),
            },
            OPERATOR,
        )
        .await
        .unwrap();

    assert_eq!(lot.current_quantity, 18);
    assert_eq!(lot.death_count, 2);
    assert_eq!(lot.allocated_quantity, 18);
    assert_conserved(&lot);

    let pen = app.pen(pen.id).await;
    assert_eq!(pen.occupied_quantity, 18);
    assert_eq!(pen.status, PenStatus::Available);

    let active = app
        .services()
        .allocations
        .allocations_for_lot(lot.id, false)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].quantity, 18);

    let metrics = app.services().lots.lot_metrics(lot.id, None).await.unwrap();
    assert_eq!(metrics.mortality_rate, dec!(10));
    assert_eq!(metrics.remaining_animals, 18);
}

#[tokio::test]
async fn mortality_without_pen_needs_unallocated_head() {
    let app = TestApp::new().await;
    let pen = app.create_pen("A-01", 20).await;
    let lot = app.active_lot(10).await;
    app.services()
        .allocations
        .allocate(
            lot.id,
            vec![PenAllocationRequest {
                pen_id: pen.id,
                quantity: 10,
            }],
            OPERATOR,
        )
        .await
        .unwrap();

    let err = app
        .services()
        .lots
        .record_mortality(
            lot.id,
            MortalityInput {
                quantity: 1,
                pen_id: None,
                cause: "Unknown".to_string(),
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert_eq!(app.lot(lot.id).await.death_count, 0);
}

#[tokio::test]
async fn selling_every_head_marks_lot_sold() {
    let app = TestApp::new().await;
    let lot = app.active_lot(10).await;
    let lots = &app.services().lots;

    let partial = lots
        .record_sale(
            lot.id,
            SaleInput {
                quantity: 4,
                pen_id: None,
                total_weight: dec!(2100),
                price_per_arroba: dec!(310),
                buyer_name: Some("Frigorifico Central".to_string()),
                sale_date: None,
            },
            OPERATOR,
        )
        .await
        .unwrap();
    assert_eq!(partial.lot.status, LotStatus::Active);
    assert_eq!(partial.lot.sold_quantity, 4);
    // 2100 / 15 * 310
    assert_eq!(partial.sale.total_value.round_dp(2), dec!(43400));

    let err = lots
        .record_sale(
            lot.id,
            SaleInput {
                quantity: 7,
                pen_id: None,
                total_weight: dec!(3000),
                price_per_arroba: dec!(310),
                buyer_name: None,
                sale_date: None,
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientLotQuantity { available: 6, .. });

    let rest = lots
        .record_sale(
            lot.id,
            SaleInput {
                quantity: 6,
                pen_id: None,
                total_weight: dec!(3150),
                price_per_arroba: dec!(310),
                buyer_name: None,
                sale_date: None,
            },
            OPERATOR,
        )
        .await
        .unwrap();
    assert_eq!(rest.lot.status, LotStatus::Sold);
    assert_eq!(rest.lot.current_quantity, 0);
    assert_conserved(&rest.lot);

    let err = lots
        .record_mortality(
            lot.id,
            MortalityInput {
                quantity: 1,
                pen_id: None,
                cause: "late".to_string(),
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn close_requires_empty_pens() {
    let app = TestApp::new().await;
    let pen = app.create_pen("A-01", 20).await;
    let lot = app.active_lot(10).await;
    let created = app
        .services()
        .allocations
        .allocate(
            lot.id,
            vec![PenAllocationRequest {
                pen_id: pen.id,
                quantity: 10,
            }],
            OPERATOR,
        )
        .await
        .unwrap();

    let err = app.services().lots.close_lot(lot.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    app.services()
        .allocations
        .remove_allocation(created[0].id, "Closing", OPERATOR)
        .await
        .unwrap();
    let closed = app.services().lots.close_lot(lot.id).await.unwrap();
    assert_eq!(closed.status, LotStatus::Closed);

    assert_matches!(
        app.services().lots.close_lot(lot.id).await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn metrics_use_latest_weighing() {
    let app = TestApp::new().await;
    let lot = app.active_lot(10).await;
    let lots = &app.services().lots;

    // Entry: 3000 kg for 10 head
    let before = lots.lot_metrics(lot.id, None).await.unwrap();
    assert_eq!(before.average_weight, dec!(300));
    assert_eq!(before.cost_per_head.round_dp(2), dec!(10000));
    // 100000 / (300 * 10 / 15)
    assert_eq!(before.cost_per_arroba.round_dp(2), dec!(500));

    lots.record_weight(
        lot.id,
        WeightInput {
            total_weight: dec!(4000),
            animal_count: 10,
            reading_date: None,
            notes: None,
        },
        OPERATOR,
    )
    .await
    .unwrap();

    let as_of = Utc::now() + Duration::days(30);
    let after = lots.lot_metrics(lot.id, Some(as_of)).await.unwrap();
    assert_eq!(after.average_weight, dec!(400));
    assert_eq!(after.current_weight, dec!(4000));
    assert_eq!(after.cost_per_arroba.round_dp(2), dec!(375));
    assert!(after.days_in_confinement >= 29);

    let err = lots
        .record_weight(
            lot.id,
            WeightInput {
                total_weight: dec!(4400),
                animal_count: 11,
                reading_date: None,
                notes: None,
            },
            OPERATOR,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn weight_loss_is_valued_at_entry_cost_per_kg() {
    let app = TestApp::new().await;
    let lot = app.active_lot(10).await;

    let expense = app
        .services()
        .lots
        .record_weight_loss(
            lot.id,
            WeightLossInput {
                expected_weight: dec!(3000),
                actual_weight: dec!(2940),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(expense.expense_type, NonCashExpenseType::WeightLoss);
    // 60 kg * (100000 / 3000)
    assert_eq!(expense.total_value.round_dp(2), dec!(2000));
}

#[tokio::test]
async fn movement_history_is_newest_first() {
    let app = TestApp::new().await;
    let pen_a = app.create_pen("A-01", 20).await;
    let pen_b = app.create_pen("B-01", 20).await;
    let lot = app.active_lot(10).await;

    app.services()
        .allocations
        .allocate(
            lot.id,
            vec![
                PenAllocationRequest {
                    pen_id: pen_a.id,
                    quantity: 6,
                },
                PenAllocationRequest {
                    pen_id: pen_b.id,
                    quantity: 4,
                },
            ],
            OPERATOR,
        )
        .await
        .unwrap();
    app.services()
        .lots
        .record_mortality(
            lot.id,
            MortalityInput {
                quantity: 1,
                pen_id: Some(pen_b.id),
                cause: "Injury".to_string(),
            },
            OPERATOR,
        )
        .await
        .unwrap();

    let history = app
        .services()
        .lots
        .movement_history(lot.id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    assert_eq!(history[0].movement_type, MovementType::Mortality);
    assert_eq!(history[0].from_pen_id, Some(pen_b.id));
    assert!(history.iter().all(|m| m.user_id == OPERATOR));

    let limited = app
        .services()
        .lots
        .movement_history(lot.id, Some(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, history[0].id);
}

#[tokio::test]
async fn unknown_lot_is_not_found() {
    let app = TestApp::new().await;
    assert_matches!(
        app.services().lots.get_lot(uuid::Uuid::new_v4()).await,
        Err(ServiceError::LotNotFound(_))
    );
}
