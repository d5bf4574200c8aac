use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, success_response, UserId};
use crate::calculations::LotMetrics;
use crate::entities::{cattle_lot, lot_movement, non_cash_expense, weight_reading, LotStatus};
use crate::errors::ServiceError;
use crate::services::lots::{
    CreateLotInput, MortalityInput, ReceiveLotInput, ReceiveOutcome, SaleInput, SaleOutcome,
    WeightInput, WeightLossInput,
};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct LotListQuery {
    /// Only lots in this status
    pub status: Option<LotStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MetricsQuery {
    /// Point in time for age based metrics, now when omitted
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of movements, newest first
    pub limit: Option<u64>,
}

pub fn lot_routes() -> Router<AppState> {
    Router::new()
        .route("/cattle-lots", post(create_lot).get(list_lots))
        .route("/cattle-lots/:id", get(get_lot))
        .route("/cattle-lots/:id/metrics", get(get_lot_metrics))
        .route("/cattle-lots/:id/reception", post(receive_lot))
        .route("/cattle-lots/:id/mortality", post(record_mortality))
        .route("/cattle-lots/:id/sales", post(record_sale))
        .route("/cattle-lots/:id/weights", post(record_weight))
        .route("/cattle-lots/:id/weight-loss", post(record_weight_loss))
        .route("/cattle-lots/:id/close", post(close_lot))
        .route("/cattle-lots/:id/movements", get(movement_history))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots",
    request_body = CreateLotInput,
    responses(
        (status = 201, description = "Lot registered as PENDING", body = ApiResponse<cattle_lot::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn create_lot(
    State(state): State<AppState>,
    Json(payload): Json<CreateLotInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let lot = state.services.lots.create_lot(payload).await?;
    Ok(created_response(lot))
}

#[utoipa::path(
    get,
    path = "/api/v1/cattle-lots",
    params(LotListQuery),
    responses(
        (status = 200, description = "Lots listed", body = ApiResponse<Vec<cattle_lot::Model>>)
    ),
    tag = "lots"
)]
pub async fn list_lots(
    State(state): State<AppState>,
    Query(query): Query<LotListQuery>,
) -> ApiResult<Vec<cattle_lot::Model>> {
    let lots = state.services.lots.list_lots(query.status).await?;
    Ok(Json(ApiResponse::success(lots)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cattle-lots/:id",
    params(("id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Lot fetched", body = ApiResponse<cattle_lot::Model>),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn get_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<cattle_lot::Model> {
    let lot = state.services.lots.get_lot(id).await?;
    Ok(Json(ApiResponse::success(lot)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cattle-lots/:id/metrics",
    params(("id" = Uuid, Path, description = "Lot ID"), MetricsQuery),
    responses(
        (status = 200, description = "Derived lot metrics", body = ApiResponse<LotMetrics>),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn get_lot_metrics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<LotMetrics> {
    let metrics = state.services.lots.lot_metrics(id, query.as_of).await?;
    Ok(Json(ApiResponse::success(metrics)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/reception",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = ReceiveLotInput,
    responses(
        (status = 200, description = "Lot received", body = ApiResponse<ReceiveOutcome>),
        (status = 400, description = "Lot is not PENDING or the counts do not match", body = crate::errors::ErrorResponse),
        (status = 409, description = "Pen capacity exceeded", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn receive_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<ReceiveLotInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .lots
        .receive_lot(id, payload, user.as_str())
        .await?;
    Ok(success_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/mortality",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = MortalityInput,
    responses(
        (status = 200, description = "Mortality recorded", body = ApiResponse<cattle_lot::Model>),
        (status = 422, description = "Not enough head", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn record_mortality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<MortalityInput>,
) -> ApiResult<cattle_lot::Model> {
    let lot = state
        .services
        .lots
        .record_mortality(id, payload, user.as_str())
        .await?;
    Ok(Json(ApiResponse::success(lot)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/sales",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = SaleInput,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<SaleOutcome>),
        (status = 422, description = "Not enough head", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn record_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<SaleInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .lots
        .record_sale(id, payload, user.as_str())
        .await?;
    Ok(created_response(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/weights",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = WeightInput,
    responses(
        (status = 201, description = "Weight reading stored", body = ApiResponse<weight_reading::Model>),
        (status = 400, description = "Invalid reading", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn record_weight(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<WeightInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let reading = state
        .services
        .lots
        .record_weight(id, payload, user.as_str())
        .await?;
    Ok(created_response(reading))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/weight-loss",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = WeightLossInput,
    responses(
        (status = 201, description = "Weight loss booked as a non-cash expense", body = ApiResponse<non_cash_expense::Model>)
    ),
    tag = "lots"
)]
pub async fn record_weight_loss(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WeightLossInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let expense = state.services.lots.record_weight_loss(id, payload).await?;
    Ok(created_response(expense))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/close",
    params(("id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Lot closed", body = ApiResponse<cattle_lot::Model>),
        (status = 400, description = "Lot still has head in pens", body = crate::errors::ErrorResponse)
    ),
    tag = "lots"
)]
pub async fn close_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<cattle_lot::Model> {
    let lot = state.services.lots.close_lot(id).await?;
    Ok(Json(ApiResponse::success(lot)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cattle-lots/:id/movements",
    params(("id" = Uuid, Path, description = "Lot ID"), HistoryQuery),
    responses(
        (status = 200, description = "Movement history, newest first", body = ApiResponse<Vec<lot_movement::Model>>)
    ),
    tag = "lots"
)]
pub async fn movement_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<lot_movement::Model>> {
    let movements = state.services.lots.movement_history(id, query.limit).await?;
    Ok(Json(ApiResponse::success(movements)))
}
