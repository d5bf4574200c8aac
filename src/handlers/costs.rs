use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{patch, post},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, UserId};
use crate::entities::cattle_lot;
use crate::errors::ServiceError;
use crate::services::costs::{CostBatch, CostInput, SplitCostInput};
use crate::{ApiResponse, ApiResult, AppState};

pub fn cost_routes() -> Router<AppState> {
    Router::new()
        .route("/cattle-lots/:id/costs", patch(post_lot_cost))
        .route("/pens/:id/costs", post(post_pen_cost))
        .route("/costs/global", post(post_global_cost))
        .route("/costs/split", post(post_split_cost))
}

#[utoipa::path(
    patch,
    path = "/api/v1/cattle-lots/:id/costs",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = CostInput,
    responses(
        (status = 200, description = "Cost added to the lot", body = ApiResponse<cattle_lot::Model>),
        (status = 400, description = "Zero amount or reversal below zero", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse)
    ),
    tag = "costs"
)]
pub async fn post_lot_cost(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<CostInput>,
) -> ApiResult<cattle_lot::Model> {
    let lot = state
        .services
        .costs
        .post_cost(id, payload, user.as_str())
        .await?;
    Ok(Json(ApiResponse::success(lot)))
}

#[utoipa::path(
    post,
    path = "/api/v1/pens/:id/costs",
    params(("id" = Uuid, Path, description = "Pen ID")),
    request_body = CostInput,
    responses(
        (status = 201, description = "Cost spread over the lots in the pen", body = ApiResponse<CostBatch>),
        (status = 400, description = "Pen is empty", body = crate::errors::ErrorResponse)
    ),
    tag = "costs"
)]
pub async fn post_pen_cost(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<CostInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let batch = state
        .services
        .costs
        .post_pen_cost(id, payload, user.as_str())
        .await?;
    Ok(created_response(batch))
}

#[utoipa::path(
    post,
    path = "/api/v1/costs/global",
    request_body = CostInput,
    responses(
        (status = 201, description = "Cost spread over every active lot", body = ApiResponse<CostBatch>),
        (status = 400, description = "No active lots", body = crate::errors::ErrorResponse)
    ),
    tag = "costs"
)]
pub async fn post_global_cost(
    State(state): State<AppState>,
    user: UserId,
    Json(payload): Json<CostInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let batch = state
        .services
        .costs
        .post_global_cost(payload, user.as_str())
        .await?;
    Ok(created_response(batch))
}

#[utoipa::path(
    post,
    path = "/api/v1/costs/split",
    request_body = SplitCostInput,
    responses(
        (status = 201, description = "Cost split by explicit percentages", body = ApiResponse<CostBatch>),
        (status = 400, description = "Percentages do not add up to 100", body = crate::errors::ErrorResponse)
    ),
    tag = "costs"
)]
pub async fn post_split_cost(
    State(state): State<AppState>,
    user: UserId,
    Json(payload): Json<SplitCostInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let batch = state
        .services
        .costs
        .post_split_cost(payload, user.as_str())
        .await?;
    Ok(created_response(batch))
}
