use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, validate_input, UserId};
use crate::entities::lot_pen_allocation;
use crate::errors::ServiceError;
use crate::services::allocation::{PenAllocationRequest, TransferOutcome, TransferRequest};
use crate::{ApiResponse, ApiResult, AppState};

/// Placement of a purchased lot across pens
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AllocateLotRequest {
    #[validate(length(min = 1))]
    pub allocations: Vec<PenAllocationRequest>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RemoveAllocationQuery {
    /// Recorded on the REMOVAL movement
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LotAllocationsQuery {
    #[serde(default)]
    pub include_removed: bool,
}

pub fn allocation_routes() -> Router<AppState> {
    Router::new()
        .route("/cattle-purchases/:id/pens", post(allocate_lot))
        .route("/cattle-lots/:id/allocations", get(list_lot_allocations))
        .route("/cattle-lots/:id/transfers", post(transfer_animals))
        .route("/allocations/:id", delete(remove_allocation))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-purchases/:id/pens",
    params(("id" = Uuid, Path, description = "Lot ID of the purchase")),
    request_body = AllocateLotRequest,
    responses(
        (status = 201, description = "Allocations created", body = ApiResponse<Vec<lot_pen_allocation::Model>>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot or pen not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Pen capacity exceeded or lost to a concurrent allocation", body = crate::errors::ErrorResponse),
        (status = 422, description = "Lot does not have enough unallocated head", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn allocate_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<AllocateLotRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let allocations = state
        .services
        .allocations
        .allocate(id, payload.allocations, user.as_str())
        .await?;
    Ok(created_response(allocations))
}

#[utoipa::path(
    get,
    path = "/api/v1/cattle-lots/:id/allocations",
    params(("id" = Uuid, Path, description = "Lot ID"), LotAllocationsQuery),
    responses(
        (status = 200, description = "Allocations of the lot", body = ApiResponse<Vec<lot_pen_allocation::Model>>)
    ),
    tag = "allocations"
)]
pub async fn list_lot_allocations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LotAllocationsQuery>,
) -> ApiResult<Vec<lot_pen_allocation::Model>> {
    let allocations = state
        .services
        .allocations
        .allocations_for_lot(id, query.include_removed)
        .await?;
    Ok(Json(ApiResponse::success(allocations)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cattle-lots/:id/transfers",
    params(("id" = Uuid, Path, description = "Lot ID")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Animals moved", body = ApiResponse<TransferOutcome>),
        (status = 409, description = "Target pen capacity exceeded", body = crate::errors::ErrorResponse),
        (status = 422, description = "Source pen holds too few head of the lot", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn transfer_animals(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: UserId,
    Json(payload): Json<TransferRequest>,
) -> ApiResult<TransferOutcome> {
    let outcome = state
        .services
        .allocations
        .transfer(id, payload, user.as_str())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/allocations/:id",
    params(("id" = Uuid, Path, description = "Allocation ID"), RemoveAllocationQuery),
    responses(
        (status = 200, description = "Allocation removed", body = ApiResponse<lot_pen_allocation::Model>),
        (status = 400, description = "Allocation already removed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Allocation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "allocations"
)]
pub async fn remove_allocation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RemoveAllocationQuery>,
    user: UserId,
) -> ApiResult<lot_pen_allocation::Model> {
    let reason = query
        .reason
        .unwrap_or_else(|| "Removed from pen".to_string());
    let removed = state
        .services
        .allocations
        .remove_allocation(id, &reason, user.as_str())
        .await?;
    Ok(Json(ApiResponse::success(removed)))
}
