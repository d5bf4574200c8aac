use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::created_response;
use crate::entities::{pen, PenStatus};
use crate::errors::ServiceError;
use crate::services::pens::{CreatePenInput, PenOccupancyView, PenStats, UpdatePenInput};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct PenListQuery {
    pub status: Option<PenStatus>,
    /// Hide deactivated pens
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailablePensQuery {
    /// Minimum free places, 1 when omitted
    pub min_free: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePenStatusRequest {
    pub status: PenStatus,
}

pub fn pen_routes() -> Router<AppState> {
    Router::new()
        .route("/pens", post(create_pen).get(list_pens))
        .route("/pens/stats", get(pen_stats))
        .route("/pens/available", get(available_pens))
        .route("/pens/:id", get(get_pen).patch(update_pen))
        .route("/pens/:id/status", patch(update_pen_status))
        .route("/pens/:id/occupancy", get(pen_occupancy))
        .route("/pens/:id/deactivate", post(deactivate_pen))
}

#[utoipa::path(
    post,
    path = "/api/v1/pens",
    request_body = CreatePenInput,
    responses(
        (status = 201, description = "Pen created", body = ApiResponse<pen::Model>),
        (status = 409, description = "Pen number in use", body = crate::errors::ErrorResponse)
    ),
    tag = "pens"
)]
pub async fn create_pen(
    State(state): State<AppState>,
    Json(payload): Json<CreatePenInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let pen = state.services.pens.create_pen(payload).await?;
    Ok(created_response(pen))
}

#[utoipa::path(
    get,
    path = "/api/v1/pens",
    params(PenListQuery),
    responses(
        (status = 200, description = "Pens listed", body = ApiResponse<Vec<pen::Model>>)
    ),
    tag = "pens"
)]
pub async fn list_pens(
    State(state): State<AppState>,
    Query(query): Query<PenListQuery>,
) -> ApiResult<Vec<pen::Model>> {
    let pens = state
        .services
        .pens
        .list_pens(query.status, query.active_only)
        .await?;
    Ok(Json(ApiResponse::success(pens)))
}

#[utoipa::path(
    get,
    path = "/api/v1/pens/stats",
    responses(
        (status = 200, description = "Occupation summary", body = ApiResponse<PenStats>)
    ),
    tag = "pens"
)]
pub async fn pen_stats(State(state): State<AppState>) -> ApiResult<PenStats> {
    let stats = state.services.pens.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[utoipa::path(
    get,
    path = "/api/v1/pens/available",
    params(AvailablePensQuery),
    responses(
        (status = 200, description = "Pens with free places", body = ApiResponse<Vec<pen::Model>>)
    ),
    tag = "pens"
)]
pub async fn available_pens(
    State(state): State<AppState>,
    Query(query): Query<AvailablePensQuery>,
) -> ApiResult<Vec<pen::Model>> {
    let pens = state.services.pens.find_available(query.min_free).await?;
    Ok(Json(ApiResponse::success(pens)))
}

#[utoipa::path(
    get,
    path = "/api/v1/pens/:id",
    params(("id" = Uuid, Path, description = "Pen ID")),
    responses(
        (status = 200, description = "Pen fetched", body = ApiResponse<pen::Model>),
        (status = 404, description = "Pen not found", body = crate::errors::ErrorResponse)
    ),
    tag = "pens"
)]
pub async fn get_pen(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<pen::Model> {
    let pen = state.services.pens.get_pen(id).await?;
    Ok(Json(ApiResponse::success(pen)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/pens/:id",
    params(("id" = Uuid, Path, description = "Pen ID")),
    request_body = UpdatePenInput,
    responses(
        (status = 200, description = "Pen updated", body = ApiResponse<pen::Model>),
        (status = 400, description = "Capacity below occupancy", body = crate::errors::ErrorResponse)
    ),
    tag = "pens"
)]
pub async fn update_pen(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePenInput>,
) -> ApiResult<pen::Model> {
    let pen = state.services.pens.update_pen(id, payload).await?;
    Ok(Json(ApiResponse::success(pen)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/pens/:id/status",
    params(("id" = Uuid, Path, description = "Pen ID")),
    request_body = UpdatePenStatusRequest,
    responses(
        (status = 200, description = "Status applied", body = ApiResponse<pen::Model>),
        (status = 400, description = "Pen is not empty", body = crate::errors::ErrorResponse)
    ),
    tag = "pens"
)]
pub async fn update_pen_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePenStatusRequest>,
) -> ApiResult<pen::Model> {
    let pen = state.services.pens.update_status(id, payload.status).await?;
    Ok(Json(ApiResponse::success(pen)))
}

#[utoipa::path(
    get,
    path = "/api/v1/pens/:id/occupancy",
    params(("id" = Uuid, Path, description = "Pen ID")),
    responses(
        (status = 200, description = "Lots in the pen", body = ApiResponse<PenOccupancyView>)
    ),
    tag = "pens"
)]
pub async fn pen_occupancy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PenOccupancyView> {
    let view = state.services.pens.occupancy(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    post,
    path = "/api/v1/pens/:id/deactivate",
    params(("id" = Uuid, Path, description = "Pen ID")),
    responses(
        (status = 200, description = "Pen deactivated", body = ApiResponse<pen::Model>),
        (status = 400, description = "Pen is not empty", body = crate::errors::ErrorResponse)
    ),
    tag = "pens"
)]
pub async fn deactivate_pen(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<pen::Model> {
    let pen = state.services.pens.deactivate_pen(id).await?;
    Ok(Json(ApiResponse::success(pen)))
}
