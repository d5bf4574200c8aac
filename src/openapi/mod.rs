use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Feedlot API",
        version = "1.0.0",
        description = r#"
# Feedlot Management API

Tracks purchased cattle lots from reception to sale.

## Features

- **Pens**: capacity, status and occupation of every pen
- **Allocations**: placing the head of a lot across pens, never above capacity
- **Costs**: direct, per-pen, global and percentage-split cost postings
- **Metrics**: mortality rate, cost per head, cost per arroba and days in confinement
- **Movements**: an append-only audit trail of every head count change

## Callers

Write endpoints record the caller from the `X-User-Id` header. Requests without it are recorded as `system`.

## Error Handling

Every error uses the same body:

```json
{
  "error": "Conflict",
  "message": "Pen capacity exceeded",
  "timestamp": "2024-01-01T00:00:00Z",
  "retriable": false
}
```

A `409` with `retriable: true` means a concurrent request took the capacity first; the request can be replayed.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "lots", description = "Lot lifecycle, head count changes and metrics"),
        (name = "pens", description = "Pen registry and occupation"),
        (name = "allocations", description = "Lot to pen allocations and transfers"),
        (name = "costs", description = "Cost postings"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Lots
        crate::handlers::lots::create_lot,
        crate::handlers::lots::list_lots,
        crate::handlers::lots::get_lot,
        crate::handlers::lots::get_lot_metrics,
        crate::handlers::lots::receive_lot,
        crate::handlers::lots::record_mortality,
        crate::handlers::lots::record_sale,
        crate::handlers::lots::record_weight,
        crate::handlers::lots::record_weight_loss,
        crate::handlers::lots::close_lot,
        crate::handlers::lots::movement_history,

        // Pens
        crate::handlers::pens::create_pen,
        crate::handlers::pens::list_pens,
        crate::handlers::pens::pen_stats,
        crate::handlers::pens::available_pens,
        crate::handlers::pens::get_pen,
        crate::handlers::pens::update_pen,
        crate::handlers::pens::update_pen_status,
        crate::handlers::pens::pen_occupancy,
        crate::handlers::pens::deactivate_pen,

        // Allocations
        crate::handlers::allocations::allocate_lot,
        crate::handlers::allocations::list_lot_allocations,
        crate::handlers::allocations::transfer_animals,
        crate::handlers::allocations::remove_allocation,

        // Costs
        crate::handlers::costs::post_lot_cost,
        crate::handlers::costs::post_pen_cost,
        crate::handlers::costs::post_global_cost,
        crate::handlers::costs::post_split_cost,
    ),
    components(
        schemas(
            // Entities
            crate::entities::cattle_lot::Model,
            crate::entities::pen::Model,
            crate::entities::lot_pen_allocation::Model,
            crate::entities::lot_movement::Model,
            crate::entities::cost_posting::Model,
            crate::entities::weight_reading::Model,
            crate::entities::sale_record::Model,
            crate::entities::non_cash_expense::Model,
            crate::entities::LotStatus,
            crate::entities::PenStatus,
            crate::entities::PenType,
            crate::entities::AllocationStatus,
            crate::entities::MovementType,
            crate::entities::CostTarget,
            crate::entities::CostCategory,
            crate::entities::NonCashExpenseType,

            // Requests
            crate::services::lots::CreateLotInput,
            crate::services::lots::ReceiveLotInput,
            crate::services::lots::MortalityInput,
            crate::services::lots::SaleInput,
            crate::services::lots::WeightInput,
            crate::services::lots::WeightLossInput,
            crate::services::pens::CreatePenInput,
            crate::services::pens::UpdatePenInput,
            crate::handlers::pens::UpdatePenStatusRequest,
            crate::services::allocation::PenAllocationRequest,
            crate::services::allocation::TransferRequest,
            crate::handlers::allocations::AllocateLotRequest,
            crate::services::costs::CostInput,
            crate::services::costs::LotShare,
            crate::services::costs::SplitCostInput,

            // Responses
            crate::services::lots::ReceiveOutcome,
            crate::services::lots::SaleOutcome,
            crate::services::pens::PenOccupancyView,
            crate::services::pens::PenLotOccupancy,
            crate::services::pens::PenStats,
            crate::services::allocation::TransferOutcome,
            crate::services::costs::CostBatch,
            crate::calculations::LotMetrics,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
