use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "message": "Pen 550e8400-e29b-41d4-a716-446655440000 has capacity for 30 head, 50 requested",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    #[schema(example = "Conflict")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
    /// Whether the same request may succeed if retried
    #[serde(default)]
    pub retriable: bool,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Pen {pen_id} has capacity for {available} head, {requested} requested")]
    CapacityExceeded {
        pen_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Lot {lot_id} has {available} head available, {requested} requested")]
    InsufficientLotQuantity {
        lot_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Pen not found: {0}")]
    PenNotFound(Uuid),

    #[error("Lot not found: {0}")]
    LotNotFound(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent allocation conflict: {0}")]
    ConcurrentAllocationConflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

/// Driver messages that mean the transaction lost a race with another writer.
const SERIALIZATION_MARKERS: [&str; 5] = [
    "40001",
    "40P01",
    "could not serialize access",
    "deadlock detected",
    "database is locked",
];

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    ///
    /// Serialization failures and lock timeouts reported by the driver become
    /// [`ServiceError::ConcurrentAllocationConflict`] so callers can retry them.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        let err = error.into_db_err();
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return ServiceError::Conflict(detail);
        }
        let text = err.to_string();
        if SERIALIZATION_MARKERS.iter().any(|m| text.contains(m)) {
            return ServiceError::ConcurrentAllocationConflict(text);
        }
        ServiceError::DatabaseError(err)
    }

    /// Flattens the error produced by `TransactionTrait::transaction`.
    pub fn from_txn(err: sea_orm::TransactionError<ServiceError>) -> Self {
        match err {
            sea_orm::TransactionError::Connection(e) => ServiceError::db_error(e),
            sea_orm::TransactionError::Transaction(e) => e,
        }
    }

    /// True only when the same request may succeed on a later attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConcurrentAllocationConflict(_))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::PenNotFound(_) | Self::LotNotFound(_) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::CapacityExceeded { .. }
            | Self::ConcurrentAllocationConflict(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientLotQuantity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::ConcurrentAllocationConflict(_) => {
                "Concurrent allocation conflict, retry the request".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.response_message();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: error_message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            retriable: self.is_retriable(),
        };

        (status, Json(err)).into_response()
    }
}
