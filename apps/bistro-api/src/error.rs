//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Bistro POS                             │
//! │                                                                         │
//! │  Handler → Result<Json<T>, ApiError>                                    │
//! │              │                                                          │
//! │              ├── DbError::NotFound ───────────────► 404 NOT_FOUND       │
//! │              ├── ValidationError ─────────────────► 400 VALIDATION_ERROR│
//! │              ├── CoreError::InsufficientStock ────► 409 INSUFFICIENT_…  │
//! │              ├── CoreError (state rules) ─────────► 422 BUSINESS_LOGIC  │
//! │              ├── GatewayError::Declined ──────────► 402 PAYMENT_DECLINED│
//! │              └── DbError::QueryFailed ─── logged ─► 500 DATABASE_ERROR  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clients receive:
//! ```json
//! { "code": "NOT_FOUND", "message": "Sale not found: 6f1c…" }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use bistro_core::{CoreError, ValidationError};
use bistro_db::DbError;

use crate::services::gateway::GatewayError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Duplicate or stale write (409)
    Conflict,

    /// Business rule rejected the operation (422)
    BusinessLogic,

    /// Not enough stock at a location (409)
    InsufficientStock,

    /// Payment could not be processed (422)
    PaymentError,

    /// Gateway declined the payment (402)
    PaymentDeclined,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict | ErrorCode::InsufficientStock => StatusCode::CONFLICT,
            ErrorCode::BusinessLogic | ErrorCode::PaymentError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BusinessLogic, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::CheckViolation(message) => {
                tracing::warn!("Check constraint violation: {}", message);
                ApiError::validation("Value violates a constraint")
            }
            DbError::Core(core) => core.into(),
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::ProductNotFound(id) => ApiError::not_found("Product", &id),
            CoreError::IngredientNotFound(id) => ApiError::not_found("Ingredient", &id),
            CoreError::SaleNotFound(id) => ApiError::not_found("Sale", &id),
            CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, message)
            }
            CoreError::InvalidPaymentAmount { .. }
            | CoreError::RefundExceedsCaptured { .. }
            | CoreError::UnknownWalletProvider(_)
            | CoreError::SessionExpired { .. } => ApiError::new(ErrorCode::PaymentError, message),
            CoreError::ConflictAlreadyClosed { .. } => ApiError::new(ErrorCode::Conflict, message),
            CoreError::Validation(v) => v.into(),
            CoreError::SameLocationTransfer(_)
            | CoreError::InvalidSaleStatus { .. }
            | CoreError::EmptySale
            | CoreError::InvalidTransition { .. }
            | CoreError::StrategyNotApplicable { .. } => ApiError::business(message),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(e) => {
                tracing::error!("Payment gateway unavailable: {}", e);
                ApiError::new(ErrorCode::PaymentError, "Payment gateway unavailable")
            }
            other => ApiError::new(ErrorCode::PaymentDeclined, other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let err = ApiError::not_found("Sale", "abc");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Sale not found: abc");
    }

    #[test]
    fn test_db_core_error_keeps_its_meaning() {
        let err: ApiError = DbError::Core(CoreError::InsufficientStock {
            ingredient: "Chicken".into(),
            location: "Hot Kitchen".into(),
            available: 100,
            requested: 150,
        })
        .into();
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(err.code.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_query_failure_hides_details() {
        let err: ApiError = DbError::QueryFailed("no such column: secret".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err: ApiError = CoreError::Validation(ValidationError::required("name")).into();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.code.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "name is required");
    }

    #[test]
    fn test_gateway_decline() {
        let err: ApiError = GatewayError::InsufficientFunds.into();
        assert_eq!(err.code, ErrorCode::PaymentDeclined);
        assert_eq!(err.code.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
