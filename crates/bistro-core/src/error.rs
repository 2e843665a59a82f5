//! # Error Types
//!
//! Domain-specific error types for bistro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bistro-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bistro-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  bistro-api errors (in app)                                            │
//! │  └── ApiError         - What HTTP clients see (serialized)             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Menu item cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Ingredient cannot be found.
    #[error("Ingredient not found: {0}")]
    IngredientNotFound(String),

    /// Not enough stock at a location to complete a movement.
    ///
    /// ## When This Occurs
    /// - Transferring more than the source location holds
    /// - Issuing stock the store does not have
    /// - Offline deductions replayed against a drained balance
    #[error("Insufficient stock for {ingredient} at {location}: available {available}, requested {requested}")]
    InsufficientStock {
        ingredient: String,
        location: String,
        available: i64,
        requested: i64,
    },

    /// Source and destination of a transfer are the same location.
    #[error("Cannot transfer stock from {0} to itself")]
    SameLocationTransfer(String),

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Sale is not in a state that allows the requested operation.
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// A sale needs at least one line.
    #[error("Sale has no items")]
    EmptySale,

    /// Payment amount is invalid.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// A payment session was asked to move to a state it cannot reach.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// A card or wallet session outlived its TTL.
    #[error("{entity} {id} has expired")]
    SessionExpired { entity: String, id: String },

    /// Requested wallet provider is not in the catalog.
    #[error("Unknown wallet provider: {0}")]
    UnknownWalletProvider(String),

    /// Refund exceeds what is left to refund.
    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsCaptured { requested: i64, refundable: i64 },

    /// Conflict already left the pending state.
    #[error("Conflict {id} is already {status}")]
    ConflictAlreadyClosed { id: String, status: String },

    /// Strategy is not applicable to the conflict kind.
    #[error("Strategy {strategy} cannot resolve a {kind} conflict; use one of: {allowed}")]
    StrategyNotApplicable {
        strategy: String,
        kind: String,
        allowed: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid phone number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value in a request (e.g. same ingredient twice in a transfer).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
