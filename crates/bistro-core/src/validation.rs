//! # Validation Module
//!
//! Input validation utilities for Bistro POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP extractor (axum Json / Query)                           │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Service                                                      │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bistro_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("KOTTU-CHK").unwrap();
//! validate_quantity(2).unwrap();
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES, MAX_STOCK_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ```rust
/// use bistro_core::validation::validate_sku;
///
/// assert!(validate_sku("RICE-CHK").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a display name (product, category, ingredient, location).
///
/// Length is counted in characters so Sinhala and Tamil names are not
/// penalised for multi-byte encoding.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an optional free-text field (notes, descriptions).
pub fn validate_optional_text(field: &str, text: Option<&str>, max: usize) -> ValidationResult<()> {
    match text {
        Some(t) if t.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates a search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

/// Validates a Sri Lankan mobile number.
///
/// Accepts `07XXXXXXXX`, `947XXXXXXXX` and `+947XXXXXXXX` (spaces and
/// hyphens ignored). Returns the number normalised to `+947XXXXXXXX`.
///
/// ```rust
/// use bistro_core::validation::validate_phone;
///
/// assert_eq!(validate_phone("077 123 4567").unwrap(), "+94771234567");
/// assert!(validate_phone("0112345678").is_err());
/// ```
pub fn validate_phone(phone: &str) -> ValidationResult<String> {
    let digits: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if digits.is_empty() {
        return Err(ValidationError::required("phone"));
    }

    let local = if let Some(rest) = digits.strip_prefix("+94") {
        rest
    } else if let Some(rest) = digits.strip_prefix("94") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        return Err(ValidationError::invalid(
            "phone",
            "must start with 07, 947 or +947",
        ));
    };

    if local.len() != 9 || !local.starts_with('7') || !local.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid(
            "phone",
            "must be a Sri Lankan mobile number (07XXXXXXXX)",
        ));
    }

    Ok(format!("+94{local}"))
}

/// Validates a card number with the Luhn checksum.
///
/// Only called on the simulated terminal path; the number itself is never
/// stored (see [`crate::payment::mask_card_number`]).
pub fn validate_card_number(number: &str) -> ValidationResult<String> {
    let digits: String = number.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();

    if digits.is_empty() {
        return Err(ValidationError::required("card_number"));
    }

    if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid(
            "card_number",
            "must be 12 to 19 digits",
        ));
    }

    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    if sum % 10 != 0 {
        return Err(ValidationError::invalid("card_number", "checksum failed"));
    }

    Ok(digits)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock movement quantity in base units (g, ml, pcs).
pub fn validate_stock_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_STOCK_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_STOCK_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (complimentary items).
///
/// ```rust
/// use bistro_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(125_000).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a non-negative amount for a named field (discount, expense).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a payment amount in cents. Must be positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0 - 10000).
pub fn validate_bps(field: &str, bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on one sale.
pub fn validate_sale_lines(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required("items"));
    }
    if count > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string.
///
/// ```rust
/// use bistro_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required("id"));
    }

    uuid::Uuid::parse_str(id)
        .map_err(|_| ValidationError::invalid("id", "must be a valid UUID"))?;

    Ok(())
}

/// Validates a receipt language code (`en`, `si`, `ta`).
pub fn validate_language_code(code: &str) -> ValidationResult<()> {
    match code.trim().to_lowercase().as_str() {
        "en" | "si" | "ta" => Ok(()),
        _ => Err(ValidationError::NotAllowed {
            field: "lang".to_string(),
            allowed: vec!["en".into(), "si".into(), "ta".into()],
        }),
    }
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates a report / listing range: `from` must not be after `to`.
pub fn validate_date_range(from: DateTime<Utc>, to: DateTime<Utc>) -> ValidationResult<()> {
    if from > to {
        return Err(ValidationError::invalid("from", "must not be after 'to'"));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
