//! # bistro-core: Pure Business Logic for Bistro POS
//!
//! Everything a restaurant back office decides lives here as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bistro POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               bistro-api (axum controllers + services)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bistro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   types  money  vat  i18n  receipt  payment                    │   │
//! │  │   stock  conflict  report  validation                          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    bistro-db (SQLite, sqlx)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Product, Sale, StockTransaction, ...)
//! - [`money`] - Integer LKR money type
//! - [`vat`] - Sri Lankan VAT presets and bill computation
//! - [`i18n`] / [`receipt`] - Receipt text in English, Sinhala and Tamil
//! - [`payment`] - Cash settlement, card / wallet session rules, refunds
//! - [`stock`] - Per-location netting, transfer and issue planning
//! - [`conflict`] - Offline-sync conflict detection and resolution
//! - [`report`] - Sales, expense, P&L and VAT aggregates
//! - [`validation`] - Input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use bistro_core::money::Money;
//! use bistro_core::types::TaxRate;
//!
//! let price = Money::from_cents(125_000); // Rs. 1,250.00
//! let vat = price.calculate_tax(TaxRate::from_bps(1800));
//! assert_eq!(vat.cents(), 22_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod conflict;
pub mod error;
pub mod i18n;
pub mod money;
pub mod payment;
pub mod receipt;
pub mod report;
pub mod stock;
pub mod types;
pub mod validation;
pub mod vat;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines on a single sale.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single menu item on one line.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single stock movement in base units (10 tonnes / 10,000 litres).
pub const MAX_STOCK_QUANTITY: i64 = 10_000_000;
