//! # Repository Module
//!
//! Database repository implementations for Bistro POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  axum handler → service                                                 │
//! │       │                                                                 │
//! │       │  db.stock().transfer(&request)                                  │
//! │       ▼                                                                 │
//! │  StockRepository                                                        │
//! │  ├── balances(location, ingredient)   SUM over the ledger               │
//! │  ├── transfer(request)                one transaction, 2 rows per line  │
//! │  └── adjust(request, by)                                                │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rules live in `bistro-core`; repositories read the state those
//! rules need, call them, and write the result in a single transaction.
//!
//! ## Available Repositories
//!
//! - [`CategoryRepository`] - Menu categories
//! - [`ProductRepository`] - Menu items, availability, recipes
//! - [`IngredientRepository`] / [`LocationRepository`] - Inventory master data
//! - [`StockRepository`] - Stock ledger, transfers, issues, adjustments
//! - [`SaleRepository`] - Sales, items, receipt numbers
//! - [`PaymentRepository`] - Payment transactions, card and wallet sessions
//! - [`VatRepository`] - VAT settings
//! - [`ExpenseRepository`] - Expenses
//! - [`SyncRepository`] - Offline sync conflicts and applied-record log

pub mod category;
pub mod expense;
pub mod ingredient;
pub mod location;
pub mod payment;
pub mod product;
pub mod sale;
pub mod stock;
pub mod sync;
pub mod vat;

pub use category::CategoryRepository;
pub use expense::{ExpenseFilter, ExpenseRepository};
pub use ingredient::IngredientRepository;
pub use location::LocationRepository;
pub use payment::{PaymentRecorded, PaymentRepository, SessionUpdate};
pub use product::{ProductFilter, ProductRepository};
pub use sale::{SaleFilter, SaleRepository};
pub use stock::{MovementFilter, NewStockIssue, StockIssueDetail, StockRepository};
pub use sync::{ConflictFilter, SyncRepository};
pub use vat::VatRepository;

use bistro_core::report::SRI_LANKA_OFFSET_MINUTES;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::DbResult;

/// Generates a new primary key.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trading day of `at` in restaurant local time.
pub fn business_date(at: DateTime<Utc>) -> NaiveDate {
    FixedOffset::east_opt(SRI_LANKA_OFFSET_MINUTES * 60)
        .map(|tz| at.with_timezone(&tz).date_naive())
        .unwrap_or_else(|| at.date_naive())
}

/// Allocates the next number of a daily sequence: `PREFIX-YYYYMMDD-NNNN`.
///
/// The counter row is written first, so calling this at the start of a
/// transaction also takes the SQLite write lock for the rest of it.
pub(crate) async fn next_document_number(
    conn: &mut SqliteConnection,
    prefix: &str,
    at: DateTime<Utc>,
) -> DbResult<String> {
    let day = business_date(at).format("%Y%m%d").to_string();
    let scope = format!("{prefix}-{day}");

    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_counters (scope, last_seq) VALUES (?1, 1)
        ON CONFLICT(scope) DO UPDATE SET last_seq = last_seq + 1
        RETURNING last_seq
        "#,
    )
    .bind(&scope)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format!("{scope}-{seq:04}"))
}

// =============================================================================
// Test Fixtures
// =============================================================================
