//! # bistro-db: Database Layer for Bistro POS
//!
//! SQLite storage for the restaurant back office, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Bistro POS Data Flow                              │
//! │                                                                         │
//! │  HTTP handler (POST /api/sales)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  service (bistro-api) ── pure rules ──► bistro-core                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bistro-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │◄───│ sale, stock,  │    │  (embedded)  │   │   │
//! │  │   │  SqlitePool   │    │ payment, ...  │    │ 0001_*.sql   │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL) in the platform data directory                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository accessors
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per aggregate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bistro_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("bistro.db")).await?;
//! let menu = db.products().catalog().await?;
//! let balances = db.stock().balances(None, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    business_date, new_id, CategoryRepository, ConflictFilter, ExpenseFilter, ExpenseRepository,
    IngredientRepository, LocationRepository, MovementFilter, NewStockIssue, PaymentRecorded,
    PaymentRepository, ProductFilter, ProductRepository, SaleFilter, SaleRepository,
    SessionUpdate, StockIssueDetail, StockRepository, SyncRepository, VatRepository,
};
