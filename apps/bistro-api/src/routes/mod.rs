//! # HTTP Routes
//!
//! Thin axum handlers: extract, call a service or repository, wrap in JSON.
//!
//! ```text
//! routes/
//! ├── mod.rs       ◄─── router assembly
//! ├── health.rs    ◄─── liveness
//! ├── catalog.rs   ◄─── categories, products, ingredients, locations
//! ├── stock.rs     ◄─── balances, movements, transfers, issues, adjustments
//! ├── sales.rs     ◄─── sales and receipts
//! ├── payments.rs  ◄─── cash, card sessions, wallet sessions, refunds
//! ├── vat.rs       ◄─── VAT presets, settings and bill preview
//! ├── expenses.rs  ◄─── expense book
//! ├── reports.rs   ◄─── aggregates over a period
//! └── sync.rs      ◄─── offline batch upload and conflict handling
//! ```

use axum::Router;

use crate::state::SharedState;

pub mod catalog;
pub mod expenses;
pub mod health;
pub mod payments;
pub mod reports;
pub mod sales;
pub mod stock;
pub mod sync;
pub mod vat;

/// Builds the full application router.
pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .merge(catalog::routes())
        .merge(stock::routes())
        .merge(sales::routes())
        .merge(payments::routes())
        .merge(vat::routes())
        .merge(expenses::routes())
        .merge(reports::routes())
        .merge(sync::routes());

    Router::new()
        .merge(health::routes())
        .nest("/api", api)
        .with_state(state)
}
