//! Business services behind the HTTP routes.
//!
//! Each service borrows the shared [`AppState`](crate::state::AppState),
//! combines `bistro-core` rules with `bistro-db` repositories and returns
//! [`ApiError`](crate::error::ApiError) on failure.

pub mod gateway;
pub mod payment_service;
pub mod receipt_service;
pub mod report_service;
pub mod sale_service;
pub mod sync_service;
pub mod vat_service;

pub use payment_service::PaymentService;
pub use receipt_service::ReceiptService;
pub use report_service::ReportService;
pub use sale_service::SaleService;
pub use sync_service::SyncService;
pub use vat_service::VatService;
