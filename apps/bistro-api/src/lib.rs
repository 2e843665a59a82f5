//! # Bistro API
//!
//! REST back office for the Bistro restaurant POS.
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP request                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  routes/*      extract Path / Query / Json, no business rules           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  services/*    bistro-core rules + simulated gateways                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  bistro-db     repositories, one transaction per state change           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  JSON response, or { "code": "...", "message": "..." } on error         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::router;
pub use state::{AppState, SharedState};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use bistro_db::{Database, DbConfig};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn app() -> Router {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        router(Arc::new(AppState::new(db, ApiConfig::default())))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    async fn create_burger(app: &Router) -> String {
        let (status, product) = send(
            app,
            Method::POST,
            "/api/products",
            Some(json!({ "sku": "BUR-001", "name": "Chicken Burger", "price_cents": 1000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        product["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".into()));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/products/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/products",
            Some(json!({ "sku": "bad sku!", "name": "Tea", "price_cents": 200 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_sale_paid_in_cash_completes() {
        let app = app().await;
        let product_id = create_burger(&app).await;

        let (status, sale) = send(
            &app,
            Method::POST,
            "/api/sales",
            Some(json!({
                "order_type": "takeaway",
                "cashier": "Nimal",
                "items": [{ "product_id": product_id, "quantity": 2 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        // 2000 + 18% VAT, no service charge on takeaway
        assert_eq!(sale["total_cents"], 2360);
        assert_eq!(sale["status"], "open");
        let sale_id = sale["id"].as_str().unwrap().to_string();

        let (status, paid) = send(
            &app,
            Method::POST,
            &format!("/api/sales/{sale_id}/payments/cash"),
            Some(json!({ "tendered_cents": 3000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(paid["sale_completed"], true);
        assert_eq!(paid["settlement"]["change"], 640);

        let (_, sale) = send(&app, Method::GET, &format!("/api/sales/{sale_id}"), None).await;
        assert_eq!(sale["status"], "completed");
    }

    #[tokio::test]
    async fn test_receipt_formats() {
        let app = app().await;
        let product_id = create_burger(&app).await;
        let (_, sale) = send(
            &app,
            Method::POST,
            "/api/sales",
            Some(json!({
                "cashier": "Nimal",
                "items": [{ "product_id": product_id, "quantity": 1 }]
            })),
        )
        .await;
        let sale_id = sale["id"].as_str().unwrap();

        let (status, text) =
            send(&app, Method::GET, &format!("/api/sales/{sale_id}/receipt"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.as_str().unwrap().contains("Chicken Burger"));

        let (status, doc) = send(
            &app,
            Method::GET,
            &format!("/api/sales/{sale_id}/receipt?format=json"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["receipt_number"], sale["receipt_number"]);

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/sales/{sale_id}/receipt?lang=xx"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for width in ["133", "18446744073709551615"] {
            let (status, body) = send(
                &app,
                Method::GET,
                &format!("/api/sales/{sale_id}/receipt?width={width}"),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "VALIDATION_ERROR");
        }

        let (status, text) = send(
            &app,
            Method::GET,
            &format!("/api/sales/{sale_id}/receipt?width=132"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.as_str().unwrap().lines().all(|l| l.chars().count() <= 132));
    }

    #[tokio::test]
    async fn test_vat_presets_and_default_active() {
        let app = app().await;
        let (status, presets) = send(&app, Method::GET, "/api/vat/presets", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!presets.as_array().unwrap().is_empty());

        let (status, active) = send(&app, Method::GET, "/api/vat/active", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(active["settings"].is_null());
    }

    #[tokio::test]
    async fn test_offline_duplicate_sale_raises_conflict() {
        let app = app().await;
        let product_id = create_burger(&app).await;

        let (_, sale) = send(
            &app,
            Method::POST,
            "/api/sales",
            Some(json!({
                "order_type": "takeaway",
                "cashier": "Nimal",
                "items": [{ "product_id": product_id, "quantity": 1 }]
            })),
        )
        .await;

        let batch = json!({
            "batch_id": "batch-1",
            "device_id": "till-2",
            "sales": [{
                "id": "offline-sale-1",
                "receipt_number": sale["receipt_number"],
                "order_type": "takeaway",
                "table_number": null,
                "customer_name": null,
                "cashier": "Nimal",
                "items": [{ "product_id": product_id, "quantity": 1, "unit_price_cents": 1000 }],
                "discount_cents": 0,
                "subtotal_cents": 1000,
                "service_charge_cents": 0,
                "vat_cents": 180,
                "total_cents": 1180,
                "payment_method": null,
                "notes": null,
                "created_at": sale["created_at"]
            }],
            "products": [],
            "stock_movements": []
        });

        let (status, outcome) = send(&app, Method::POST, "/api/sync/upload", Some(batch.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["conflicts"].as_array().unwrap().len(), 1);
        assert!(outcome["applied_sales"].as_array().unwrap().is_empty());
        let conflict_id = outcome["conflicts"][0]["id"].as_str().unwrap().to_string();

        // Re-uploading reports the same conflict instead of raising another
        let (_, again) = send(&app, Method::POST, "/api/sync/upload", Some(batch)).await;
        assert_eq!(again["conflicts"][0]["id"], conflict_id.as_str());

        let (status, resolved) = send(
            &app,
            Method::POST,
            &format!("/api/sync/conflicts/{conflict_id}/resolve"),
            Some(json!({ "strategy": "keep_server", "resolved_by": "manager" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "resolved");

        let (_, status_body) = send(&app, Method::GET, "/api/sync/status", None).await;
        assert_eq!(status_body["pending_conflicts"], 0);
    }
}
