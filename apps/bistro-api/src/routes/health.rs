use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub database: bool,
    pub pending_conflicts: i64,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn ready(State(state): State<SharedState>) -> impl IntoResponse {
    match state.db.sync().pending_count().await {
        Ok(pending) => (
            StatusCode::OK,
            Json(Readiness {
                database: true,
                pending_conflicts: pending,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    database: false,
                    pending_conflicts: 0,
                }),
            )
        }
    }
}
