use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use bistro_core::conflict::{OfflineBatch, SyncOutcome};
use bistro_core::SyncConflict;
use bistro_db::ConflictFilter;

use crate::error::ApiResult;
use crate::services::sync_service::{IgnoreRequest, ResolveRequest};
use crate::services::SyncService;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/sync/upload", post(upload))
        .route("/sync/status", get(status))
        .route("/sync/conflicts", get(list_conflicts))
        .route("/sync/conflicts/{id}", get(get_conflict))
        .route("/sync/conflicts/{id}/resolve", post(resolve))
        .route("/sync/conflicts/{id}/ignore", post(ignore))
}

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub pending_conflicts: i64,
}

async fn upload(
    State(state): State<SharedState>,
    Json(batch): Json<OfflineBatch>,
) -> ApiResult<Json<SyncOutcome>> {
    Ok(Json(SyncService::new(&state).upload(batch).await?))
}

async fn status(State(state): State<SharedState>) -> ApiResult<Json<SyncStatus>> {
    let pending_conflicts = state.db.sync().pending_count().await?;
    Ok(Json(SyncStatus { pending_conflicts }))
}

async fn list_conflicts(
    State(state): State<SharedState>,
    Query(filter): Query<ConflictFilter>,
) -> ApiResult<Json<Vec<SyncConflict>>> {
    Ok(Json(SyncService::new(&state).list_conflicts(&filter).await?))
}

async fn get_conflict(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SyncConflict>> {
    Ok(Json(SyncService::new(&state).get_conflict(&id).await?))
}

async fn resolve(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<SyncConflict>> {
    Ok(Json(SyncService::new(&state).resolve(&id, request).await?))
}

async fn ignore(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<IgnoreRequest>,
) -> ApiResult<Json<SyncConflict>> {
    Ok(Json(SyncService::new(&state).ignore(&id, request).await?))
}
