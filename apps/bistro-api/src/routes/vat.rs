use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use bistro_core::vat::{VatConfig, VatPreset, VAT_PRESETS};
use bistro_core::VatSettings;

use crate::error::{ApiError, ApiResult};
use crate::services::vat_service::{PreviewRequest, PreviewResponse, VatSettingsRequest};
use crate::services::VatService;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/vat/presets", get(presets))
        .route("/vat/settings", get(list_settings).post(create_settings))
        .route(
            "/vat/settings/{id}",
            get(get_settings).put(update_settings).delete(delete_settings),
        )
        .route("/vat/settings/{id}/activate", post(activate_settings))
        .route("/vat/active", get(active))
        .route("/vat/preview", post(preview))
}

/// The rules new bills use right now.
#[derive(Debug, Serialize)]
pub struct ActiveVat {
    /// `None` when nothing is configured and standard VAT applies.
    pub settings: Option<VatSettings>,
    pub config: VatConfig,
}

async fn presets() -> Json<Vec<VatPreset>> {
    Json(VAT_PRESETS.to_vec())
}

async fn list_settings(State(state): State<SharedState>) -> ApiResult<Json<Vec<VatSettings>>> {
    Ok(Json(state.db.vat().list().await?))
}

async fn get_settings(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VatSettings>> {
    let settings = state
        .db
        .vat()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("VAT settings", &id))?;
    Ok(Json(settings))
}

async fn create_settings(
    State(state): State<SharedState>,
    Json(request): Json<VatSettingsRequest>,
) -> ApiResult<(StatusCode, Json<VatSettings>)> {
    let created = VatService::new(&state).create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_settings(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<VatSettingsRequest>,
) -> ApiResult<Json<VatSettings>> {
    Ok(Json(VatService::new(&state).update(&id, request).await?))
}

async fn delete_settings(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.vat().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_settings(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VatSettings>> {
    Ok(Json(state.db.vat().activate(&id).await?))
}

async fn active(State(state): State<SharedState>) -> ApiResult<Json<ActiveVat>> {
    let (settings, config) = VatService::new(&state).active_config().await?;
    Ok(Json(ActiveVat { settings, config }))
}

async fn preview(
    State(state): State<SharedState>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    Ok(Json(VatService::new(&state).preview(request).await?))
}
