use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use bistro_core::Sale;
use bistro_db::SaleFilter;

use crate::error::ApiResult;
use crate::services::receipt_service::{ReceiptQuery, RenderedReceipt};
use crate::services::sale_service::{CreateSaleRequest, SaleDetail, VoidSaleRequest};
use crate::services::{ReceiptService, SaleService};
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/{id}", get(get_sale))
        .route("/sales/{id}/void", post(void_sale))
        .route("/sales/{id}/receipt", get(receipt))
}

async fn create_sale(
    State(state): State<SharedState>,
    Json(request): Json<CreateSaleRequest>,
) -> ApiResult<(StatusCode, Json<SaleDetail>)> {
    let detail = SaleService::new(&state).create(request).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_sale(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleDetail>> {
    Ok(Json(SaleService::new(&state).get(&id).await?))
}

async fn list_sales(
    State(state): State<SharedState>,
    Query(filter): Query<SaleFilter>,
) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(SaleService::new(&state).list(&filter).await?))
}

async fn void_sale(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<VoidSaleRequest>,
) -> ApiResult<Json<Sale>> {
    Ok(Json(SaleService::new(&state).void(&id, request).await?))
}

/// `GET /api/sales/{id}/receipt?lang=si&format=text|html|json&width=42`
async fn receipt(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ReceiptQuery>,
) -> ApiResult<Response> {
    let rendered = ReceiptService::new(&state).render(&id, &query).await?;
    Ok(match rendered {
        RenderedReceipt::Text(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        RenderedReceipt::Html(html) => Html(html).into_response(),
        RenderedReceipt::Json(doc) => Json(doc).into_response(),
    })
}
