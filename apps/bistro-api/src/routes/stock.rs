//! # Stock Routes
//!
//! Balances are always derived from the movement ledger. Transfers and
//! issues write both legs inside one database transaction (see
//! [`StockRepository::transfer`](bistro_db::StockRepository::transfer)).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use bistro_core::stock::{low_stock, AdjustmentRequest, LowStockItem, StockBalance, TransferLine};
use bistro_core::validation::validate_name;
use bistro_core::{StockIssue, StockIssueKind, StockTransaction};
use bistro_db::{MovementFilter, NewStockIssue, StockIssueDetail};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const DEFAULT_ISSUE_LIMIT: u32 = 50;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/stock/balances", get(balances))
        .route("/stock/movements", get(movements))
        .route("/stock/low", get(low))
        .route("/stock/transfers", post(create_transfer))
        .route("/stock/issues", get(list_issues).post(create_issue))
        .route("/stock/issues/{id}", get(get_issue))
        .route("/stock/issues/{id}/cancel", post(cancel_issue))
        .route("/stock/adjustments", post(adjust))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceQuery {
    pub location_id: Option<String>,
    pub ingredient_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueListQuery {
    pub kind: Option<StockIssueKind>,
    pub limit: Option<u32>,
}

/// Body of a transfer or issue; the kind comes from the route.
#[derive(Debug, Clone, Deserialize)]
pub struct StockDocumentRequest {
    pub from_location_id: String,
    pub to_location_id: String,
    pub lines: Vec<TransferLine>,
    pub issued_by: String,
    pub notes: Option<String>,
}

impl StockDocumentRequest {
    fn into_issue(self, kind: StockIssueKind) -> ApiResult<NewStockIssue> {
        validate_name("issued_by", &self.issued_by)?;
        Ok(NewStockIssue {
            kind,
            from_location_id: self.from_location_id,
            to_location_id: self.to_location_id,
            lines: self.lines,
            issued_by: self.issued_by.trim().to_string(),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelIssueRequest {
    pub cancelled_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustRequest {
    #[serde(flatten)]
    pub adjustment: AdjustmentRequest,
    pub created_by: String,
}

async fn balances(
    State(state): State<SharedState>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<Json<Vec<StockBalance>>> {
    let rows = state
        .db
        .stock()
        .balances(query.location_id.as_deref(), query.ingredient_id.as_deref())
        .await?;
    Ok(Json(rows))
}

async fn movements(
    State(state): State<SharedState>,
    Query(filter): Query<MovementFilter>,
) -> ApiResult<Json<Vec<StockTransaction>>> {
    Ok(Json(state.db.stock().movements(&filter).await?))
}

async fn low(
    State(state): State<SharedState>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<Json<Vec<LowStockItem>>> {
    if let Some(loc) = &query.location_id {
        if !state.db.locations().exists(loc).await? {
            return Err(ApiError::not_found("Location", loc));
        }
    }
    let ingredients = state.db.ingredients().list(false).await?;
    let balances = state.db.stock().balance_map().await?;
    Ok(Json(low_stock(
        &ingredients,
        &balances,
        query.location_id.as_deref(),
    )))
}

async fn create_transfer(
    State(state): State<SharedState>,
    Json(request): Json<StockDocumentRequest>,
) -> ApiResult<(StatusCode, Json<StockIssueDetail>)> {
    let issue = request.into_issue(StockIssueKind::Transfer)?;
    let detail = state.db.stock().transfer(&issue).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn create_issue(
    State(state): State<SharedState>,
    Json(request): Json<StockDocumentRequest>,
) -> ApiResult<(StatusCode, Json<StockIssueDetail>)> {
    let issue = request.into_issue(StockIssueKind::Issue)?;
    let detail = state.db.stock().transfer(&issue).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_issues(
    State(state): State<SharedState>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<Json<Vec<StockIssue>>> {
    let limit = query.limit.unwrap_or(DEFAULT_ISSUE_LIMIT).clamp(1, 500);
    Ok(Json(state.db.stock().list_issues(query.kind, limit).await?))
}

async fn get_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StockIssueDetail>> {
    let detail = state
        .db
        .stock()
        .get_issue(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Stock issue", &id))?;
    Ok(Json(detail))
}

async fn cancel_issue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<CancelIssueRequest>,
) -> ApiResult<Json<StockIssueDetail>> {
    validate_name("cancelled_by", &request.cancelled_by)?;
    let detail = state
        .db
        .stock()
        .cancel_issue(&id, request.cancelled_by.trim())
        .await?;
    Ok(Json(detail))
}

async fn adjust(
    State(state): State<SharedState>,
    Json(request): Json<AdjustRequest>,
) -> ApiResult<(StatusCode, Json<StockTransaction>)> {
    validate_name("created_by", &request.created_by)?;
    let row = state
        .db
        .stock()
        .adjust(&request.adjustment, request.created_by.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}
