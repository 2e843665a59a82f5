//! Report endpoints. Every report takes `from` / `to` business dates
//! (inclusive, default today).

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use bistro_core::report::{ExpenseSummary, ProfitAndLoss, SalesSummary, VatReport};

use crate::error::ApiResult;
use crate::services::report_service::{
    HourlyReport, PeriodQuery, Report, TopItemsQuery, TopItemsReport,
};
use crate::services::ReportService;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/reports/sales-summary", get(sales_summary))
        .route("/reports/top-items", get(top_items))
        .route("/reports/hourly", get(hourly))
        .route("/reports/expenses", get(expenses))
        .route("/reports/profit-and-loss", get(profit_and_loss))
        .route("/reports/vat", get(vat))
}

async fn sales_summary(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<SalesSummary>>> {
    Ok(Json(ReportService::new(&state).sales_summary(query).await?))
}

async fn top_items(
    State(state): State<SharedState>,
    Query(query): Query<TopItemsQuery>,
) -> ApiResult<Json<Report<TopItemsReport>>> {
    Ok(Json(ReportService::new(&state).top_items(query).await?))
}

async fn hourly(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<HourlyReport>>> {
    Ok(Json(ReportService::new(&state).hourly(query).await?))
}

async fn expenses(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<ExpenseSummary>>> {
    Ok(Json(ReportService::new(&state).expenses(query).await?))
}

async fn profit_and_loss(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<ProfitAndLoss>>> {
    Ok(Json(ReportService::new(&state).profit_and_loss(query).await?))
}

async fn vat(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<VatReport>>> {
    Ok(Json(ReportService::new(&state).vat(query).await?))
}
