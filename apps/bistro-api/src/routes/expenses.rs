use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use bistro_core::report::ExpenseSummary;
use bistro_core::validation::{validate_name, validate_optional_text, validate_payment_amount};
use bistro_core::{Expense, ExpenseCategory, PaymentMethod};
use bistro_db::{business_date, new_id, ExpenseFilter};

use crate::error::{ApiError, ApiResult};
use crate::services::report_service::{PeriodQuery, Report};
use crate::services::ReportService;
use crate::state::SharedState;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/summary", get(summary))
        .route(
            "/expenses/{id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseRequest {
    pub category: ExpenseCategory,
    pub description: String,
    pub amount_cents: i64,
    pub vendor: Option<String>,
    pub paid_via: Option<PaymentMethod>,
    /// Defaults to today's business date.
    pub expense_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub created_by: String,
}

impl ExpenseRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_name("description", &self.description)?;
        validate_payment_amount(self.amount_cents)?;
        validate_optional_text("vendor", self.vendor.as_deref(), 200)?;
        validate_optional_text("reference", self.reference.as_deref(), 100)?;
        validate_name("created_by", &self.created_by)?;
        Ok(())
    }
}

async fn list_expenses(
    State(state): State<SharedState>,
    Query(filter): Query<ExpenseFilter>,
) -> ApiResult<Json<Vec<Expense>>> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(ApiError::validation("from must not be after to"));
        }
    }
    Ok(Json(state.db.expenses().list(&filter).await?))
}

async fn get_expense(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Expense>> {
    let expense = state
        .db
        .expenses()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Expense", &id))?;
    Ok(Json(expense))
}

async fn create_expense(
    State(state): State<SharedState>,
    Json(request): Json<ExpenseRequest>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    request.validate()?;
    let now = Utc::now();
    let expense = Expense {
        id: new_id(),
        category: request.category,
        description: request.description.trim().to_string(),
        amount_cents: request.amount_cents,
        vendor: request.vendor,
        paid_via: request.paid_via,
        expense_date: request.expense_date.unwrap_or_else(|| business_date(now)),
        reference: request.reference,
        created_by: request.created_by.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    let created = state.db.expenses().insert(&expense).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_expense(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ExpenseRequest>,
) -> ApiResult<Json<Expense>> {
    request.validate()?;
    let existing = state
        .db
        .expenses()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Expense", &id))?;

    let updated = state
        .db
        .expenses()
        .update(&Expense {
            category: request.category,
            description: request.description.trim().to_string(),
            amount_cents: request.amount_cents,
            vendor: request.vendor,
            paid_via: request.paid_via,
            expense_date: request.expense_date.unwrap_or(existing.expense_date),
            reference: request.reference,
            updated_at: Utc::now(),
            ..existing
        })
        .await?;
    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.expenses().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn summary(
    State(state): State<SharedState>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<Report<ExpenseSummary>>> {
    Ok(Json(ReportService::new(&state).expenses(query).await?))
}
