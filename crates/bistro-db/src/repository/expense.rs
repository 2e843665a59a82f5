//! # Expense Repository
//!
//! Money paid out of the business, keyed by the date it was incurred.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use bistro_core::{Expense, ExpenseCategory};

const DEFAULT_LIMIT: i64 = 500;

/// Filters for [`ExpenseRepository::list`]. Date bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<ExpenseCategory>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    pub async fn list(&self, filter: &ExpenseFilter) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT * FROM expenses
            WHERE (?1 IS NULL OR expense_date >= ?1)
              AND (?2 IS NULL OR expense_date <= ?2)
              AND (?3 IS NULL OR category = ?3)
            ORDER BY expense_date DESC, created_at DESC
            LIMIT ?4
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.category)
        .bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses)
    }

    /// Every expense dated within `[from, to]`, for reports.
    pub async fn in_range(&self, from: NaiveDate, to: NaiveDate) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            "SELECT * FROM expenses WHERE expense_date >= ?1 AND expense_date <= ?2 ORDER BY expense_date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Expense>> {
        let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(expense)
    }

    pub async fn insert(&self, expense: &Expense) -> DbResult<Expense> {
        debug!(
            category = expense.category.as_str(),
            amount_cents = expense.amount_cents,
            "Inserting expense"
        );

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, category, description, amount_cents, vendor, paid_via,
                expense_date, reference, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&expense.id)
        .bind(expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(&expense.vendor)
        .bind(expense.paid_via)
        .bind(expense.expense_date)
        .bind(&expense.reference)
        .bind(&expense.created_by)
        .bind(expense.created_at)
        .bind(expense.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(expense.clone())
    }

    pub async fn update(&self, expense: &Expense) -> DbResult<Expense> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE expenses SET
                category = ?2,
                description = ?3,
                amount_cents = ?4,
                vendor = ?5,
                paid_via = ?6,
                expense_date = ?7,
                reference = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&expense.id)
        .bind(expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(&expense.vendor)
        .bind(expense.paid_via)
        .bind(expense.expense_date)
        .bind(&expense.reference)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", &expense.id));
        }

        let mut updated = expense.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{fixtures, new_id};
    use bistro_core::PaymentMethod;

    fn expense(category: ExpenseCategory, amount: i64, date: (i32, u32, u32)) -> Expense {
        let now = Utc::now();
        Expense {
            id: new_id(),
            category,
            description: format!("{} bill", category.as_str()),
            amount_cents: amount,
            vendor: Some("Keells".to_string()),
            paid_via: Some(PaymentMethod::Cash),
            expense_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            reference: None,
            created_by: "manager".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_date_and_category() {
        let db = fixtures::db().await;
        let repo = db.expenses();
        repo.insert(&expense(ExpenseCategory::Utilities, 12_500_00, (2026, 3, 1))).await.unwrap();
        repo.insert(&expense(ExpenseCategory::Ingredients, 8_000_00, (2026, 3, 2))).await.unwrap();
        repo.insert(&expense(ExpenseCategory::Ingredients, 3_000_00, (2026, 3, 9))).await.unwrap();

        let week = repo
            .list(&ExpenseFilter {
                from: NaiveDate::from_ymd_opt(2026, 3, 1),
                to: NaiveDate::from_ymd_opt(2026, 3, 7),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(week.len(), 2);

        let ingredients = repo
            .list(&ExpenseFilter {
                category: Some(ExpenseCategory::Ingredients),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ingredients.len(), 2);
        // Newest first
        assert_eq!(ingredients[0].amount_cents, 3_000_00);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = fixtures::db().await;
        let repo = db.expenses();
        let mut e = expense(ExpenseCategory::Rent, 150_000_00, (2026, 3, 1));
        repo.insert(&e).await.unwrap();

        e.amount_cents = 160_000_00;
        repo.update(&e).await.unwrap();
        assert_eq!(repo.get_by_id(&e.id).await.unwrap().unwrap().amount_cents, 160_000_00);

        repo.delete(&e.id).await.unwrap();
        assert!(matches!(repo.delete(&e.id).await, Err(DbError::NotFound { .. })));
    }
}
