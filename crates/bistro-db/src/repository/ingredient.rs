//! # Ingredient Repository
//!
//! Raw materials tracked by the stock ledger. Ingredients referenced by
//! ledger rows or recipes are deactivated, never deleted.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use bistro_core::Ingredient;

#[derive(Debug, Clone)]
pub struct IngredientRepository {
    pool: SqlitePool,
}

impl IngredientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        IngredientRepository { pool }
    }

    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Ingredient>> {
        let ingredients = sqlx::query_as::<_, Ingredient>(
            "SELECT * FROM ingredients WHERE is_active = 1 OR ?1 ORDER BY name",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(ingredients)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Ingredient>> {
        let ingredient = sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ingredient)
    }

    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM ingredients WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    pub async fn insert(&self, ingredient: &Ingredient) -> DbResult<Ingredient> {
        debug!(name = %ingredient.name, unit = ingredient.unit.as_str(), "Inserting ingredient");

        sqlx::query(
            r#"
            INSERT INTO ingredients (
                id, name, unit, reorder_level, unit_cost_cents,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(ingredient.unit)
        .bind(ingredient.reorder_level)
        .bind(ingredient.unit_cost_cents)
        .bind(ingredient.is_active)
        .bind(ingredient.created_at)
        .bind(ingredient.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(ingredient.clone())
    }

    pub async fn update(&self, ingredient: &Ingredient) -> DbResult<Ingredient> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE ingredients SET
                name = ?2,
                unit = ?3,
                reorder_level = ?4,
                unit_cost_cents = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(ingredient.unit)
        .bind(ingredient.reorder_level)
        .bind(ingredient.unit_cost_cents)
        .bind(ingredient.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ingredient", &ingredient.id));
        }

        Ok(Ingredient {
            updated_at: now,
            ..ingredient.clone()
        })
    }

    /// Soft delete.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE ingredients SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ingredient", id));
        }

        info!(id = %id, "Ingredient deactivated");
        Ok(())
    }
}
