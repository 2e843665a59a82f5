//! # Category Repository
//!
//! Menu categories. Deleting a category leaves its products uncategorised
//! (`ON DELETE SET NULL`).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use bistro_core::Category;

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Lists categories in menu order.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE is_active = 1 OR ?1
            ORDER BY sort_order, name
            "#,
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    pub async fn insert(&self, category: &Category) -> DbResult<Category> {
        debug!(name = %category.name, "Inserting category");

        sqlx::query(
            r#"
            INSERT INTO categories (
                id, name, description, sort_order, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(category.clone())
    }

    pub async fn update(&self, category: &Category) -> DbResult<Category> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE categories SET
                name = ?2,
                description = ?3,
                sort_order = ?4,
                is_active = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(category.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", &category.id));
        }

        Ok(Category {
            updated_at: now,
            ..category.clone()
        })
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        info!(id = %id, "Category deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::repository::new_id;

    fn category(name: &str, sort_order: i64) -> Category {
        let now = Utc::now();
        Category {
            id: new_id(),
            name: name.to_string(),
            description: None,
            sort_order,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_sort_order() {
        let db = fixtures::db().await;
        let repo = db.categories();
        repo.insert(&category("Kottu", 2)).await.unwrap();
        repo.insert(&category("Rice & Curry", 1)).await.unwrap();

        let names: Vec<String> = repo
            .list(false)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Rice & Curry", "Kottu"]);
    }

    #[tokio::test]
    async fn test_inactive_hidden_unless_requested() {
        let db = fixtures::db().await;
        let repo = db.categories();
        let mut c = category("Seasonal", 0);
        c.is_active = false;
        repo.insert(&c).await.unwrap();

        assert!(repo.list(false).await.unwrap().is_empty());
        assert_eq!(repo.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = fixtures::db().await;
        let repo = db.categories();
        repo.insert(&category("Drinks", 0)).await.unwrap();

        let err = repo.insert(&category("Drinks", 1)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let db = fixtures::db().await;
        let err = db.categories().delete("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
