//! # Product Repository
//!
//! Database operations for menu items and their recipes.
//!
//! ## Key Operations
//! - Filtered listing and name / SKU search
//! - CRUD with `sync_version` bumps for offline terminals
//! - Availability toggle ("86" an item when the kitchen runs out)
//! - Recipe lines (ingredient quantities per portion)
//!
//! ## Sync Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every write bumps sync_version:                                        │
//! │                                                                         │
//! │  v1 ──(price edit)──► v2 ──(rename)──► v3                               │
//! │                                                                         │
//! │  A terminal that edited offline from v2 uploads base_version = 2.       │
//! │  Server is at v3 → the edit is checked for conflicts before applying.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use bistro_core::conflict::ProductFields;
use bistro_core::{Product, RecipeLine};

/// Filters for [`ProductRepository::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<String>,
    /// Case-insensitive substring of name or SKU.
    pub search: Option<String>,
    #[serde(default)]
    pub available_only: bool,
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<u32>,
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub const DEFAULT_LIMIT: u32 = 200;

    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Lists products matching `filter`, sorted by name.
    pub async fn list(&self, filter: &ProductFilter) -> DbResult<Vec<Product>> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        debug!(category_id = ?filter.category_id, search = ?pattern, "Listing products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE (?1 IS NULL OR category_id = ?1)
              AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\' OR sku LIKE ?2 ESCAPE '\')
              AND (?3 = 0 OR is_available = 1)
              AND (?4 = 1 OR is_active = 1)
            ORDER BY name
            LIMIT ?5
            "#,
        )
        .bind(&filter.category_id)
        .bind(pattern)
        .bind(filter.available_only)
        .bind(filter.include_inactive)
        .bind(filter.limit.unwrap_or(Self::DEFAULT_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Name / SKU search over active products.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        self.list(&ProductFilter {
            search: Some(query.to_string()),
            limit: Some(limit),
            ..ProductFilter::default()
        })
        .await
    }

    /// Every active product, for duplicate-name checks during sync.
    pub async fn catalog(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ?1")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Loads several products at once. Missing ids are simply absent.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        let ids_json = serde_json::to_string(ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id IN (SELECT value FROM json_each(?1))",
        )
        .bind(ids_json)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    /// * `Err(DbError::ForeignKeyViolation)` - unknown category
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, category_id,
                price_cents, cost_cents, vat_applicable, is_available,
                track_inventory, is_active, created_at, updated_at, sync_version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_id)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.vat_applicable)
        .bind(product.is_available)
        .bind(product.track_inventory)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Updates an existing product and bumps its `sync_version`.
    pub async fn update(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                name = ?3,
                description = ?4,
                category_id = ?5,
                price_cents = ?6,
                cost_cents = ?7,
                vat_applicable = ?8,
                is_available = ?9,
                track_inventory = ?10,
                is_active = ?11,
                updated_at = ?12,
                sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_id)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.vat_applicable)
        .bind(product.is_available)
        .bind(product.track_inventory)
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        self.require(&product.id).await
    }

    /// Writes the sync-editable fields of a product.
    pub async fn apply_fields(&self, id: &str, fields: &ProductFields) -> DbResult<Product> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                name = ?3,
                category_id = ?4,
                price_cents = ?5,
                vat_applicable = ?6,
                is_available = ?7,
                updated_at = ?8,
                sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&fields.sku)
        .bind(&fields.name)
        .bind(&fields.category_id)
        .bind(fields.price_cents)
        .bind(fields.vat_applicable)
        .bind(fields.is_available)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.require(id).await
    }

    /// Marks a menu item available or sold out.
    pub async fn set_availability(&self, id: &str, available: bool) -> DbResult<Product> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                is_available = ?2,
                updated_at = ?3,
                sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(available)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(id = %id, available, "Product availability changed");
        self.require(id).await
    }

    /// Soft delete. Sale items keep their snapshots.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                is_active = 0,
                updated_at = ?2,
                sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(id = %id, "Product deactivated");
        Ok(())
    }

    // =========================================================================
    // Recipes
    // =========================================================================

    pub async fn recipe(&self, product_id: &str) -> DbResult<Vec<RecipeLine>> {
        let lines = sqlx::query_as::<_, RecipeLine>(
            "SELECT * FROM recipe_lines WHERE product_id = ?1 ORDER BY ingredient_id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Recipe lines of several products.
    pub async fn recipes_for(&self, product_ids: &[String]) -> DbResult<Vec<RecipeLine>> {
        let ids_json =
            serde_json::to_string(product_ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let lines = sqlx::query_as::<_, RecipeLine>(
            r#"
            SELECT * FROM recipe_lines
            WHERE product_id IN (SELECT value FROM json_each(?1))
            ORDER BY product_id, ingredient_id
            "#,
        )
        .bind(ids_json)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Replaces a product's recipe. `lines` is `(ingredient_id, quantity)`.
    pub async fn set_recipe(
        &self,
        product_id: &str,
        lines: &[(String, i64)],
    ) -> DbResult<Vec<RecipeLine>> {
        if self.get_by_id(product_id).await?.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_lines WHERE product_id = ?1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        for (ingredient_id, quantity) in lines {
            sqlx::query(
                r#"
                INSERT INTO recipe_lines (id, product_id, ingredient_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(new_id())
            .bind(product_id)
            .bind(ingredient_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(product_id = %product_id, lines = lines.len(), "Recipe replaced");
        self.recipe(product_id).await
    }

    async fn require(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use bistro_core::Unit;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[tokio::test]
    async fn test_search_by_name_and_sku() {
        let db = fixtures::db().await;
        let repo = db.products();
        repo.insert(&fixtures::product("KOT-CHK", "Chicken Kottu", 1_450_00))
            .await
            .unwrap();
        repo.insert(&fixtures::product("KOT-EGG", "Egg Kottu", 1_100_00))
            .await
            .unwrap();
        repo.insert(&fixtures::product("BEV-TEA", "Plain Tea", 150_00))
            .await
            .unwrap();

        assert_eq!(repo.search("kottu", 10).await.unwrap().len(), 2);
        assert_eq!(repo.search("BEV-", 10).await.unwrap().len(), 1);
        assert_eq!(repo.search("pizza", 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = fixtures::db().await;
        let repo = db.products();
        repo.insert(&fixtures::product("HOP-01", "Egg Hopper", 120_00))
            .await
            .unwrap();

        let err = repo
            .insert(&fixtures::product("HOP-01", "Plain Hopper", 80_00))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_bumps_sync_version() {
        let db = fixtures::db().await;
        let repo = db.products();
        let mut p = fixtures::product("LMP-01", "Lamprais", 1_800_00);
        repo.insert(&p).await.unwrap();

        p.price_cents = 1_950_00;
        let updated = repo.update(&p).await.unwrap();
        assert_eq!(updated.sync_version, 2);
        assert_eq!(updated.price_cents, 1_950_00);

        let toggled = repo.set_availability(&p.id, false).await.unwrap();
        assert!(!toggled.is_available);
        assert_eq!(toggled.sync_version, 3);
    }

    #[tokio::test]
    async fn test_available_only_filter() {
        let db = fixtures::db().await;
        let repo = db.products();
        let p = fixtures::product("STR-01", "String Hoppers", 400_00);
        repo.insert(&p).await.unwrap();
        repo.set_availability(&p.id, false).await.unwrap();

        let filter = ProductFilter {
            available_only: true,
            ..ProductFilter::default()
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
        assert_eq!(repo.list(&ProductFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_many() {
        let db = fixtures::db().await;
        let repo = db.products();
        let a = fixtures::product("A-1", "Devilled Chicken", 1_600_00);
        let b = fixtures::product("B-1", "Fried Rice", 1_200_00);
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let found = repo
            .get_many(&[a.id.clone(), b.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_set_recipe_replaces_lines() {
        let db = fixtures::db().await;
        let p = fixtures::product("KOT-CHK", "Chicken Kottu", 1_450_00);
        db.products().insert(&p).await.unwrap();
        let roti = fixtures::ingredient("Godamba roti", Unit::Piece, 20);
        let chicken = fixtures::ingredient("Chicken", Unit::Gram, 2_000);
        db.ingredients().insert(&roti).await.unwrap();
        db.ingredients().insert(&chicken).await.unwrap();

        db.products()
            .set_recipe(&p.id, &[(roti.id.clone(), 2)])
            .await
            .unwrap();
        let lines = db
            .products()
            .set_recipe(&p.id, &[(roti.id.clone(), 2), (chicken.id.clone(), 150)])
            .await
            .unwrap();

        assert_eq!(lines.len(), 2);
        let all = db.products().recipes_for(&[p.id.clone()]).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_set_recipe_unknown_ingredient_fails() {
        let db = fixtures::db().await;
        let p = fixtures::product("X-1", "Mystery", 100_00);
        db.products().insert(&p).await.unwrap();

        let err = db
            .products()
            .set_recipe(&p.id, &[("nope".to_string(), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
        assert!(db.products().recipe(&p.id).await.unwrap().is_empty());
    }
}
