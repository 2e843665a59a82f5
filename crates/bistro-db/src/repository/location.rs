//! # Location Repository
//!
//! Places that hold stock: the main store, kitchens, bars and outlets.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use bistro_core::{Location, LocationKind};

#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE is_active = 1 OR ?1 ORDER BY kind, name",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(locations)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(location)
    }

    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM locations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    /// First active location of `kind`, by name.
    pub async fn first_of_kind(&self, kind: LocationKind) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE kind = ?1 AND is_active = 1 ORDER BY name LIMIT 1",
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(location)
    }

    pub async fn insert(&self, location: &Location) -> DbResult<Location> {
        debug!(name = %location.name, "Inserting location");

        sqlx::query(
            r#"
            INSERT INTO locations (id, name, kind, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&location.id)
        .bind(&location.name)
        .bind(location.kind)
        .bind(location.is_active)
        .bind(location.created_at)
        .execute(&self.pool)
        .await?;

        Ok(location.clone())
    }

    pub async fn update(&self, location: &Location) -> DbResult<Location> {
        let result = sqlx::query(
            "UPDATE locations SET name = ?2, kind = ?3, is_active = ?4 WHERE id = ?1",
        )
        .bind(&location.id)
        .bind(&location.name)
        .bind(location.kind)
        .bind(location.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Location", &location.id));
        }

        Ok(location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_first_of_kind() {
        let db = fixtures::db().await;
        let repo = db.locations();
        repo.insert(&fixtures::location("Main Store", LocationKind::Store))
            .await
            .unwrap();
        let kitchen = fixtures::location("Hot Kitchen", LocationKind::Kitchen);
        repo.insert(&kitchen).await.unwrap();

        let found = repo.first_of_kind(LocationKind::Kitchen).await.unwrap().unwrap();
        assert_eq!(found.id, kitchen.id);
        assert!(repo.first_of_kind(LocationKind::Bar).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_kind() {
        let db = fixtures::db().await;
        let repo = db.locations();
        let mut loc = fixtures::location("Pool Bar", LocationKind::Outlet);
        repo.insert(&loc).await.unwrap();

        loc.kind = LocationKind::Bar;
        repo.update(&loc).await.unwrap();

        let loaded = repo.get_by_id(&loc.id).await.unwrap().unwrap();
        assert_eq!(loaded.kind, LocationKind::Bar);
    }
}
