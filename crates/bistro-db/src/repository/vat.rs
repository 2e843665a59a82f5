//! # VAT Settings Repository
//!
//! Stored VAT configurations. At most one row is active; the partial unique
//! index on `is_active` enforces it and [`VatRepository::activate`] swaps the
//! active row inside a transaction.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use bistro_core::{ValidationError, VatSettings};

#[derive(Debug, Clone)]
pub struct VatRepository {
    pool: SqlitePool,
}

impl VatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VatRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<VatSettings>> {
        let rows = sqlx::query_as::<_, VatSettings>(
            "SELECT * FROM vat_settings ORDER BY is_active DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<VatSettings>> {
        let row = sqlx::query_as::<_, VatSettings>("SELECT * FROM vat_settings WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// The configuration bills are currently computed with.
    pub async fn active(&self) -> DbResult<Option<VatSettings>> {
        let row = sqlx::query_as::<_, VatSettings>(
            "SELECT * FROM vat_settings WHERE is_active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Inserts a new configuration. New rows start inactive unless the table
    /// has no active row yet.
    pub async fn insert(&self, settings: &VatSettings) -> DbResult<VatSettings> {
        debug!(name = %settings.name, rate_bps = settings.rate_bps, "Inserting VAT settings");

        let mut tx = self.pool.begin().await?;

        let has_active: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM vat_settings WHERE is_active = 1")
                .fetch_optional(&mut *tx)
                .await?;

        let mut row = settings.clone();
        row.is_active = has_active.is_none();

        sqlx::query(
            r#"
            INSERT INTO vat_settings (
                id, name, preset, rate_bps, mode, service_charge_bps,
                vat_on_service_charge, registration_number, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.preset)
        .bind(row.rate_bps)
        .bind(row.mode)
        .bind(row.service_charge_bps)
        .bind(row.vat_on_service_charge)
        .bind(&row.registration_number)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Updates rates and labels. The active flag is only changed through
    /// [`VatRepository::activate`].
    pub async fn update(&self, settings: &VatSettings) -> DbResult<VatSettings> {
        let result = sqlx::query(
            r#"
            UPDATE vat_settings SET
                name = ?2,
                preset = ?3,
                rate_bps = ?4,
                mode = ?5,
                service_charge_bps = ?6,
                vat_on_service_charge = ?7,
                registration_number = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&settings.id)
        .bind(&settings.name)
        .bind(&settings.preset)
        .bind(settings.rate_bps)
        .bind(settings.mode)
        .bind(settings.service_charge_bps)
        .bind(settings.vat_on_service_charge)
        .bind(&settings.registration_number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("VAT settings", &settings.id));
        }

        self.get(&settings.id)
            .await?
            .ok_or_else(|| DbError::not_found("VAT settings", &settings.id))
    }

    /// Makes `id` the active configuration.
    pub async fn activate(&self, id: &str) -> DbResult<VatSettings> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE vat_settings SET is_active = 0, updated_at = ?1 WHERE is_active = 1 AND id <> ?2")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE vat_settings SET is_active = 1, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("VAT settings", id));
        }

        let row = sqlx::query_as::<_, VatSettings>("SELECT * FROM vat_settings WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(id = %id, name = %row.name, rate_bps = row.rate_bps, "VAT settings activated");
        Ok(row)
    }

    /// Deletes an inactive configuration.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let row = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("VAT settings", id))?;

        if row.is_active {
            return Err(ValidationError::invalid("id", "the active VAT settings cannot be deleted").into());
        }

        sqlx::query("DELETE FROM vat_settings WHERE id = ?1 AND is_active = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{fixtures, new_id};
    use bistro_core::TaxMode;

    fn settings(name: &str, rate_bps: i64) -> VatSettings {
        let now = Utc::now();
        VatSettings {
            id: new_id(),
            name: name.to_string(),
            preset: None,
            rate_bps,
            mode: TaxMode::Exclusive,
            service_charge_bps: 1000,
            vat_on_service_charge: true,
            registration_number: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_first_insert_becomes_active() {
        let db = fixtures::db().await;
        let repo = db.vat();

        let standard = repo.insert(&settings("Standard", 1800)).await.unwrap();
        let zero = repo.insert(&settings("Zero Rated", 0)).await.unwrap();

        assert!(standard.is_active);
        assert!(!zero.is_active);
        assert_eq!(repo.active().await.unwrap().unwrap().id, standard.id);
    }

    #[tokio::test]
    async fn test_activate_swaps_active_row() {
        let db = fixtures::db().await;
        let repo = db.vat();
        let standard = repo.insert(&settings("Standard", 1800)).await.unwrap();
        let levy = repo.insert(&settings("Levy", 250)).await.unwrap();

        repo.activate(&levy.id).await.unwrap();

        let active = repo.active().await.unwrap().unwrap();
        assert_eq!(active.id, levy.id);
        assert!(!repo.get(&standard.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_activate_unknown_keeps_current() {
        let db = fixtures::db().await;
        let repo = db.vat();
        let standard = repo.insert(&settings("Standard", 1800)).await.unwrap();

        let err = repo.activate("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(repo.active().await.unwrap().unwrap().id, standard.id);
    }

    #[tokio::test]
    async fn test_active_row_cannot_be_deleted() {
        let db = fixtures::db().await;
        let repo = db.vat();
        let standard = repo.insert(&settings("Standard", 1800)).await.unwrap();
        let zero = repo.insert(&settings("Zero Rated", 0)).await.unwrap();

        assert!(repo.delete(&standard.id).await.is_err());
        repo.delete(&zero.id).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_rate() {
        let db = fixtures::db().await;
        let repo = db.vat();
        let mut row = repo.insert(&settings("Standard", 1500)).await.unwrap();

        row.rate_bps = 1800;
        row.mode = TaxMode::Inclusive;
        let updated = repo.update(&row).await.unwrap();

        assert_eq!(updated.rate_bps, 1800);
        assert_eq!(updated.mode, TaxMode::Inclusive);
        assert!(updated.is_active);
    }
}
