//! # Offline Sync Repository
//!
//! Conflict records raised while replaying offline batches, and the ledger of
//! offline records that were already applied.
//!
//! ## Replay Bookkeeping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  offline record ──► is_applied? ── yes ──► skipped                      │
//! │                         │                                               │
//! │                         no                                              │
//! │                         ▼                                               │
//! │                  conflict check ── conflict ──► insert_conflict         │
//! │                         │                        (pending)              │
//! │                       clean                           │                 │
//! │                         ▼                             ▼                 │
//! │                apply + mark_applied          resolve / ignore           │
//! │                                              (update_conflict)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `sync_applied_records` makes a re-uploaded batch idempotent.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use bistro_core::{ConflictStatus, CoreError, SyncConflict};

const DEFAULT_LIMIT: i64 = 200;

/// Filters for [`SyncRepository::list_conflicts`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConflictFilter {
    pub status: Option<ConflictStatus>,
    pub batch_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SyncRepository {
    pool: SqlitePool,
}

impl SyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncRepository { pool }
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    pub async fn insert_conflict(&self, conflict: &SyncConflict) -> DbResult<()> {
        debug!(
            id = %conflict.id,
            kind = conflict.kind.as_str(),
            entity_id = %conflict.entity_id,
            "Recording sync conflict"
        );

        sqlx::query(
            r#"
            INSERT INTO sync_conflicts (
                id, batch_id, device_id, kind, severity, entity_type, entity_id,
                server_entity_id, similarity, message, client_payload,
                suggested_strategy, status, resolution_strategy, resolved_by,
                resolved_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&conflict.id)
        .bind(&conflict.batch_id)
        .bind(&conflict.device_id)
        .bind(conflict.kind)
        .bind(conflict.severity)
        .bind(&conflict.entity_type)
        .bind(&conflict.entity_id)
        .bind(&conflict.server_entity_id)
        .bind(conflict.similarity)
        .bind(&conflict.message)
        .bind(&conflict.client_payload)
        .bind(conflict.suggested_strategy)
        .bind(conflict.status)
        .bind(conflict.resolution_strategy)
        .bind(&conflict.resolved_by)
        .bind(conflict.resolved_at)
        .bind(conflict.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_conflict(&self, id: &str) -> DbResult<Option<SyncConflict>> {
        let conflict =
            sqlx::query_as::<_, SyncConflict>("SELECT * FROM sync_conflicts WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conflict)
    }

    /// Conflicts, newest first.
    pub async fn list_conflicts(&self, filter: &ConflictFilter) -> DbResult<Vec<SyncConflict>> {
        let conflicts = sqlx::query_as::<_, SyncConflict>(
            r#"
            SELECT * FROM sync_conflicts
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR batch_id = ?2)
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
        )
        .bind(filter.status)
        .bind(&filter.batch_id)
        .bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(conflicts)
    }

    pub async fn pending_count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_conflicts WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Persists a resolved or ignored conflict.
    ///
    /// Only a row that is still pending is updated, so two managers closing
    /// the same conflict cannot both succeed.
    pub async fn update_conflict(&self, conflict: &SyncConflict) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_conflicts SET
                status = ?2,
                resolution_strategy = ?3,
                resolved_by = ?4,
                resolved_at = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(&conflict.id)
        .bind(conflict.status)
        .bind(conflict.resolution_strategy)
        .bind(&conflict.resolved_by)
        .bind(conflict.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self
                .get_conflict(&conflict.id)
                .await?
                .ok_or_else(|| DbError::not_found("Conflict", &conflict.id))?;
            return Err(CoreError::ConflictAlreadyClosed {
                id: current.id,
                status: current.status.as_str().to_string(),
            }
            .into());
        }

        info!(
            id = %conflict.id,
            status = conflict.status.as_str(),
            resolved_by = ?conflict.resolved_by,
            "Sync conflict closed"
        );
        Ok(())
    }

    // =========================================================================
    // Applied Records
    // =========================================================================

    pub async fn is_applied(&self, entity_type: &str, record_id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sync_applied_records WHERE entity_type = ?1 AND record_id = ?2",
        )
        .bind(entity_type)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Remembers an offline record as applied. Returns `false` when it was
    /// already recorded.
    pub async fn mark_applied(
        &self,
        entity_type: &str,
        record_id: &str,
        batch_id: &str,
        device_id: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_applied_records (entity_type, record_id, batch_id, device_id, applied_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (entity_type, record_id) DO NOTHING
            "#,
        )
        .bind(entity_type)
        .bind(record_id)
        .bind(batch_id)
        .bind(device_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{fixtures, new_id};
    use bistro_core::{ConflictKind, ConflictSeverity, ResolutionStrategy};

    fn conflict(batch_id: &str) -> SyncConflict {
        SyncConflict {
            id: new_id(),
            batch_id: batch_id.to_string(),
            device_id: "till-2".to_string(),
            kind: ConflictKind::PossibleDuplicateSale,
            severity: ConflictSeverity::Medium,
            entity_type: "sale".to_string(),
            entity_id: new_id(),
            server_entity_id: Some(new_id()),
            similarity: 0.82,
            message: "Looks like an existing sale".to_string(),
            client_payload: "{}".to_string(),
            suggested_strategy: ResolutionStrategy::ManualReview,
            status: ConflictStatus::Pending,
            resolution_strategy: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_by_status_and_batch() {
        let db = fixtures::db().await;
        let repo = db.sync();
        repo.insert_conflict(&conflict("b1")).await.unwrap();
        repo.insert_conflict(&conflict("b1")).await.unwrap();
        repo.insert_conflict(&conflict("b2")).await.unwrap();

        let b1 = repo
            .list_conflicts(&ConflictFilter {
                batch_id: Some("b1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(b1.len(), 2);
        assert_eq!(repo.pending_count().await.unwrap(), 3);

        let loaded = repo.get_conflict(&b1[0].id).await.unwrap().unwrap();
        assert!((loaded.similarity - 0.82).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_conflict_closes_once() {
        let db = fixtures::db().await;
        let repo = db.sync();
        let mut c = conflict("b1");
        repo.insert_conflict(&c).await.unwrap();

        c.status = ConflictStatus::Resolved;
        c.resolution_strategy = Some(ResolutionStrategy::KeepServer);
        c.resolved_by = Some("manager".to_string());
        c.resolved_at = Some(Utc::now());
        repo.update_conflict(&c).await.unwrap();

        let err = repo.update_conflict(&c).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ConflictAlreadyClosed { .. })));

        let pending = repo
            .list_conflicts(&ConflictFilter {
                status: Some(ConflictStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_mark_applied_is_idempotent() {
        let db = fixtures::db().await;
        let repo = db.sync();

        assert!(!repo.is_applied("sale", "s-1").await.unwrap());
        assert!(repo.mark_applied("sale", "s-1", "b1", "till-2").await.unwrap());
        assert!(!repo.mark_applied("sale", "s-1", "b1", "till-2").await.unwrap());
        assert!(repo.is_applied("sale", "s-1").await.unwrap());
        assert!(!repo.is_applied("product", "s-1").await.unwrap());
    }
}
