//! # Stock Repository
//!
//! The stock ledger and the documents that move stock between locations.
//!
//! ## Ledger Netting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock_transactions (append only, signed quantity)                      │
//! │                                                                         │
//! │  rice @ store    +25000  purchase                                       │
//! │  rice @ store     -5000  issue_out    ISS-20260301-0001                 │
//! │  rice @ kitchen   +5000  issue_in     ISS-20260301-0001                 │
//! │  rice @ kitchen    -300  sale_consumption  R-20260301-0042              │
//! │                                                                         │
//! │  balance(rice, kitchen) = SUM(quantity) = 4700                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transfer Transaction
//! 1. Allocate the document number (first write, takes the write lock)
//! 2. Read balances of the involved ingredients
//! 3. Plan the rows with `bistro_core::stock` (rejects shortfalls)
//! 4. Insert the document, its lines and two ledger rows per line
//! 5. Re-check that no touched balance went negative, then commit
//!
//! Any error before commit drops the transaction, which rolls it back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, next_document_number};
use bistro_core::conflict::OfflineStockMovement;
use bistro_core::stock::{
    plan_adjustment, plan_movement, plan_reversal, AdjustmentRequest, NewStockMovement,
    StockBalance, StockBalances, TransferLine,
};
use bistro_core::{
    CoreError, LocationKind, StockIssue, StockIssueKind, StockIssueLine, StockIssueStatus,
    StockMovementKind, StockTransaction, ValidationError,
};

/// Request to issue or transfer stock between two locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockIssue {
    pub kind: StockIssueKind,
    pub from_location_id: String,
    pub to_location_id: String,
    pub lines: Vec<TransferLine>,
    pub issued_by: String,
    pub notes: Option<String>,
}

/// A stock document with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct StockIssueDetail {
    #[serde(flatten)]
    pub issue: StockIssue,
    pub lines: Vec<StockIssueLine>,
}

/// Filters for the movement history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub ingredient_id: Option<String>,
    pub location_id: Option<String>,
    pub kind: Option<StockMovementKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub const DEFAULT_HISTORY_LIMIT: u32 = 500;

    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Per-location balances, optionally narrowed to a location or ingredient.
    pub async fn balances(
        &self,
        location_id: Option<&str>,
        ingredient_id: Option<&str>,
    ) -> DbResult<Vec<StockBalance>> {
        let rows = sqlx::query_as::<_, StockBalance>(
            r#"
            SELECT ingredient_id, location_id, SUM(quantity) AS quantity
            FROM stock_transactions
            WHERE (?1 IS NULL OR location_id = ?1)
              AND (?2 IS NULL OR ingredient_id = ?2)
            GROUP BY ingredient_id, location_id
            ORDER BY ingredient_id, location_id
            "#,
        )
        .bind(location_id)
        .bind(ingredient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Every balance as a lookup table.
    pub async fn balance_map(&self) -> DbResult<StockBalances> {
        let rows = self.balances(None, None).await?;
        Ok(to_balances(rows))
    }

    /// Ledger rows, newest first.
    pub async fn movements(&self, filter: &MovementFilter) -> DbResult<Vec<StockTransaction>> {
        let rows = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE (?1 IS NULL OR ingredient_id = ?1)
              AND (?2 IS NULL OR location_id = ?2)
              AND (?3 IS NULL OR kind = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at < ?5)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?6
            "#,
        )
        .bind(&filter.ingredient_id)
        .bind(&filter.location_id)
        .bind(filter.kind)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.limit.unwrap_or(Self::DEFAULT_HISTORY_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Ledger rows written for one document (issue, sale, sync record).
    pub async fn movements_for_reference(
        &self,
        reference_id: &str,
    ) -> DbResult<Vec<StockTransaction>> {
        let mut conn = self.pool.acquire().await?;
        rows_for_reference(&mut conn, reference_id).await
    }

    // =========================================================================
    // Issues and Transfers
    // =========================================================================

    /// Moves stock between two locations inside one database transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - unknown location
    /// * `Err(DbError::Core(InsufficientStock))` - source holds too little
    /// * `Err(DbError::Core(SameLocationTransfer))` - from == to
    pub async fn transfer(&self, request: &NewStockIssue) -> DbResult<StockIssueDetail> {
        let from = self.location_kind(&request.from_location_id).await?;
        self.location_kind(&request.to_location_id).await?;

        if request.kind == StockIssueKind::Issue && from != LocationKind::Store {
            return Err(ValidationError::NotAllowed {
                field: "from_location_id".to_string(),
                allowed: vec!["store".to_string()],
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let issue_number = next_document_number(&mut tx, request.kind.prefix(), now).await?;

        let ingredient_ids: Vec<String> =
            request.lines.iter().map(|l| l.ingredient_id.clone()).collect();
        let balances = load_balances(&mut tx, &ingredient_ids).await?;

        let rows = plan_movement(
            &balances,
            &request.from_location_id,
            &request.to_location_id,
            &request.lines,
            request.kind,
        )?;

        let issue = StockIssue {
            id: new_id(),
            issue_number,
            kind: request.kind,
            from_location_id: request.from_location_id.clone(),
            to_location_id: request.to_location_id.clone(),
            status: StockIssueStatus::Completed,
            issued_by: request.issued_by.clone(),
            notes: request.notes.clone(),
            created_at: now,
            cancelled_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_issues (
                id, issue_number, kind, from_location_id, to_location_id,
                status, issued_by, notes, created_at, cancelled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.issue_number)
        .bind(issue.kind)
        .bind(&issue.from_location_id)
        .bind(&issue.to_location_id)
        .bind(issue.status)
        .bind(&issue.issued_by)
        .bind(&issue.notes)
        .bind(issue.created_at)
        .bind(issue.cancelled_at)
        .execute(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let row = StockIssueLine {
                id: new_id(),
                issue_id: issue.id.clone(),
                ingredient_id: line.ingredient_id.clone(),
                quantity: line.quantity,
            };
            sqlx::query(
                r#"
                INSERT INTO stock_issue_lines (id, issue_id, ingredient_id, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&row.id)
            .bind(&row.issue_id)
            .bind(&row.ingredient_id)
            .bind(row.quantity)
            .execute(&mut *tx)
            .await?;
            lines.push(row);
        }

        insert_movements(&mut tx, &rows, Some(&issue.id), Some(&issue.issued_by), now).await?;
        verify_non_negative(&mut tx, &rows).await?;

        tx.commit().await?;

        info!(
            issue_number = %issue.issue_number,
            kind = ?issue.kind,
            from = %issue.from_location_id,
            to = %issue.to_location_id,
            lines = lines.len(),
            "Stock moved"
        );

        Ok(StockIssueDetail { issue, lines })
    }

    pub async fn get_issue(&self, id: &str) -> DbResult<Option<StockIssueDetail>> {
        let issue = sqlx::query_as::<_, StockIssue>("SELECT * FROM stock_issues WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(issue) = issue else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, StockIssueLine>(
            "SELECT * FROM stock_issue_lines WHERE issue_id = ?1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StockIssueDetail { issue, lines }))
    }

    /// Recent documents, newest first.
    pub async fn list_issues(
        &self,
        kind: Option<StockIssueKind>,
        limit: u32,
    ) -> DbResult<Vec<StockIssue>> {
        let issues = sqlx::query_as::<_, StockIssue>(
            r#"
            SELECT * FROM stock_issues
            WHERE (?1 IS NULL OR kind = ?1)
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(issues)
    }

    /// Cancels a completed issue by writing reversing ledger rows.
    ///
    /// Fails with `InsufficientStock` when the destination has already used
    /// part of what it received.
    pub async fn cancel_issue(&self, id: &str, cancelled_by: &str) -> DbResult<StockIssueDetail> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE stock_issues SET status = 'cancelled', cancelled_at = ?2
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let status: Option<StockIssueStatus> =
                sqlx::query_scalar("SELECT status FROM stock_issues WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match status {
                None => DbError::not_found("Stock issue", id),
                Some(_) => CoreError::InvalidTransition {
                    entity: "stock issue".to_string(),
                    from: "cancelled".to_string(),
                    to: "cancelled".to_string(),
                }
                .into(),
            });
        }

        let original = rows_for_reference(&mut tx, id).await?;
        let reversal = plan_reversal(&original);
        insert_movements(&mut tx, &reversal, Some(id), Some(cancelled_by), now).await?;
        verify_non_negative(&mut tx, &reversal).await?;

        tx.commit().await?;

        info!(id = %id, rows = reversal.len(), "Stock issue cancelled");

        self.get_issue(id)
            .await?
            .ok_or_else(|| DbError::not_found("Stock issue", id))
    }

    // =========================================================================
    // Adjustments
    // =========================================================================

    /// Records a purchase, opening balance, wastage or count correction.
    pub async fn adjust(
        &self,
        request: &AdjustmentRequest,
        created_by: &str,
    ) -> DbResult<StockTransaction> {
        self.location_kind(&request.location_id).await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let balances = load_balances(&mut tx, &[request.ingredient_id.clone()]).await?;
        let row = plan_adjustment(&balances, request)?;

        let written = insert_movements(
            &mut tx,
            std::slice::from_ref(&row),
            None,
            Some(created_by),
            now,
        )
        .await?;
        verify_non_negative(&mut tx, std::slice::from_ref(&row)).await?;

        tx.commit().await?;

        info!(
            ingredient_id = %row.ingredient_id,
            location_id = %row.location_id,
            quantity = row.quantity,
            kind = row.kind.as_str(),
            "Stock adjusted"
        );

        written
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Internal("adjustment row not written".to_string()))
    }

    /// Writes an offline terminal's movement as-is, keeping its id.
    ///
    /// Conflict checks happen before this is called; a movement accepted by
    /// conflict resolution may take a balance below zero.
    pub async fn record_offline(
        &self,
        movement: &OfflineStockMovement,
        device_id: &str,
    ) -> DbResult<StockTransaction> {
        let row = StockTransaction {
            id: movement.id.clone(),
            ingredient_id: movement.ingredient_id.clone(),
            location_id: movement.location_id.clone(),
            quantity: movement.quantity,
            kind: movement.kind,
            reference_id: None,
            notes: movement.notes.clone(),
            created_by: Some(device_id.to_string()),
            created_at: movement.created_at,
        };

        let mut conn = self.pool.acquire().await?;
        insert_transaction(&mut conn, &row).await?;

        debug!(id = %row.id, device_id = %device_id, "Offline stock movement recorded");
        Ok(row)
    }

    async fn location_kind(&self, id: &str) -> DbResult<LocationKind> {
        sqlx::query_scalar::<_, LocationKind>("SELECT kind FROM locations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Location", id))
    }
}

// =============================================================================
// Transaction Helpers (shared with SaleRepository)
// =============================================================================

fn to_balances(rows: Vec<StockBalance>) -> StockBalances {
    let mut balances = StockBalances::new();
    for row in rows {
        balances.set(&row.ingredient_id, &row.location_id, row.quantity);
    }
    balances
}

/// Balances of `ingredient_ids` at every location, read on `conn`.
pub(crate) async fn load_balances(
    conn: &mut SqliteConnection,
    ingredient_ids: &[String],
) -> DbResult<StockBalances> {
    let ids_json =
        serde_json::to_string(ingredient_ids).map_err(|e| DbError::Internal(e.to_string()))?;

    let rows = sqlx::query_as::<_, StockBalance>(
        r#"
        SELECT ingredient_id, location_id, SUM(quantity) AS quantity
        FROM stock_transactions
        WHERE ingredient_id IN (SELECT value FROM json_each(?1))
        GROUP BY ingredient_id, location_id
        "#,
    )
    .bind(ids_json)
    .fetch_all(&mut *conn)
    .await?;

    Ok(to_balances(rows))
}

async fn insert_transaction(conn: &mut SqliteConnection, row: &StockTransaction) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            id, ingredient_id, location_id, quantity, kind,
            reference_id, notes, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&row.id)
    .bind(&row.ingredient_id)
    .bind(&row.location_id)
    .bind(row.quantity)
    .bind(row.kind)
    .bind(&row.reference_id)
    .bind(&row.notes)
    .bind(&row.created_by)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes planned rows to the ledger.
pub(crate) async fn insert_movements(
    conn: &mut SqliteConnection,
    movements: &[NewStockMovement],
    reference_id: Option<&str>,
    created_by: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<Vec<StockTransaction>> {
    let mut written = Vec::with_capacity(movements.len());
    for m in movements {
        let row = StockTransaction {
            id: new_id(),
            ingredient_id: m.ingredient_id.clone(),
            location_id: m.location_id.clone(),
            quantity: m.quantity,
            kind: m.kind,
            reference_id: reference_id.map(str::to_string),
            notes: m.notes.clone(),
            created_by: created_by.map(str::to_string),
            created_at: at,
        };
        insert_transaction(conn, &row).await?;
        written.push(row);
    }
    Ok(written)
}

/// Fails if any pair these rows took stock from now has a negative balance.
pub(crate) async fn verify_non_negative(
    conn: &mut SqliteConnection,
    movements: &[NewStockMovement],
) -> DbResult<()> {
    let mut deltas: HashMap<(&str, &str), i64> = HashMap::new();
    for m in movements {
        *deltas
            .entry((m.ingredient_id.as_str(), m.location_id.as_str()))
            .or_insert(0) += m.quantity;
    }

    for ((ingredient_id, location_id), delta) in deltas {
        if delta >= 0 {
            continue;
        }
        let after: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0) FROM stock_transactions
            WHERE ingredient_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(ingredient_id)
        .bind(location_id)
        .fetch_one(&mut *conn)
        .await?;

        if after < 0 {
            warn!(
                ingredient_id = %ingredient_id,
                location_id = %location_id,
                after,
                "Stock movement rejected, balance would go negative"
            );
            return Err(CoreError::InsufficientStock {
                ingredient: ingredient_id.to_string(),
                location: location_id.to_string(),
                available: after - delta,
                requested: -delta,
            }
            .into());
        }
    }

    Ok(())
}

pub(crate) async fn rows_for_reference(
    conn: &mut SqliteConnection,
    reference_id: &str,
) -> DbResult<Vec<StockTransaction>> {
    let rows = sqlx::query_as::<_, StockTransaction>(
        "SELECT * FROM stock_transactions WHERE reference_id = ?1 ORDER BY rowid",
    )
    .bind(reference_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

// =============================================================================
// Unit Tests
// =============================================================================
