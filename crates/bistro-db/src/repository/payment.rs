//! # Payment Repository
//!
//! Payment transactions and the card / mobile-wallet sessions behind them.
//!
//! ## Recording a Payment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record(txn, session)            one database transaction               │
//! │                                                                         │
//! │  1. UPDATE session (captured / completed)        ← write lock taken     │
//! │  2. INSERT payment_transactions                                         │
//! │  3. sale must still be Open                                             │
//! │  4. captured total must not exceed the sale total                       │
//! │  5. fully paid? → sale Open → Completed                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::sale::{complete_open_sale, mark_refunded};
use bistro_core::payment::{payment_summary, PaymentSummary, RefundPlan};
use bistro_core::{
    CardSession, CoreError, Money, MobilePaymentSession, PaymentStatus, PaymentTransaction, Sale,
    SaleStatus,
};

/// Session row to update together with a payment.
#[derive(Debug, Clone, Copy)]
pub enum SessionUpdate<'a> {
    Card(&'a CardSession),
    Wallet(&'a MobilePaymentSession),
}

/// Outcome of [`PaymentRepository::record`].
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecorded {
    pub transaction: PaymentTransaction,
    pub summary: PaymentSummary,
    /// The payment settled the bill and the sale is now completed.
    pub sale_completed: bool,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Records a payment attempt against an open sale.
    ///
    /// Failed attempts are stored for the audit trail and never complete the
    /// sale. Captured payments are checked against the sale total under the
    /// transaction.
    pub async fn record(
        &self,
        txn: &PaymentTransaction,
        session: Option<SessionUpdate<'_>>,
    ) -> DbResult<PaymentRecorded> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        match session {
            Some(SessionUpdate::Card(s)) => write_card_session(&mut tx, s).await?,
            Some(SessionUpdate::Wallet(s)) => write_wallet_session(&mut tx, s).await?,
            None => {}
        }

        insert_transaction(&mut tx, txn).await?;

        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(&txn.sale_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", &txn.sale_id))?;

        if sale.status != SaleStatus::Open {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id,
                current_status: sale.status.as_str().to_string(),
            }
            .into());
        }

        let transactions = for_sale(&mut tx, &sale.id).await?;
        let summary = payment_summary(sale.total(), &transactions);

        let mut sale_completed = false;
        if txn.status.is_captured() {
            if summary.captured > summary.total {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!(
                        "payment of {} exceeds balance due",
                        Money::from_cents(txn.amount_cents)
                    ),
                }
                .into());
            }
            if summary.is_fully_paid {
                complete_open_sale(&mut tx, &sale.id, now).await?;
                sale_completed = true;
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %txn.sale_id,
            method = txn.method.as_str(),
            amount_cents = txn.amount_cents,
            status = txn.status.as_str(),
            sale_completed,
            "Payment recorded"
        );

        Ok(PaymentRecorded {
            transaction: txn.clone(),
            summary,
            sale_completed,
        })
    }

    pub async fn get_transaction(&self, id: &str) -> DbResult<Option<PaymentTransaction>> {
        let txn = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(txn)
    }

    pub async fn transactions_for_sale(&self, sale_id: &str) -> DbResult<Vec<PaymentTransaction>> {
        let mut conn = self.pool.acquire().await?;
        for_sale(&mut conn, sale_id).await
    }

    /// Transactions of sales created in `[from, to)`.
    pub async fn transactions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<PaymentTransaction>> {
        let txns = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT pt.* FROM payment_transactions pt
            JOIN sales s ON s.id = pt.sale_id
            WHERE s.created_at >= ?1 AND s.created_at < ?2
            ORDER BY pt.created_at
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(txns)
    }

    /// Applies a planned refund.
    ///
    /// `expected_refunded_cents` is the value the plan was computed from; a
    /// concurrent refund changes it and this call fails instead of
    /// double-refunding. When every captured payment of a completed sale is
    /// fully refunded the sale becomes `Refunded`.
    ///
    /// Returns the updated transaction and whether the sale was marked
    /// refunded.
    pub async fn apply_refund(
        &self,
        txn_id: &str,
        plan: &RefundPlan,
        expected_refunded_cents: i64,
    ) -> DbResult<(PaymentTransaction, bool)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payment_transactions SET
                refunded_cents = ?2,
                status = ?3,
                updated_at = ?4
            WHERE id = ?1 AND refunded_cents = ?5
            "#,
        )
        .bind(txn_id)
        .bind(plan.refunded_total.cents())
        .bind(plan.status)
        .bind(now)
        .bind(expected_refunded_cents)
        .execute(&mut *tx)
        .await?;

        let txn = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE id = ?1",
        )
        .bind(txn_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", txn_id))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("payment {txn_id} was refunded concurrently, retry"),
            }
            .into());
        }

        let captured: Vec<PaymentTransaction> = for_sale(&mut tx, &txn.sale_id)
            .await?
            .into_iter()
            .filter(|t| t.status.is_captured())
            .collect();
        let all_refunded = !captured.is_empty()
            && captured.iter().all(|t| t.status == PaymentStatus::Refunded);

        let status: Option<SaleStatus> = sqlx::query_scalar("SELECT status FROM sales WHERE id = ?1")
            .bind(&txn.sale_id)
            .fetch_optional(&mut *tx)
            .await?;

        let sale_refunded = all_refunded && status == Some(SaleStatus::Completed);
        if sale_refunded {
            mark_refunded(&mut tx, &txn.sale_id, now).await?;
        }

        tx.commit().await?;

        info!(
            txn_id = %txn_id,
            amount_cents = plan.amount.cents(),
            status = plan.status.as_str(),
            sale_refunded,
            "Refund applied"
        );

        Ok((txn, sale_refunded))
    }

    // =========================================================================
    // Card Sessions
    // =========================================================================

    pub async fn insert_card_session(&self, session: &CardSession) -> DbResult<()> {
        debug!(id = %session.id, sale_id = %session.sale_id, "Inserting card session");

        sqlx::query(
            r#"
            INSERT INTO card_sessions (
                id, sale_id, amount_cents, status, client_secret, card_brand,
                card_last4, gateway_reference, failure_reason,
                expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&session.id)
        .bind(&session.sale_id)
        .bind(session.amount_cents)
        .bind(session.status)
        .bind(&session.client_secret)
        .bind(&session.card_brand)
        .bind(&session.card_last4)
        .bind(&session.gateway_reference)
        .bind(&session.failure_reason)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_card_session(&self, id: &str) -> DbResult<Option<CardSession>> {
        let session = sqlx::query_as::<_, CardSession>("SELECT * FROM card_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    pub async fn card_sessions_for_sale(&self, sale_id: &str) -> DbResult<Vec<CardSession>> {
        let sessions = sqlx::query_as::<_, CardSession>(
            "SELECT * FROM card_sessions WHERE sale_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Persists a session state change that has no payment attached.
    pub async fn update_card_session(&self, session: &CardSession) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        write_card_session(&mut conn, session).await
    }

    // =========================================================================
    // Wallet Sessions
    // =========================================================================

    pub async fn insert_wallet_session(&self, session: &MobilePaymentSession) -> DbResult<()> {
        debug!(
            id = %session.id,
            provider = %session.provider,
            sale_id = %session.sale_id,
            "Inserting wallet session"
        );

        sqlx::query(
            r#"
            INSERT INTO mobile_payment_sessions (
                id, sale_id, provider, amount_cents, fee_cents, payer_phone,
                qr_payload, status, provider_reference, failure_reason,
                expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&session.id)
        .bind(&session.sale_id)
        .bind(&session.provider)
        .bind(session.amount_cents)
        .bind(session.fee_cents)
        .bind(&session.payer_phone)
        .bind(&session.qr_payload)
        .bind(session.status)
        .bind(&session.provider_reference)
        .bind(&session.failure_reason)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_wallet_session(&self, id: &str) -> DbResult<Option<MobilePaymentSession>> {
        let session = sqlx::query_as::<_, MobilePaymentSession>(
            "SELECT * FROM mobile_payment_sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn wallet_sessions_for_sale(
        &self,
        sale_id: &str,
    ) -> DbResult<Vec<MobilePaymentSession>> {
        let sessions = sqlx::query_as::<_, MobilePaymentSession>(
            "SELECT * FROM mobile_payment_sessions WHERE sale_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    pub async fn update_wallet_session(&self, session: &MobilePaymentSession) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        write_wallet_session(&mut conn, session).await
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<PaymentTransaction>> {
    let txns = sqlx::query_as::<_, PaymentTransaction>(
        "SELECT * FROM payment_transactions WHERE sale_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(txns)
}

async fn insert_transaction(conn: &mut SqliteConnection, txn: &PaymentTransaction) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payment_transactions (
            id, sale_id, method, provider, amount_cents, tendered_cents,
            change_cents, refunded_cents, status, gateway_reference,
            session_id, failure_reason, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&txn.id)
    .bind(&txn.sale_id)
    .bind(txn.method)
    .bind(&txn.provider)
    .bind(txn.amount_cents)
    .bind(txn.tendered_cents)
    .bind(txn.change_cents)
    .bind(txn.refunded_cents)
    .bind(txn.status)
    .bind(&txn.gateway_reference)
    .bind(&txn.session_id)
    .bind(&txn.failure_reason)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn write_card_session(conn: &mut SqliteConnection, s: &CardSession) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE card_sessions SET
            status = ?2,
            card_brand = ?3,
            card_last4 = ?4,
            gateway_reference = ?5,
            failure_reason = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(&s.id)
    .bind(s.status)
    .bind(&s.card_brand)
    .bind(&s.card_last4)
    .bind(&s.gateway_reference)
    .bind(&s.failure_reason)
    .bind(s.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Card session", &s.id));
    }
    Ok(())
}

async fn write_wallet_session(
    conn: &mut SqliteConnection,
    s: &MobilePaymentSession,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE mobile_payment_sessions SET
            status = ?2,
            provider_reference = ?3,
            failure_reason = ?4,
            updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(&s.id)
    .bind(s.status)
    .bind(&s.provider_reference)
    .bind(&s.failure_reason)
    .bind(s.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Wallet session", &s.id));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
