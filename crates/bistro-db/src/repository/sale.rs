//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE                                                              │
//! │     └── create() → Sale { status: Open, receipt R-YYYYMMDD-NNNN }       │
//! │         items + ingredient consumption written in the same transaction  │
//! │                                                                         │
//! │  2. PAY                                                                 │
//! │     └── PaymentRepository::record() → Completed once fully paid         │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID                                                     │
//! │     └── void() → Voided, consumption reversed                           │
//! │                                                                         │
//! │  4. (OPTIONAL) REFUND                                                   │
//! │     └── every captured payment refunded → Refunded                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::next_document_number;
use crate::repository::stock::{insert_movements, rows_for_reference, verify_non_negative};
use bistro_core::stock::{plan_reversal, NewStockMovement};
use bistro_core::{CoreError, OrderType, Sale, SaleItem, SaleStatus, StockMovementKind};

/// Receipt number prefix.
pub const RECEIPT_PREFIX: &str = "R";

/// Filters for [`SaleRepository::list`]. `from` is inclusive, `to` exclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<SaleStatus>,
    pub order_type: Option<OrderType>,
    pub limit: Option<u32>,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub const DEFAULT_LIMIT: u32 = 1_000;

    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Writes a sale, its items and the ingredient consumption in one
    /// transaction.
    ///
    /// An empty `receipt_number` is replaced by the next daily number.
    /// With `enforce_stock` a consumption row that drives a balance below
    /// zero rejects the whole sale; otherwise the shortfall is only logged.
    pub async fn create(
        &self,
        mut sale: Sale,
        items: Vec<SaleItem>,
        consumption: &[NewStockMovement],
        enforce_stock: bool,
    ) -> DbResult<(Sale, Vec<SaleItem>)> {
        if items.is_empty() {
            return Err(CoreError::EmptySale.into());
        }

        let mut tx = self.pool.begin().await?;

        if sale.receipt_number.is_empty() {
            sale.receipt_number =
                next_document_number(&mut tx, RECEIPT_PREFIX, sale.created_at).await?;
        }

        debug!(id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

        insert_sale(&mut tx, &sale).await?;
        for item in &items {
            insert_item(&mut tx, item).await?;
        }

        if !consumption.is_empty() {
            insert_movements(
                &mut tx,
                consumption,
                Some(&sale.id),
                Some(&sale.cashier),
                sale.created_at,
            )
            .await?;

            match verify_non_negative(&mut tx, consumption).await {
                Ok(()) => {}
                Err(DbError::Core(CoreError::InsufficientStock {
                    ingredient,
                    location,
                    available,
                    requested,
                })) if !enforce_stock => {
                    warn!(
                        sale_id = %sale.id,
                        ingredient = %ingredient,
                        location = %location,
                        available,
                        requested,
                        "Sale consumed more stock than on hand"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;

        info!(
            id = %sale.id,
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_cents,
            items = items.len(),
            "Sale created"
        );

        Ok((sale, items))
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    pub async fn get_by_receipt_number(&self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE receipt_number = ?1")
            .bind(receipt_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Items of several sales.
    pub async fn items_for_sales(&self, sale_ids: &[String]) -> DbResult<Vec<SaleItem>> {
        let ids_json =
            serde_json::to_string(sale_ids).map_err(|e| DbError::Internal(e.to_string()))?;

        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT * FROM sale_items
            WHERE sale_id IN (SELECT value FROM json_each(?1))
            ORDER BY sale_id, rowid
            "#,
        )
        .bind(ids_json)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Sales matching `filter`, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE (?1 IS NULL OR created_at >= ?1)
              AND (?2 IS NULL OR created_at < ?2)
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR order_type = ?4)
            ORDER BY created_at DESC
            LIMIT ?5
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.status)
        .bind(filter.order_type)
        .bind(filter.limit.unwrap_or(Self::DEFAULT_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Every sale created in `[from, to)`, for reports.
    pub async fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE created_at >= ?1 AND created_at < ?2
            ORDER BY created_at
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Items of completed sales created in `[from, to)`.
    pub async fn completed_items_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT si.* FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.status = 'completed'
              AND s.created_at >= ?1 AND s.created_at < ?2
            ORDER BY si.rowid
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Open → Completed.
    pub async fn complete(&self, id: &str) -> DbResult<Sale> {
        let mut conn = self.pool.acquire().await?;
        complete_open_sale(&mut conn, id, Utc::now()).await?;
        info!(id = %id, "Sale completed");
        self.require(id).await
    }

    /// Open or Completed → Voided, reversing ingredient consumption.
    ///
    /// Payment checks are the caller's job; this only guards the status.
    pub async fn void(&self, id: &str, voided_by: &str, reason: Option<&str>) -> DbResult<Sale> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'voided',
                notes = COALESCE(?3, notes),
                updated_at = ?2
            WHERE id = ?1 AND status IN ('open', 'completed')
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(status_error(&mut tx, id).await);
        }

        let consumed: Vec<_> = rows_for_reference(&mut tx, id)
            .await?
            .into_iter()
            .filter(|r| r.kind == StockMovementKind::SaleConsumption)
            .collect();
        if !consumed.is_empty() {
            let reversal = plan_reversal(&consumed);
            insert_movements(&mut tx, &reversal, Some(id), Some(voided_by), now).await?;
        }

        tx.commit().await?;

        info!(id = %id, voided_by = %voided_by, restocked = consumed.len(), "Sale voided");
        self.require(id).await
    }

    /// Completed → Refunded.
    pub async fn mark_refunded(&self, id: &str) -> DbResult<Sale> {
        let mut conn = self.pool.acquire().await?;
        mark_refunded(&mut conn, id, Utc::now()).await?;
        self.require(id).await
    }

    async fn require(&self, id: &str) -> DbResult<Sale> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }
}

// =============================================================================
// Connection-level helpers (shared with PaymentRepository)
// =============================================================================

async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, receipt_number, order_type, table_number, customer_name, status,
            subtotal_cents, discount_cents, service_charge_cents, vat_cents, total_cents,
            vat_rate_bps, vat_inclusive, cashier, device_id, notes,
            created_at, updated_at, completed_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.receipt_number)
    .bind(sale.order_type)
    .bind(&sale.table_number)
    .bind(&sale.customer_name)
    .bind(sale.status)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.service_charge_cents)
    .bind(sale.vat_cents)
    .bind(sale.total_cents)
    .bind(sale.vat_rate_bps)
    .bind(sale.vat_inclusive)
    .bind(&sale.cashier)
    .bind(&sale.device_id)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .bind(sale.completed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, sku_snapshot, name_snapshot,
            unit_price_cents, unit_cost_cents, quantity, line_total_cents,
            vat_applicable, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.unit_cost_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.vat_applicable)
    .bind(&item.notes)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// `NotFound` or `InvalidSaleStatus` for a sale whose guarded UPDATE matched
/// nothing.
pub(crate) async fn status_error(conn: &mut SqliteConnection, id: &str) -> DbError {
    let status: Result<Option<SaleStatus>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await;

    match status {
        Ok(None) => DbError::not_found("Sale", id),
        Ok(Some(current)) => CoreError::InvalidSaleStatus {
            sale_id: id.to_string(),
            current_status: current.as_str().to_string(),
        }
        .into(),
        Err(e) => e.into(),
    }
}

pub(crate) async fn complete_open_sale(
    conn: &mut SqliteConnection,
    id: &str,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET status = 'completed', completed_at = ?2, updated_at = ?2
        WHERE id = ?1 AND status = 'open'
        "#,
    )
    .bind(id)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(status_error(conn, id).await);
    }
    Ok(())
}

pub(crate) async fn mark_refunded(
    conn: &mut SqliteConnection,
    id: &str,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE sales SET status = 'refunded', updated_at = ?2 WHERE id = ?1 AND status = 'completed'",
    )
    .bind(id)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(status_error(conn, id).await);
    }
    info!(id = %id, "Sale refunded");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use bistro_core::stock::plan_consumption;
    use bistro_core::{LocationKind, RecipeLine, Unit};

    #[tokio::test]
    async fn test_create_assigns_daily_receipt_numbers() {
        let db = fixtures::db().await;
        let p = fixtures::product("KOT-CHK", "Chicken Kottu", 1_450_00);
        db.products().insert(&p).await.unwrap();

        let (s1, i1) = fixtures::sale_with_item(&p, 1);
        let (s2, i2) = fixtures::sale_with_item(&p, 2);
        let (a, _) = db.sales().create(s1, i1, &[], false).await.unwrap();
        let (b, _) = db.sales().create(s2, i2, &[], false).await.unwrap();

        assert!(a.receipt_number.starts_with("R-"));
        assert!(a.receipt_number.ends_with("-0001"));
        assert!(b.receipt_number.ends_with("-0002"));

        let loaded = db.sales().get_by_receipt_number(&b.receipt_number).await.unwrap();
        assert_eq!(loaded.unwrap().id, b.id);
        assert_eq!(db.sales().items(&b.id).await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_create_without_items_rejected() {
        let db = fixtures::db().await;
        let p = fixtures::product("X", "X", 100);
        let (sale, _) = fixtures::sale_with_item(&p, 1);
        let err = db.sales().create(sale, vec![], &[], false).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::EmptySale)));
    }

    #[tokio::test]
    async fn test_complete_then_void_transitions() {
        let db = fixtures::db().await;
        let p = fixtures::product("EGG-HOP", "Egg Hopper", 120_00);
        db.products().insert(&p).await.unwrap();
        let (sale, items) = fixtures::sale_with_item(&p, 3);
        let (sale, _) = db.sales().create(sale, items, &[], false).await.unwrap();

        let done = db.sales().complete(&sale.id).await.unwrap();
        assert_eq!(done.status, SaleStatus::Completed);
        assert!(done.completed_at.is_some());

        let again = db.sales().complete(&sale.id).await.unwrap_err();
        assert!(matches!(again, DbError::Core(CoreError::InvalidSaleStatus { .. })));

        let voided = db.sales().void(&sale.id, "manager", Some("wrong table")).await.unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(voided.notes.as_deref(), Some("wrong table"));

        let twice = db.sales().void(&sale.id, "manager", None).await.unwrap_err();
        assert!(matches!(twice, DbError::Core(CoreError::InvalidSaleStatus { .. })));
    }

    #[tokio::test]
    async fn test_void_unknown_sale_not_found() {
        let db = fixtures::db().await;
        let err = db.sales().void("missing", "manager", None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    async fn kitchen_with_chicken(db: &crate::Database, grams: i64) -> (String, String) {
        let chicken = fixtures::ingredient("Chicken", Unit::Gram, 1_000);
        let kitchen = fixtures::location("Kitchen", LocationKind::Kitchen);
        db.ingredients().insert(&chicken).await.unwrap();
        db.locations().insert(&kitchen).await.unwrap();
        if grams > 0 {
            db.stock()
                .adjust(
                    &bistro_core::stock::AdjustmentRequest {
                        ingredient_id: chicken.id.clone(),
                        location_id: kitchen.id.clone(),
                        kind: StockMovementKind::Purchase,
                        quantity: grams,
                        notes: None,
                    },
                    "chef",
                )
                .await
                .unwrap();
        }
        (chicken.id, kitchen.id)
    }

    fn chicken_recipe(product_id: &str, ingredient_id: &str) -> Vec<RecipeLine> {
        vec![RecipeLine {
            id: "r1".to_string(),
            product_id: product_id.to_string(),
            ingredient_id: ingredient_id.to_string(),
            quantity: 150,
        }]
    }

    #[tokio::test]
    async fn test_consumption_written_and_reversed_on_void() {
        let db = fixtures::db().await;
        let (chicken, kitchen) = kitchen_with_chicken(&db, 1_000).await;
        let p = fixtures::product("KOT-CHK", "Chicken Kottu", 1_450_00);
        db.products().insert(&p).await.unwrap();

        let (sale, items) = fixtures::sale_with_item(&p, 2);
        let consumption = plan_consumption(
            &chicken_recipe(&p.id, &chicken),
            &[(p.id.clone(), 2)],
            &kitchen,
        );
        let (sale, _) = db.sales().create(sale, items, &consumption, true).await.unwrap();

        let map = db.stock().balance_map().await.unwrap();
        assert_eq!(map.get(&chicken, &kitchen), 700);

        db.sales().void(&sale.id, "manager", None).await.unwrap();
        let map = db.stock().balance_map().await.unwrap();
        assert_eq!(map.get(&chicken, &kitchen), 1_000);
    }

    #[tokio::test]
    async fn test_enforced_shortfall_rejects_sale() {
        let db = fixtures::db().await;
        let (chicken, kitchen) = kitchen_with_chicken(&db, 100).await;
        let p = fixtures::product("KOT-CHK", "Chicken Kottu", 1_450_00);
        db.products().insert(&p).await.unwrap();

        let (sale, items) = fixtures::sale_with_item(&p, 1);
        let sale_id = sale.id.clone();
        let consumption = plan_consumption(
            &chicken_recipe(&p.id, &chicken),
            &[(p.id.clone(), 1)],
            &kitchen,
        );

        let err = db
            .sales()
            .create(sale.clone(), items.clone(), &consumption, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));
        assert!(db.sales().get_by_id(&sale_id).await.unwrap().is_none());

        // Lenient mode records the sale and lets the balance go negative
        db.sales().create(sale, items, &consumption, false).await.unwrap();
        let map = db.stock().balance_map().await.unwrap();
        assert_eq!(map.get(&chicken, &kitchen), -50);
    }

    #[tokio::test]
    async fn test_list_and_range_queries() {
        let db = fixtures::db().await;
        let p = fixtures::product("TEA", "Plain Tea", 150_00);
        db.products().insert(&p).await.unwrap();
        let (s1, i1) = fixtures::sale_with_item(&p, 1);
        let (s2, i2) = fixtures::sale_with_item(&p, 4);
        let (s1, _) = db.sales().create(s1, i1, &[], false).await.unwrap();
        db.sales().create(s2, i2, &[], false).await.unwrap();
        db.sales().complete(&s1.id).await.unwrap();

        let completed = db
            .sales()
            .list(&SaleFilter {
                status: Some(SaleStatus::Completed),
                ..SaleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);

        let from = Utc::now() - chrono::Duration::hours(1);
        let to = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(db.sales().in_range(from, to).await.unwrap().len(), 2);

        let items = db.sales().completed_items_in_range(from, to).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 1);
    }
}
