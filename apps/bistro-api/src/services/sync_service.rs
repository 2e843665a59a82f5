//! # Offline Sync Service
//!
//! Replays what a terminal recorded while it had no connection to the back
//! office.
//!
//! ## Upload Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OfflineBatch { sales, products, stock_movements }                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate every record ─── any invalid ──► 400, nothing applied         │
//! │       │                                                                 │
//! │       ▼  per record                                                     │
//! │  already applied? ─── yes ──► skipped                                   │
//! │  already in conflict for this batch? ─── yes ──► reported again         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  check_sale / check_product / check_stock_movement                      │
//! │       │                          │                                      │
//! │     clean                     conflict ──► stored as Pending            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  apply + mark_applied                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products are replayed first so offline sales can reference products the
//! same terminal created.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use bistro_core::conflict::{
    check_product, check_sale, check_stock_movement, ignore as ignore_conflict,
    merge_product_fields, resolve as resolve_conflict, suggest_strategy, ConflictConfig,
    DetectedConflict, OfflineBatch, OfflineProduct, OfflineSale, OfflineStockMovement,
    ProductFields, ResolutionAction, SaleFingerprint, SyncOutcome,
};
use bistro_core::stock::StockBalances;
use bistro_core::validation::{
    validate_name, validate_price_cents, validate_quantity, validate_sku, validate_stock_quantity,
};
use bistro_core::{
    ConflictKind, ConflictSeverity, Product, ResolutionStrategy, Sale, SyncConflict,
    ValidationError,
};
use bistro_db::{new_id, ConflictFilter};

use crate::error::{ApiError, ApiResult};
use crate::services::sale_service::SaleService;
use crate::state::AppState;

pub const ENTITY_SALE: &str = "sale";
pub const ENTITY_PRODUCT: &str = "product";
pub const ENTITY_STOCK_MOVEMENT: &str = "stock_movement";

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub strategy: ResolutionStrategy,
    pub resolved_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IgnoreRequest {
    pub resolved_by: String,
}

pub struct SyncService<'a> {
    state: &'a AppState,
}

impl<'a> SyncService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        SyncService { state }
    }

    pub async fn upload(&self, batch: OfflineBatch) -> ApiResult<SyncOutcome> {
        self.validate_batch(&batch)?;

        info!(
            batch_id = %batch.batch_id,
            device_id = %batch.device_id,
            sales = batch.sales.len(),
            products = batch.products.len(),
            movements = batch.stock_movements.len(),
            "Processing offline batch"
        );

        let existing: HashMap<String, SyncConflict> = self
            .state
            .db
            .sync()
            .list_conflicts(&ConflictFilter {
                batch_id: Some(batch.batch_id.clone()),
                limit: Some(i64::MAX),
                ..ConflictFilter::default()
            })
            .await?
            .into_iter()
            .map(|c| (format!("{}:{}", c.entity_type, c.entity_id), c))
            .collect();

        let mut run = BatchRun {
            batch: &batch,
            existing,
            outcome: SyncOutcome {
                batch_id: batch.batch_id.clone(),
                ..SyncOutcome::default()
            },
        };

        for product in &batch.products {
            self.replay_product(&mut run, product).await?;
        }
        for sale in &batch.sales {
            self.replay_sale(&mut run, sale).await?;
        }

        let mut balances = self.state.db.stock().balance_map().await?;
        for movement in &batch.stock_movements {
            self.replay_movement(&mut run, movement, &mut balances).await?;
        }

        let outcome = run.outcome;
        info!(
            batch_id = %outcome.batch_id,
            applied = outcome.applied_sales.len()
                + outcome.applied_products.len()
                + outcome.applied_movements.len(),
            skipped = outcome.skipped.len(),
            conflicts = outcome.conflicts.len(),
            "Offline batch processed"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    async fn replay_product(&self, run: &mut BatchRun<'_>, product: &OfflineProduct) -> ApiResult<()> {
        if self.already_handled(run, ENTITY_PRODUCT, &product.id).await? {
            return Ok(());
        }

        let db = &self.state.db;
        let existing = db.products().get_by_id(&product.id).await?;
        let catalog = db.products().catalog().await?;

        match check_product(product, existing.as_ref(), &catalog, &self.conflict_config()) {
            Some(detected) => self.raise(run, detected).await,
            None => {
                self.apply_product(product, &product.fields).await?;
                self.mark(run, ENTITY_PRODUCT, &product.id).await?;
                run.outcome.applied_products.push(product.id.clone());
                Ok(())
            }
        }
    }

    async fn replay_sale(&self, run: &mut BatchRun<'_>, sale: &OfflineSale) -> ApiResult<()> {
        if self.already_handled(run, ENTITY_SALE, &sale.id).await? {
            return Ok(());
        }
        if self.state.db.sales().get_by_id(&sale.id).await?.is_some() {
            debug!(id = %sale.id, "Offline sale already on server");
            run.outcome.skipped.push(sale.id.clone());
            return Ok(());
        }

        let product_ids: Vec<String> = sale.items.iter().map(|i| i.product_id.clone()).collect();
        let known = self.state.db.products().get_many(&product_ids).await?;
        if let Some(missing) = product_ids.iter().find(|id| !known.iter().any(|p| &p.id == *id)) {
            let detected = unknown_product(sale, missing);
            return self.raise(run, detected).await;
        }

        let candidates = self.sale_candidates(sale).await?;
        match check_sale(sale, &candidates, &self.conflict_config()) {
            Some(detected) => self.raise(run, detected).await,
            None => {
                SaleService::new(self.state)
                    .record_offline(sale, &run.batch.device_id, false)
                    .await?;
                self.mark(run, ENTITY_SALE, &sale.id).await?;
                run.outcome.applied_sales.push(sale.id.clone());
                Ok(())
            }
        }
    }

    async fn replay_movement(
        &self,
        run: &mut BatchRun<'_>,
        movement: &OfflineStockMovement,
        balances: &mut StockBalances,
    ) -> ApiResult<()> {
        if self.already_handled(run, ENTITY_STOCK_MOVEMENT, &movement.id).await? {
            return Ok(());
        }

        let db = &self.state.db;
        let ingredient_exists = db.ingredients().exists(&movement.ingredient_id).await?;
        let location_exists = db.locations().exists(&movement.location_id).await?;

        match check_stock_movement(movement, balances, ingredient_exists, location_exists) {
            Some(detected) => self.raise(run, detected).await,
            None => {
                db.stock().record_offline(movement, &run.batch.device_id).await?;
                balances.add(&movement.ingredient_id, &movement.location_id, movement.quantity);
                self.mark(run, ENTITY_STOCK_MOVEMENT, &movement.id).await?;
                run.outcome.applied_movements.push(movement.id.clone());
                Ok(())
            }
        }
    }

    /// Server sales close enough in time, or sharing the receipt number.
    async fn sale_candidates(&self, sale: &OfflineSale) -> ApiResult<Vec<SaleFingerprint>> {
        let db = &self.state.db;
        let window = Duration::try_minutes(self.state.config.sync.duplicate_window_minutes)
            .unwrap_or_else(Duration::zero);
        let from = sale.created_at.checked_sub_signed(window).unwrap_or(sale.created_at);
        let to = sale.created_at.checked_add_signed(window).unwrap_or(sale.created_at);

        let mut sales: Vec<Sale> = db.sales().in_range(from, to).await?;
        if let Some(receipt) = &sale.receipt_number {
            if let Some(same) = db.sales().get_by_receipt_number(receipt).await? {
                if !sales.iter().any(|s| s.id == same.id) {
                    sales.push(same);
                }
            }
        }

        let ids: Vec<String> = sales.iter().map(|s| s.id.clone()).collect();
        let items = db.sales().items_for_sales(&ids).await?;
        Ok(sales
            .iter()
            .map(|s| {
                let own: Vec<_> = items.iter().filter(|i| i.sale_id == s.id).cloned().collect();
                SaleFingerprint::from_sale(s, &own)
            })
            .collect())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    pub async fn list_conflicts(&self, filter: &ConflictFilter) -> ApiResult<Vec<SyncConflict>> {
        Ok(self.state.db.sync().list_conflicts(filter).await?)
    }

    pub async fn get_conflict(&self, id: &str) -> ApiResult<SyncConflict> {
        self.state
            .db
            .sync()
            .get_conflict(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Conflict", id))
    }

    /// Resolves a conflict and carries out the chosen strategy.
    ///
    /// The offline record is applied before the conflict row is closed.
    /// Records keep their offline ids, so a racing second resolution fails on
    /// the primary key or on the closed conflict instead of applying twice.
    pub async fn resolve(&self, id: &str, request: ResolveRequest) -> ApiResult<SyncConflict> {
        validate_name("resolved_by", &request.resolved_by)?;

        let mut conflict = self.get_conflict(id).await?;
        let action = resolve_conflict(
            &mut conflict,
            request.strategy,
            request.resolved_by.trim(),
            Utc::now(),
        )?;

        if action != ResolutionAction::DiscardClient
            && !self
                .state
                .db
                .sync()
                .is_applied(&conflict.entity_type, &conflict.entity_id)
                .await?
        {
            self.carry_out(&conflict, action).await?;
            self.state
                .db
                .sync()
                .mark_applied(
                    &conflict.entity_type,
                    &conflict.entity_id,
                    &conflict.batch_id,
                    &conflict.device_id,
                )
                .await?;
        }

        self.state.db.sync().update_conflict(&conflict).await?;
        info!(
            id = %conflict.id,
            strategy = request.strategy.as_str(),
            action = ?action,
            "Conflict resolved"
        );
        Ok(conflict)
    }

    pub async fn ignore(&self, id: &str, request: IgnoreRequest) -> ApiResult<SyncConflict> {
        validate_name("resolved_by", &request.resolved_by)?;

        let mut conflict = self.get_conflict(id).await?;
        ignore_conflict(&mut conflict, request.resolved_by.trim(), Utc::now())?;
        self.state.db.sync().update_conflict(&conflict).await?;
        info!(id = %conflict.id, "Conflict ignored");
        Ok(conflict)
    }

    async fn carry_out(&self, conflict: &SyncConflict, action: ResolutionAction) -> ApiResult<()> {
        match conflict.entity_type.as_str() {
            ENTITY_SALE => {
                let sale: OfflineSale = payload(conflict)?;
                // Both sales are kept, so the offline one gets its own number.
                SaleService::new(self.state)
                    .record_offline(&sale, &conflict.device_id, true)
                    .await?;
            }
            ENTITY_PRODUCT => {
                let product: OfflineProduct = payload(conflict)?;
                match action {
                    ResolutionAction::ApplyClient | ResolutionAction::InsertAsNew => {
                        self.apply_product(&product, &product.fields).await?;
                    }
                    ResolutionAction::ApplyMerged => {
                        let target_id = conflict
                            .server_entity_id
                            .as_deref()
                            .unwrap_or(product.id.as_str());
                        let server = self
                            .state
                            .db
                            .products()
                            .get_by_id(target_id)
                            .await?
                            .ok_or_else(|| ApiError::not_found("Product", target_id))?;
                        let merged = merge_product_fields(&ProductFields::from(&server), &product);
                        self.state.db.products().apply_fields(&server.id, &merged).await?;
                    }
                    ResolutionAction::DiscardClient => {}
                }
            }
            ENTITY_STOCK_MOVEMENT => {
                let movement: OfflineStockMovement = payload(conflict)?;
                self.state
                    .db
                    .stock()
                    .record_offline(&movement, &conflict.device_id)
                    .await?;
            }
            other => {
                return Err(ApiError::internal(format!("unknown conflict entity {other}")));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn conflict_config(&self) -> ConflictConfig {
        self.state.config.sync.conflict_config()
    }

    fn validate_batch(&self, batch: &OfflineBatch) -> ApiResult<()> {
        if batch.batch_id.trim().is_empty() {
            return Err(ValidationError::required("batch_id").into());
        }
        if batch.device_id.trim().is_empty() {
            return Err(ValidationError::required("device_id").into());
        }
        let max = self.state.config.sync.max_batch_records;
        if batch.record_count() > max {
            return Err(ApiError::validation(format!(
                "batch has {} records, at most {max} are accepted",
                batch.record_count()
            )));
        }

        for sale in &batch.sales {
            if sale.items.is_empty() {
                return Err(ApiError::validation(format!("offline sale {} has no items", sale.id)));
            }
            for item in &sale.items {
                validate_quantity(item.quantity)?;
                validate_price_cents(item.unit_price_cents)?;
            }
            if sale.total_cents < 0 {
                return Err(ApiError::validation(format!(
                    "offline sale {} has a negative total",
                    sale.id
                )));
            }
        }
        for product in &batch.products {
            validate_sku(&product.fields.sku)?;
            validate_name("name", &product.fields.name)?;
            validate_price_cents(product.fields.price_cents)?;
        }
        for movement in &batch.stock_movements {
            if movement.quantity == 0 {
                return Err(ApiError::validation(format!(
                    "stock movement {} has zero quantity",
                    movement.id
                )));
            }
            validate_stock_quantity(movement.quantity.abs())?;
        }
        Ok(())
    }

    /// Skips records applied by an earlier upload and re-reports records
    /// already in conflict for this batch.
    async fn already_handled(
        &self,
        run: &mut BatchRun<'_>,
        entity_type: &str,
        id: &str,
    ) -> ApiResult<bool> {
        if self.state.db.sync().is_applied(entity_type, id).await? {
            run.outcome.skipped.push(id.to_string());
            return Ok(true);
        }
        if let Some(conflict) = run.existing.get(&format!("{entity_type}:{id}")) {
            run.outcome.conflicts.push(conflict.clone());
            return Ok(true);
        }
        Ok(false)
    }

    async fn raise(&self, run: &mut BatchRun<'_>, detected: DetectedConflict) -> ApiResult<()> {
        let record = detected.into_record(
            new_id(),
            &run.batch.batch_id,
            &run.batch.device_id,
            Utc::now(),
        );
        warn!(
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            kind = record.kind.as_str(),
            "Sync conflict raised"
        );
        self.state.db.sync().insert_conflict(&record).await?;
        run.outcome.conflicts.push(record);
        Ok(())
    }

    async fn mark(&self, run: &BatchRun<'_>, entity_type: &str, id: &str) -> ApiResult<()> {
        self.state
            .db
            .sync()
            .mark_applied(entity_type, id, &run.batch.batch_id, &run.batch.device_id)
            .await?;
        Ok(())
    }

    /// Writes client product fields, creating the product when it is new.
    async fn apply_product(&self, product: &OfflineProduct, fields: &ProductFields) -> ApiResult<()> {
        let products = self.state.db.products();
        if products.get_by_id(&product.id).await?.is_some() {
            products.apply_fields(&product.id, fields).await?;
        } else {
            let now = Utc::now();
            products
                .insert(&Product {
                    id: product.id.clone(),
                    sku: fields.sku.clone(),
                    name: fields.name.clone(),
                    description: None,
                    category_id: fields.category_id.clone(),
                    price_cents: fields.price_cents,
                    cost_cents: None,
                    vat_applicable: fields.vat_applicable,
                    is_available: fields.is_available,
                    track_inventory: false,
                    is_active: true,
                    created_at: product.updated_at,
                    updated_at: now,
                    sync_version: 1,
                })
                .await?;
        }
        Ok(())
    }
}

struct BatchRun<'b> {
    batch: &'b OfflineBatch,
    /// Conflicts raised by earlier uploads of this batch, keyed
    /// `entity_type:entity_id`.
    existing: HashMap<String, SyncConflict>,
    outcome: SyncOutcome,
}

fn payload<T: serde::de::DeserializeOwned>(conflict: &SyncConflict) -> ApiResult<T> {
    serde_json::from_str(&conflict.client_payload).map_err(|e| {
        tracing::error!(id = %conflict.id, error = %e, "Unreadable conflict payload");
        ApiError::internal("Conflict payload could not be read")
    })
}

fn unknown_product(sale: &OfflineSale, product_id: &str) -> DetectedConflict {
    let kind = ConflictKind::UnknownReference;
    let severity = ConflictSeverity::High;
    DetectedConflict {
        kind,
        severity,
        entity_type: ENTITY_SALE,
        entity_id: sale.id.clone(),
        server_entity_id: None,
        similarity: 0.0,
        message: format!("Offline sale {} refers to unknown product {product_id}", sale.id),
        suggested_strategy: suggest_strategy(kind, severity, false),
        client_payload: serde_json::to_value(sale).unwrap_or(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use bistro_core::conflict::OfflineSaleItem;
    use bistro_core::{
        ConflictStatus, Ingredient, Location, LocationKind, OrderType, StockMovementKind, Unit,
    };
    use bistro_db::{Database, DbConfig};

    use super::*;
    use crate::config::ApiConfig;

    async fn state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AppState::new(db, ApiConfig::default())
    }

    fn offline_product(id: &str, sku: &str, name: &str) -> OfflineProduct {
        OfflineProduct {
            id: id.to_string(),
            base_version: 0,
            fields: ProductFields {
                sku: sku.to_string(),
                name: name.to_string(),
                category_id: None,
                price_cents: 45_000,
                vat_applicable: true,
                is_available: true,
            },
            original: None,
            updated_at: Utc::now(),
        }
    }

    fn offline_sale(id: &str, product_id: &str) -> OfflineSale {
        OfflineSale {
            id: id.to_string(),
            receipt_number: None,
            order_type: OrderType::Takeaway,
            table_number: None,
            customer_name: None,
            cashier: "Kamala".to_string(),
            items: vec![OfflineSaleItem {
                product_id: product_id.to_string(),
                quantity: 1,
                unit_price_cents: 45_000,
            }],
            discount_cents: 0,
            subtotal_cents: 45_000,
            service_charge_cents: 0,
            vat_cents: 8_100,
            total_cents: 53_100,
            payment_method: Some(bistro_core::PaymentMethod::Cash),
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn batch(id: &str) -> OfflineBatch {
        OfflineBatch {
            batch_id: id.to_string(),
            device_id: "till-3".to_string(),
            sales: Vec::new(),
            products: Vec::new(),
            stock_movements: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_clean_batch_applies_once() {
        let state = state().await;
        let service = SyncService::new(&state);

        let mut upload = batch("b-1");
        upload.products.push(offline_product("p-kottu", "KOT-01", "Chicken Kottu"));
        upload.sales.push(offline_sale("s-1", "p-kottu"));

        let outcome = service.upload(upload.clone()).await.unwrap();
        assert_eq!(outcome.applied_products, vec!["p-kottu".to_string()]);
        assert_eq!(outcome.applied_sales, vec!["s-1".to_string()]);
        assert!(outcome.conflicts.is_empty());

        // Settled on the till, so the replayed sale is complete
        let sale = state.db.sales().get_by_id("s-1").await.unwrap().unwrap();
        assert_eq!(sale.status, bistro_core::SaleStatus::Completed);
        assert!(sale.receipt_number.starts_with("R-"));

        let again = service.upload(upload).await.unwrap();
        assert!(again.applied_products.is_empty());
        assert!(again.applied_sales.is_empty());
        assert_eq!(again.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_product_raises_manual_conflict() {
        let state = state().await;
        let service = SyncService::new(&state);

        let mut upload = batch("b-2");
        upload.sales.push(offline_sale("s-2", "p-missing"));

        let outcome = service.upload(upload).await.unwrap();
        assert!(outcome.applied_sales.is_empty());
        assert_eq!(outcome.conflicts.len(), 1);

        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::UnknownReference);
        assert_eq!(conflict.suggested_strategy, ResolutionStrategy::ManualReview);
        assert_eq!(state.db.sync().pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_similar_product_can_be_kept_as_new() {
        let state = state().await;
        let service = SyncService::new(&state);

        let mut first = batch("b-3");
        first.products.push(offline_product("p-a", "KOT-01", "Chicken Kottu"));
        service.upload(first).await.unwrap();

        let mut second = batch("b-4");
        second.products.push(offline_product("p-b", "KOT-02", "Chicken  Kottu"));
        let outcome = service.upload(second).await.unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::DuplicateProduct);

        let resolved = service
            .resolve(
                &outcome.conflicts[0].id,
                ResolveRequest {
                    strategy: ResolutionStrategy::KeepBoth,
                    resolved_by: "manager".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert!(state.db.products().get_by_id("p-b").await.unwrap().is_some());

        // Closed conflicts cannot be resolved again
        let err = service
            .ignore(
                &resolved.id,
                IgnoreRequest {
                    resolved_by: "manager".to_string(),
                },
            )
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_overdrawn_movement_waits_for_review() {
        let state = state().await;
        let service = SyncService::new(&state);
        let now = Utc::now();

        let ingredient = Ingredient {
            id: "ing-rice".to_string(),
            name: "Samba rice".to_string(),
            unit: Unit::Gram,
            reorder_level: 1_000,
            unit_cost_cents: 30_000,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let kitchen = Location {
            id: "loc-kitchen".to_string(),
            name: "Kitchen".to_string(),
            kind: LocationKind::Kitchen,
            is_active: true,
            created_at: now,
        };
        state.db.ingredients().insert(&ingredient).await.unwrap();
        state.db.locations().insert(&kitchen).await.unwrap();

        let movement = |id: &str, quantity: i64, kind| OfflineStockMovement {
            id: id.to_string(),
            ingredient_id: ingredient.id.clone(),
            location_id: kitchen.id.clone(),
            quantity,
            kind,
            notes: None,
            created_at: now,
        };

        let mut upload = batch("b-5");
        upload
            .stock_movements
            .push(movement("m-1", 2_000, StockMovementKind::Purchase));
        upload
            .stock_movements
            .push(movement("m-2", -3_000, StockMovementKind::Wastage));

        let outcome = service.upload(upload).await.unwrap();
        assert_eq!(outcome.applied_movements, vec!["m-1".to_string()]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::InsufficientStock);

        service
            .resolve(
                &outcome.conflicts[0].id,
                ResolveRequest {
                    strategy: ResolutionStrategy::KeepClient,
                    resolved_by: "manager".to_string(),
                },
            )
            .await
            .unwrap();

        let balances = state.db.stock().balance_map().await.unwrap();
        assert_eq!(balances.get(&ingredient.id, &kitchen.id), -1_000);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let mut config = ApiConfig::default();
        config.sync.max_batch_records = 1;
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = AppState::new(db, config);

        let mut upload = batch("b-6");
        upload.products.push(offline_product("p-1", "A-1", "Hoppers"));
        upload.products.push(offline_product("p-2", "A-2", "String hoppers"));

        assert!(SyncService::new(&state).upload(upload).await.is_err());
    }
}
