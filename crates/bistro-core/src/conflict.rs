//! # Offline Sync Conflict Detection
//!
//! Terminals keep selling while the back office is unreachable and upload
//! their records later as an [`OfflineBatch`]. Each record is compared with
//! server data before it is applied.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OfflineSale ──► similarity vs. recent server sales                     │
//! │                  ├── ≥ 0.90  DuplicateSale          High    KeepServer  │
//! │                  ├── ≥ 0.70  PossibleDuplicateSale  Medium  Manual      │
//! │                  └── else    apply                                      │
//! │                                                                         │
//! │  OfflineProduct ─► same id, server moved on, fields differ              │
//! │                  │   ├── price differs   ProductFieldMismatch High      │
//! │                  │   └── other fields    ProductFieldMismatch Low       │
//! │                  └─► new id, fuzzy name / same sku                      │
//! │                      DuplicateProduct Medium  Merge                     │
//! │                                                                         │
//! │  OfflineStockMovement ─► unknown ingredient/location  High              │
//! │                       └► balance would go negative    Critical          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sale Similarity
//! ```text
//! score = 0.35 × total  + 0.35 × items (Jaccard)
//!       + 0.20 × time   + 0.10 × same table / customer
//! ```
//! An identical receipt number short-circuits to 1.0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::stock::StockBalances;
use crate::types::{
    ConflictKind, ConflictSeverity, ConflictStatus, OrderType, PaymentMethod, Product,
    ResolutionStrategy, Sale, SaleItem, StockMovementKind, SyncConflict,
};

pub const WEIGHT_TOTAL: f64 = 0.35;
pub const WEIGHT_ITEMS: f64 = 0.35;
pub const WEIGHT_TIME: f64 = 0.20;
pub const WEIGHT_CONTEXT: f64 = 0.10;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Sales further apart than this are never duplicates.
    pub duplicate_window_minutes: i64,
    pub duplicate_threshold: f64,
    pub possible_duplicate_threshold: f64,
    pub name_similarity_threshold: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        ConflictConfig {
            duplicate_window_minutes: 10,
            duplicate_threshold: 0.90,
            possible_duplicate_threshold: 0.70,
            name_similarity_threshold: 0.85,
        }
    }
}

// =============================================================================
// Offline Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineSaleItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// A sale rung up on a terminal while offline, with totals as the terminal
/// computed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineSale {
    pub id: String,
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub cashier: String,
    pub items: Vec<OfflineSaleItem>,
    #[serde(default)]
    pub discount_cents: i64,
    pub subtotal_cents: i64,
    #[serde(default)]
    pub service_charge_cents: i64,
    #[serde(default)]
    pub vat_cents: i64,
    pub total_cents: i64,
    /// How the customer paid, if the sale was settled on the terminal.
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Editable product fields carried by an offline product record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductFields {
    pub sku: String,
    pub name: String,
    pub category_id: Option<String>,
    pub price_cents: i64,
    pub vat_applicable: bool,
    pub is_available: bool,
}

impl From<&Product> for ProductFields {
    fn from(p: &Product) -> Self {
        ProductFields {
            sku: p.sku.clone(),
            name: p.name.clone(),
            category_id: p.category_id.clone(),
            price_cents: p.price_cents,
            vat_applicable: p.vat_applicable,
            is_available: p.is_available,
        }
    }
}

/// A product created or edited on a terminal while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineProduct {
    pub id: String,
    /// `sync_version` the terminal last saw; 0 for products it created.
    #[serde(default)]
    pub base_version: i64,
    pub fields: ProductFields,
    /// Field values before the offline edit.
    pub original: Option<ProductFields>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineStockMovement {
    pub id: String,
    pub ingredient_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub kind: StockMovementKind,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Everything one terminal uploads after reconnecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OfflineBatch {
    pub batch_id: String,
    pub device_id: String,
    #[serde(default)]
    pub sales: Vec<OfflineSale>,
    #[serde(default)]
    pub products: Vec<OfflineProduct>,
    #[serde(default)]
    pub stock_movements: Vec<OfflineStockMovement>,
}

impl OfflineBatch {
    pub fn record_count(&self) -> usize {
        self.sales.len() + self.products.len() + self.stock_movements.len()
    }
}

// =============================================================================
// Detected Conflicts
// =============================================================================

/// A conflict found by one of the `check_*` functions, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedConflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub server_entity_id: Option<String>,
    pub similarity: f64,
    pub message: String,
    pub suggested_strategy: ResolutionStrategy,
    pub client_payload: serde_json::Value,
}

impl DetectedConflict {
    /// Turns the detection into a persisted conflict row.
    pub fn into_record(
        self,
        id: String,
        batch_id: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> SyncConflict {
        SyncConflict {
            id,
            batch_id: batch_id.to_string(),
            device_id: device_id.to_string(),
            kind: self.kind,
            severity: self.severity,
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id,
            server_entity_id: self.server_entity_id,
            similarity: self.similarity,
            message: self.message,
            client_payload: self.client_payload.to_string(),
            suggested_strategy: self.suggested_strategy,
            status: ConflictStatus::Pending,
            resolution_strategy: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
        }
    }
}

/// The strategy offered first for a conflict.
pub fn suggest_strategy(
    kind: ConflictKind,
    severity: ConflictSeverity,
    client_is_newer: bool,
) -> ResolutionStrategy {
    match kind {
        ConflictKind::DuplicateSale => ResolutionStrategy::KeepServer,
        ConflictKind::PossibleDuplicateSale => ResolutionStrategy::ManualReview,
        ConflictKind::ProductFieldMismatch => match severity {
            ConflictSeverity::High | ConflictSeverity::Critical => ResolutionStrategy::KeepServer,
            _ if client_is_newer => ResolutionStrategy::KeepClient,
            _ => ResolutionStrategy::Merge,
        },
        ConflictKind::DuplicateProduct => ResolutionStrategy::Merge,
        ConflictKind::InsufficientStock | ConflictKind::UnknownReference => {
            ResolutionStrategy::ManualReview
        }
    }
}

// =============================================================================
// Sale Duplicates
// =============================================================================

/// The parts of a sale that duplicate detection looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleFingerprint {
    pub id: String,
    pub receipt_number: Option<String>,
    pub total_cents: i64,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<(String, i64)>,
}

impl SaleFingerprint {
    pub fn from_sale(sale: &Sale, items: &[SaleItem]) -> Self {
        SaleFingerprint {
            id: sale.id.clone(),
            receipt_number: Some(sale.receipt_number.clone()),
            total_cents: sale.total_cents,
            table_number: sale.table_number.clone(),
            customer_name: sale.customer_name.clone(),
            created_at: sale.created_at,
            items: items
                .iter()
                .map(|i| (i.product_id.clone(), i.quantity))
                .collect(),
        }
    }

    pub fn from_offline(sale: &OfflineSale) -> Self {
        SaleFingerprint {
            id: sale.id.clone(),
            receipt_number: sale.receipt_number.clone(),
            total_cents: sale.total_cents,
            table_number: sale.table_number.clone(),
            customer_name: sale.customer_name.clone(),
            created_at: sale.created_at,
            items: sale
                .items
                .iter()
                .map(|i| (i.product_id.clone(), i.quantity))
                .collect(),
        }
    }
}

/// Weighted similarity of two sales in `[0.0, 1.0]`.
pub fn sale_similarity(a: &SaleFingerprint, b: &SaleFingerprint, window_minutes: i64) -> f64 {
    if let (Some(ra), Some(rb)) = (&a.receipt_number, &b.receipt_number) {
        if !ra.is_empty() && ra == rb {
            return 1.0;
        }
    }

    let total = amount_similarity(a.total_cents, b.total_cents);
    let items = jaccard(&a.items, &b.items);
    let time = time_proximity(a.created_at, b.created_at, window_minutes);
    let context = if same_text(&a.table_number, &b.table_number)
        || same_text(&a.customer_name, &b.customer_name)
    {
        1.0
    } else {
        0.0
    };

    WEIGHT_TOTAL * total + WEIGHT_ITEMS * items + WEIGHT_TIME * time + WEIGHT_CONTEXT * context
}

fn amount_similarity(a: i64, b: i64) -> f64 {
    let max = a.abs().max(b.abs());
    if max == 0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() as f64 / max as f64).max(0.0)
}

fn jaccard(a: &[(String, i64)], b: &[(String, i64)]) -> f64 {
    let sa: HashSet<&(String, i64)> = a.iter().collect();
    let sb: HashSet<&(String, i64)> = b.iter().collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 1.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

fn time_proximity(a: DateTime<Utc>, b: DateTime<Utc>, window_minutes: i64) -> f64 {
    let window = window_minutes.max(1).saturating_mul(60) as f64;
    let gap = (a - b).num_seconds().abs() as f64;
    (1.0 - gap / window).max(0.0)
}

fn same_text(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = a.trim();
            !a.is_empty() && a.eq_ignore_ascii_case(b.trim())
        }
        _ => false,
    }
}

/// Compares one offline sale with candidate server sales.
///
/// Candidates outside the duplicate window are skipped unless they share the
/// receipt number. Returns the conflict for the best match, if any.
pub fn check_sale(
    sale: &OfflineSale,
    candidates: &[SaleFingerprint],
    config: &ConflictConfig,
) -> Option<DetectedConflict> {
    let offline = SaleFingerprint::from_offline(sale);
    let window = chrono::Duration::try_minutes(config.duplicate_window_minutes)
        .unwrap_or(chrono::Duration::MAX);

    let best = candidates
        .iter()
        .filter(|c| c.id != offline.id)
        .filter(|c| {
            (c.created_at - offline.created_at).abs() <= window
                || (offline.receipt_number.is_some() && c.receipt_number == offline.receipt_number)
        })
        .map(|c| (c, sale_similarity(&offline, c, config.duplicate_window_minutes)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let (server, score) = best;
    let (kind, severity) = if score >= config.duplicate_threshold {
        (ConflictKind::DuplicateSale, ConflictSeverity::High)
    } else if score >= config.possible_duplicate_threshold {
        (ConflictKind::PossibleDuplicateSale, ConflictSeverity::Medium)
    } else {
        return None;
    };

    Some(DetectedConflict {
        kind,
        severity,
        entity_type: "sale",
        entity_id: sale.id.clone(),
        server_entity_id: Some(server.id.clone()),
        similarity: (score * 1000.0).round() / 1000.0,
        message: format!(
            "Offline sale {} matches server sale {} ({:.0}% similar)",
            sale.id,
            server.id,
            score * 100.0
        ),
        suggested_strategy: suggest_strategy(kind, severity, false),
        client_payload: serde_json::to_value(sale).unwrap_or(serde_json::Value::Null),
    })
}

// =============================================================================
// Products
// =============================================================================

/// Lowercase, punctuation stripped, whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length` over normalized names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Names of fields that differ between two product snapshots.
pub fn changed_fields(a: &ProductFields, b: &ProductFields) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if a.sku != b.sku {
        fields.push("sku");
    }
    if a.name != b.name {
        fields.push("name");
    }
    if a.category_id != b.category_id {
        fields.push("category_id");
    }
    if a.price_cents != b.price_cents {
        fields.push("price_cents");
    }
    if a.vat_applicable != b.vat_applicable {
        fields.push("vat_applicable");
    }
    if a.is_available != b.is_available {
        fields.push("is_available");
    }
    fields
}

/// Compares an offline product with the server catalog.
///
/// `existing` is the server product with the same id, if there is one.
/// A client edit based on the current server version applies cleanly.
pub fn check_product(
    product: &OfflineProduct,
    existing: Option<&Product>,
    catalog: &[Product],
    config: &ConflictConfig,
) -> Option<DetectedConflict> {
    let payload = || serde_json::to_value(product).unwrap_or(serde_json::Value::Null);

    if let Some(server) = existing {
        if server.sync_version <= product.base_version {
            return None;
        }
        let server_fields = ProductFields::from(server);
        let diff = changed_fields(&server_fields, &product.fields);
        if diff.is_empty() {
            return None;
        }

        let severity = if diff.contains(&"price_cents") {
            ConflictSeverity::High
        } else {
            ConflictSeverity::Low
        };
        let kind = ConflictKind::ProductFieldMismatch;
        let client_is_newer = product.updated_at > server.updated_at;

        return Some(DetectedConflict {
            kind,
            severity,
            entity_type: "product",
            entity_id: product.id.clone(),
            server_entity_id: Some(server.id.clone()),
            similarity: 1.0,
            message: format!(
                "Product {} changed on server (v{}) and offline (base v{}): {}",
                server.sku,
                server.sync_version,
                product.base_version,
                diff.join(", ")
            ),
            suggested_strategy: suggest_strategy(kind, severity, client_is_newer),
            client_payload: payload(),
        });
    }

    let (best, score) = catalog
        .iter()
        .filter(|p| p.is_active && p.id != product.id)
        .map(|p| {
            let score = if p.sku.eq_ignore_ascii_case(&product.fields.sku) {
                1.0
            } else {
                name_similarity(&p.name, &product.fields.name)
            };
            (p, score)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    if score < config.name_similarity_threshold {
        return None;
    }

    let kind = ConflictKind::DuplicateProduct;
    let severity = ConflictSeverity::Medium;
    Some(DetectedConflict {
        kind,
        severity,
        entity_type: "product",
        entity_id: product.id.clone(),
        server_entity_id: Some(best.id.clone()),
        similarity: (score * 1000.0).round() / 1000.0,
        message: format!(
            "Offline product '{}' looks like existing '{}' ({})",
            product.fields.name, best.name, best.sku
        ),
        suggested_strategy: suggest_strategy(kind, severity, false),
        client_payload: payload(),
    })
}

/// Field-level merge.
///
/// Server values win, except fields the client changed that the server did
/// not. Without the client's original snapshot nothing can be attributed
/// to the client, and the server version is returned.
pub fn merge_product_fields(server: &ProductFields, client: &OfflineProduct) -> ProductFields {
    let Some(original) = &client.original else {
        return server.clone();
    };
    let mine = &client.fields;

    fn pick<T: Clone + PartialEq>(server: &T, original: &T, client: &T) -> T {
        if client != original && server == original {
            client.clone()
        } else {
            server.clone()
        }
    }

    ProductFields {
        sku: pick(&server.sku, &original.sku, &mine.sku),
        name: pick(&server.name, &original.name, &mine.name),
        category_id: pick(&server.category_id, &original.category_id, &mine.category_id),
        price_cents: pick(&server.price_cents, &original.price_cents, &mine.price_cents),
        vat_applicable: pick(
            &server.vat_applicable,
            &original.vat_applicable,
            &mine.vat_applicable,
        ),
        is_available: pick(&server.is_available, &original.is_available, &mine.is_available),
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Compares an offline stock movement with known references and balances.
pub fn check_stock_movement(
    movement: &OfflineStockMovement,
    balances: &StockBalances,
    ingredient_exists: bool,
    location_exists: bool,
) -> Option<DetectedConflict> {
    let payload = || serde_json::to_value(movement).unwrap_or(serde_json::Value::Null);

    if !ingredient_exists || !location_exists {
        let missing = if !ingredient_exists {
            format!("ingredient {}", movement.ingredient_id)
        } else {
            format!("location {}", movement.location_id)
        };
        let kind = ConflictKind::UnknownReference;
        let severity = ConflictSeverity::High;
        return Some(DetectedConflict {
            kind,
            severity,
            entity_type: "stock_movement",
            entity_id: movement.id.clone(),
            server_entity_id: None,
            similarity: 0.0,
            message: format!("Offline stock movement refers to unknown {missing}"),
            suggested_strategy: suggest_strategy(kind, severity, false),
            client_payload: payload(),
        });
    }

    if movement.quantity < 0 {
        let available = balances.get(&movement.ingredient_id, &movement.location_id);
        if available + movement.quantity < 0 {
            let kind = ConflictKind::InsufficientStock;
            let severity = ConflictSeverity::Critical;
            return Some(DetectedConflict {
                kind,
                severity,
                entity_type: "stock_movement",
                entity_id: movement.id.clone(),
                server_entity_id: None,
                similarity: 0.0,
                message: format!(
                    "Deducting {} of {} at {} leaves {} (on hand {})",
                    -movement.quantity,
                    movement.ingredient_id,
                    movement.location_id,
                    available + movement.quantity,
                    available
                ),
                suggested_strategy: suggest_strategy(kind, severity, false),
                client_payload: payload(),
            });
        }
    }

    None
}

// =============================================================================
// Resolution
// =============================================================================

/// What the sync service must do to carry out a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Drop the offline record.
    DiscardClient,
    /// Apply the offline record over server data.
    ApplyClient,
    /// Apply the field-level merge.
    ApplyMerged,
    /// Store the offline record as a new, separate entity.
    InsertAsNew,
}

fn action_for(kind: ConflictKind, strategy: ResolutionStrategy) -> Option<ResolutionAction> {
    use ConflictKind as K;
    use ResolutionStrategy as S;

    match (kind, strategy) {
        (_, S::KeepServer) => Some(ResolutionAction::DiscardClient),
        (K::DuplicateSale | K::PossibleDuplicateSale, S::KeepBoth) => {
            Some(ResolutionAction::InsertAsNew)
        }
        (K::ProductFieldMismatch, S::KeepClient) => Some(ResolutionAction::ApplyClient),
        (K::ProductFieldMismatch | K::DuplicateProduct, S::Merge) => {
            Some(ResolutionAction::ApplyMerged)
        }
        (K::DuplicateProduct, S::KeepBoth) => Some(ResolutionAction::InsertAsNew),
        (K::InsufficientStock, S::KeepClient) => Some(ResolutionAction::ApplyClient),
        _ => None,
    }
}

/// Strategies that can close a conflict of `kind`.
///
/// `ManualReview` is never among them: it is only ever suggested, to flag
/// that a manager has to pick one of these.
pub fn applicable_strategies(kind: ConflictKind) -> Vec<ResolutionStrategy> {
    ResolutionStrategy::ALL
        .into_iter()
        .filter(|s| action_for(kind, *s).is_some())
        .collect()
}

/// Maps a strategy to an action, rejecting combinations that make no sense
/// for the conflict kind.
pub fn resolution_action(
    kind: ConflictKind,
    strategy: ResolutionStrategy,
) -> CoreResult<ResolutionAction> {
    action_for(kind, strategy).ok_or_else(|| CoreError::StrategyNotApplicable {
        strategy: strategy.as_str().to_string(),
        kind: kind.as_str().to_string(),
        allowed: applicable_strategies(kind)
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Checks a conflict can still be closed.
pub fn ensure_pending(conflict: &SyncConflict) -> CoreResult<()> {
    if conflict.status != ConflictStatus::Pending {
        return Err(CoreError::ConflictAlreadyClosed {
            id: conflict.id.clone(),
            status: conflict.status.as_str().to_string(),
        });
    }
    Ok(())
}

/// Marks a conflict resolved with `strategy`.
pub fn resolve(
    conflict: &mut SyncConflict,
    strategy: ResolutionStrategy,
    resolved_by: &str,
    now: DateTime<Utc>,
) -> CoreResult<ResolutionAction> {
    ensure_pending(conflict)?;
    let action = resolution_action(conflict.kind, strategy)?;
    conflict.status = ConflictStatus::Resolved;
    conflict.resolution_strategy = Some(strategy);
    conflict.resolved_by = Some(resolved_by.to_string());
    conflict.resolved_at = Some(now);
    Ok(action)
}

/// Marks a conflict ignored. The offline record stays unapplied.
pub fn ignore(conflict: &mut SyncConflict, resolved_by: &str, now: DateTime<Utc>) -> CoreResult<()> {
    ensure_pending(conflict)?;
    conflict.status = ConflictStatus::Ignored;
    conflict.resolved_by = Some(resolved_by.to_string());
    conflict.resolved_at = Some(now);
    Ok(())
}

// =============================================================================
// Batch Outcome
// =============================================================================

/// Result of processing one offline batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncOutcome {
    pub batch_id: String,
    pub applied_sales: Vec<String>,
    pub applied_products: Vec<String>,
    pub applied_movements: Vec<String>,
    /// Records already applied by an earlier upload of the same batch.
    pub skipped: Vec<String>,
    pub conflicts: Vec<SyncConflict>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fingerprint(id: &str, total: i64, minutes: i64, items: &[(&str, i64)]) -> SaleFingerprint {
        SaleFingerprint {
            id: id.into(),
            receipt_number: Some(format!("R-{id}")),
            total_cents: total,
            table_number: Some("5".into()),
            customer_name: None,
            created_at: base_time() + Duration::minutes(minutes),
            items: items.iter().map(|(p, q)| (p.to_string(), *q)).collect(),
        }
    }

    fn offline_sale(id: &str, total: i64, minutes: i64, items: &[(&str, i64)]) -> OfflineSale {
        OfflineSale {
            id: id.into(),
            receipt_number: None,
            order_type: OrderType::DineIn,
            table_number: Some("5".into()),
            customer_name: None,
            cashier: "Kamal".into(),
            items: items
                .iter()
                .map(|(p, q)| OfflineSaleItem {
                    product_id: p.to_string(),
                    quantity: *q,
                    unit_price_cents: 0,
                })
                .collect(),
            discount_cents: 0,
            subtotal_cents: total,
            service_charge_cents: 0,
            vat_cents: 0,
            total_cents: total,
            payment_method: Some(PaymentMethod::Cash),
            notes: None,
            created_at: base_time() + Duration::minutes(minutes),
        }
    }

    fn product(id: &str, sku: &str, name: &str, price: i64, version: i64) -> Product {
        Product {
            id: id.into(),
            sku: sku.into(),
            name: name.into(),
            description: None,
            category_id: None,
            price_cents: price,
            cost_cents: None,
            vat_applicable: true,
            is_available: true,
            track_inventory: false,
            is_active: true,
            created_at: base_time(),
            updated_at: base_time(),
            sync_version: version,
        }
    }

    #[test]
    fn test_identical_sales_score_one() {
        let a = fingerprint("a", 150_000, 0, &[("kottu", 2)]);
        let mut b = a.clone();
        b.id = "b".into();
        b.receipt_number = None;
        assert!((sale_similarity(&a, &b, 10) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_receipt_number_short_circuits() {
        let a = fingerprint("a", 100, 0, &[("x", 1)]);
        let mut b = fingerprint("b", 99_999, 60, &[("y", 9)]);
        b.receipt_number = a.receipt_number.clone();
        assert_eq!(sale_similarity(&a, &b, 10), 1.0);
    }

    #[test]
    fn test_similarity_components() {
        // same total, same items, 5 minutes apart, same table
        let a = fingerprint("a", 100_000, 0, &[("kottu", 1)]);
        let b = fingerprint("b", 100_000, 5, &[("kottu", 1)]);
        let score = sale_similarity(&a, &b, 10);
        assert!((score - 0.90).abs() < 1e-9, "{score}");

        // Jaccard of {kottu×1} and {kottu×1, tea×1} is 0.5
        let c = fingerprint("c", 100_000, 0, &[("kottu", 1), ("tea", 1)]);
        let score = sale_similarity(&a, &c, 10);
        assert!((score - (0.35 + 0.175 + 0.20 + 0.10)).abs() < 1e-9, "{score}");
    }

    #[test]
    fn test_check_sale_duplicate_and_possible() {
        let server = vec![fingerprint("srv", 100_000, 0, &[("kottu", 2)])];
        let config = ConflictConfig::default();

        let dup = check_sale(&offline_sale("off-1", 100_000, 1, &[("kottu", 2)]), &server, &config)
            .unwrap();
        assert_eq!(dup.kind, ConflictKind::DuplicateSale);
        assert_eq!(dup.severity, ConflictSeverity::High);
        assert_eq!(dup.suggested_strategy, ResolutionStrategy::KeepServer);
        assert_eq!(dup.server_entity_id.as_deref(), Some("srv"));

        // Same total and time, different table, partly different items
        let mut possible = offline_sale("off-2", 100_000, 0, &[("kottu", 2), ("tea", 2)]);
        possible.table_number = Some("9".into());
        let conflict = check_sale(&possible, &server, &config).unwrap();
        assert_eq!(conflict.kind, ConflictKind::PossibleDuplicateSale);
        assert_eq!(conflict.suggested_strategy, ResolutionStrategy::ManualReview);
    }

    #[test]
    fn test_check_sale_outside_window_is_clean() {
        let server = vec![fingerprint("srv", 100_000, 0, &[("kottu", 2)])];
        let later = offline_sale("off", 100_000, 45, &[("kottu", 2)]);
        assert!(check_sale(&later, &server, &ConflictConfig::default()).is_none());
    }

    #[test]
    fn test_check_sale_with_unbounded_window() {
        let server = vec![fingerprint("srv", 100_000, 0, &[("kottu", 2)])];
        let later = offline_sale("off", 100_000, 45, &[("kottu", 2)]);
        let config = ConflictConfig {
            duplicate_window_minutes: i64::MAX,
            ..ConflictConfig::default()
        };
        let conflict = check_sale(&later, &server, &config).unwrap();
        assert_eq!(conflict.kind, ConflictKind::DuplicateSale);
    }

    #[test]
    fn test_check_sale_different_order_is_clean() {
        let server = vec![fingerprint("srv", 100_000, 0, &[("kottu", 2)])];
        let mut other = offline_sale("off", 35_000, 8, &[("tea", 3)]);
        other.table_number = Some("2".into());
        assert!(check_sale(&other, &server, &ConflictConfig::default()).is_none());
    }

    #[test]
    fn test_levenshtein_and_name_similarity() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);

        assert!(name_similarity("Chicken Kottu", "chicken  kottu!") > 0.99);
        assert!(name_similarity("Chicken Kotu", "Chicken Kottu") >= 0.85);
        assert!(name_similarity("Egg Hopper", "Chicken Kottu") < 0.5);
    }

    fn offline_product(id: &str, fields: ProductFields, base_version: i64) -> OfflineProduct {
        OfflineProduct {
            id: id.into(),
            base_version,
            fields,
            original: None,
            updated_at: base_time() + Duration::minutes(30),
        }
    }

    #[test]
    fn test_product_fast_forward_is_clean() {
        let server = product("p1", "KOTTU", "Chicken Kottu", 120_000, 3);
        let mut fields = ProductFields::from(&server);
        fields.price_cents = 130_000;
        let offline = offline_product("p1", fields, 3);
        assert!(check_product(&offline, Some(&server), &[], &ConflictConfig::default()).is_none());
    }

    #[test]
    fn test_product_price_mismatch_is_high() {
        let server = product("p1", "KOTTU", "Chicken Kottu", 120_000, 4);
        let mut fields = ProductFields::from(&server);
        fields.price_cents = 130_000;
        let offline = offline_product("p1", fields, 3);
        let c = check_product(&offline, Some(&server), &[], &ConflictConfig::default()).unwrap();
        assert_eq!(c.kind, ConflictKind::ProductFieldMismatch);
        assert_eq!(c.severity, ConflictSeverity::High);
        assert_eq!(c.suggested_strategy, ResolutionStrategy::KeepServer);
        assert!(c.message.contains("price_cents"));
    }

    #[test]
    fn test_product_minor_mismatch_newer_client_wins() {
        let server = product("p1", "KOTTU", "Chicken Kottu", 120_000, 4);
        let mut fields = ProductFields::from(&server);
        fields.is_available = false;
        let offline = offline_product("p1", fields, 3);
        let c = check_product(&offline, Some(&server), &[], &ConflictConfig::default()).unwrap();
        assert_eq!(c.severity, ConflictSeverity::Low);
        assert_eq!(c.suggested_strategy, ResolutionStrategy::KeepClient);
    }

    #[test]
    fn test_duplicate_product_by_name() {
        let catalog = vec![
            product("p1", "KOTTU-CHK", "Chicken Kottu", 120_000, 1),
            product("p2", "HOPPER-EGG", "Egg Hopper", 12_000, 1),
        ];
        let fields = ProductFields {
            sku: "KOTTU-CHICKEN".into(),
            name: "Chiken Kottu".into(),
            category_id: None,
            price_cents: 120_000,
            vat_applicable: true,
            is_available: true,
        };
        let c = check_product(
            &offline_product("new", fields, 0),
            None,
            &catalog,
            &ConflictConfig::default(),
        )
        .unwrap();
        assert_eq!(c.kind, ConflictKind::DuplicateProduct);
        assert_eq!(c.server_entity_id.as_deref(), Some("p1"));
        assert_eq!(c.suggested_strategy, ResolutionStrategy::Merge);
    }

    #[test]
    fn test_new_distinct_product_is_clean() {
        let catalog = vec![product("p1", "KOTTU-CHK", "Chicken Kottu", 120_000, 1)];
        let fields = ProductFields {
            sku: "WATTALAPAM".into(),
            name: "Watalappan".into(),
            category_id: None,
            price_cents: 45_000,
            vat_applicable: true,
            is_available: true,
        };
        assert!(check_product(
            &offline_product("new", fields, 0),
            None,
            &catalog,
            &ConflictConfig::default()
        )
        .is_none());
    }

    #[test]
    fn test_merge_product_fields() {
        let original = ProductFields {
            sku: "KOTTU".into(),
            name: "Chicken Kottu".into(),
            category_id: None,
            price_cents: 120_000,
            vat_applicable: true,
            is_available: true,
        };
        // server changed price, client changed availability and price
        let server = ProductFields {
            price_cents: 125_000,
            ..original.clone()
        };
        let client = OfflineProduct {
            id: "p1".into(),
            base_version: 1,
            fields: ProductFields {
                price_cents: 130_000,
                is_available: false,
                ..original.clone()
            },
            original: Some(original.clone()),
            updated_at: base_time(),
        };
        let merged = merge_product_fields(&server, &client);
        assert_eq!(merged.price_cents, 125_000);
        assert!(!merged.is_available);

        let no_original = OfflineProduct {
            original: None,
            ..client
        };
        assert_eq!(merge_product_fields(&server, &no_original), server);
    }

    fn movement(qty: i64) -> OfflineStockMovement {
        OfflineStockMovement {
            id: "m1".into(),
            ingredient_id: "rice".into(),
            location_id: "kitchen".into(),
            quantity: qty,
            kind: StockMovementKind::SaleConsumption,
            notes: None,
            created_at: base_time(),
        }
    }

    #[test]
    fn test_stock_movement_checks() {
        let mut balances = StockBalances::new();
        balances.set("rice", "kitchen", 500);

        assert!(check_stock_movement(&movement(-500), &balances, true, true).is_none());
        assert!(check_stock_movement(&movement(1_000), &balances, true, true).is_none());

        let c = check_stock_movement(&movement(-501), &balances, true, true).unwrap();
        assert_eq!(c.kind, ConflictKind::InsufficientStock);
        assert_eq!(c.severity, ConflictSeverity::Critical);
        assert_eq!(c.suggested_strategy, ResolutionStrategy::ManualReview);

        let c = check_stock_movement(&movement(-1), &balances, false, true).unwrap();
        assert_eq!(c.kind, ConflictKind::UnknownReference);
        assert!(c.message.contains("ingredient rice"));
    }

    fn record(kind: ConflictKind) -> SyncConflict {
        DetectedConflict {
            kind,
            severity: ConflictSeverity::High,
            entity_type: "sale",
            entity_id: "off-1".into(),
            server_entity_id: Some("srv".into()),
            similarity: 0.95,
            message: "dup".into(),
            suggested_strategy: ResolutionStrategy::KeepServer,
            client_payload: serde_json::json!({"id": "off-1"}),
        }
        .into_record("c1".into(), "b1", "till-1", base_time())
    }

    #[test]
    fn test_resolve_and_ignore_lifecycle() {
        let mut c = record(ConflictKind::DuplicateSale);
        assert_eq!(c.status, ConflictStatus::Pending);
        assert_eq!(c.client_payload, r#"{"id":"off-1"}"#);

        let action = resolve(&mut c, ResolutionStrategy::KeepBoth, "manager", base_time()).unwrap();
        assert_eq!(action, ResolutionAction::InsertAsNew);
        assert_eq!(c.status, ConflictStatus::Resolved);
        assert_eq!(c.resolution_strategy, Some(ResolutionStrategy::KeepBoth));

        assert!(matches!(
            resolve(&mut c, ResolutionStrategy::KeepServer, "manager", base_time()),
            Err(CoreError::ConflictAlreadyClosed { .. })
        ));
        assert!(ignore(&mut c, "manager", base_time()).is_err());

        let mut other = record(ConflictKind::DuplicateSale);
        ignore(&mut other, "manager", base_time()).unwrap();
        assert_eq!(other.status, ConflictStatus::Ignored);
        assert!(other.resolution_strategy.is_none());
    }

    #[test]
    fn test_strategy_applicability() {
        assert!(resolution_action(ConflictKind::DuplicateSale, ResolutionStrategy::Merge).is_err());
        assert!(resolution_action(ConflictKind::UnknownReference, ResolutionStrategy::KeepClient)
            .is_err());
        assert!(
            resolution_action(ConflictKind::ProductFieldMismatch, ResolutionStrategy::ManualReview)
                .is_err()
        );
        assert_eq!(
            resolution_action(ConflictKind::InsufficientStock, ResolutionStrategy::KeepClient)
                .unwrap(),
            ResolutionAction::ApplyClient
        );
        assert_eq!(
            resolution_action(ConflictKind::DuplicateProduct, ResolutionStrategy::Merge).unwrap(),
            ResolutionAction::ApplyMerged
        );
    }

    #[test]
    fn test_outcomes_compare_their_conflicts() {
        let outcome = SyncOutcome {
            batch_id: "b1".into(),
            conflicts: vec![record(ConflictKind::DuplicateSale)],
            ..SyncOutcome::default()
        };
        assert_eq!(outcome.clone(), outcome);

        let mut closed = outcome.clone();
        ignore(&mut closed.conflicts[0], "manager", base_time()).unwrap();
        assert_ne!(closed, outcome);
    }

    #[test]
    fn test_manual_review_names_real_options() {
        use ResolutionStrategy as S;
        assert_eq!(
            applicable_strategies(ConflictKind::PossibleDuplicateSale),
            vec![S::KeepServer, S::KeepBoth]
        );
        assert_eq!(
            applicable_strategies(ConflictKind::InsufficientStock),
            vec![S::KeepServer, S::KeepClient]
        );
        assert_eq!(applicable_strategies(ConflictKind::UnknownReference), vec![S::KeepServer]);

        for kind in [
            ConflictKind::PossibleDuplicateSale,
            ConflictKind::InsufficientStock,
            ConflictKind::UnknownReference,
        ] {
            assert_eq!(suggest_strategy(kind, ConflictSeverity::High, false), S::ManualReview);
            assert!(!applicable_strategies(kind).contains(&S::ManualReview));
            let err = resolution_action(kind, S::ManualReview).unwrap_err().to_string();
            assert!(err.contains("keep_server"), "{err}");
        }
    }

    #[test]
    fn test_batch_deserializes_with_defaults() {
        let json = r#"{"batch_id":"b1","device_id":"till-1"}"#;
        let batch: OfflineBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.record_count(), 0);
    }
}
