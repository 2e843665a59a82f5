//! # Stock Netting
//!
//! Per-location stock is never stored as a number. It is the sum of signed
//! [`StockTransaction`] rows, and every change is planned here as new rows
//! before `bistro-db` writes them inside one database transaction.
//!
//! ## Transfer
//! ```text
//! ┌──────────────┐   TransferOut  −500 g   ┌──────────────┐
//! │  Main Store  │ ──────────────────────► │   Kitchen    │
//! │  rice 2000 g │   TransferIn   +500 g   │  rice  300 g │
//! └──────────────┘                         └──────────────┘
//!         1500 g                                   800 g
//! ```
//! Two rows per line, one at each end. The sum over all locations is
//! unchanged by a transfer.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    Ingredient, RecipeLine, StockIssueKind, StockMovementKind, StockTransaction, Unit,
};
use crate::validation::validate_stock_quantity;

// =============================================================================
// Balances
// =============================================================================

/// Net quantity per (ingredient, location).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockBalances {
    inner: HashMap<(String, String), i64>,
}

impl StockBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity on hand; zero when nothing was ever recorded.
    pub fn get(&self, ingredient_id: &str, location_id: &str) -> i64 {
        self.inner
            .get(&(ingredient_id.to_string(), location_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Total across all locations.
    pub fn total_for(&self, ingredient_id: &str) -> i64 {
        self.inner
            .iter()
            .filter(|((ing, _), _)| ing == ingredient_id)
            .map(|(_, qty)| *qty)
            .sum()
    }

    pub fn add(&mut self, ingredient_id: &str, location_id: &str, quantity: i64) {
        *self
            .inner
            .entry((ingredient_id.to_string(), location_id.to_string()))
            .or_insert(0) += quantity;
    }

    pub fn set(&mut self, ingredient_id: &str, location_id: &str, quantity: i64) {
        self.inner
            .insert((ingredient_id.to_string(), location_id.to_string()), quantity);
    }

    /// Applies planned movements on top of the current balances.
    pub fn apply(&mut self, movements: &[NewStockMovement]) {
        for m in movements {
            self.add(&m.ingredient_id, &m.location_id, m.quantity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, i64)> {
        self.inner
            .iter()
            .map(|((ing, loc), qty)| (ing.as_str(), loc.as_str(), *qty))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Sums signed movement rows into balances.
pub fn net_balances(movements: &[StockTransaction]) -> StockBalances {
    let mut balances = StockBalances::new();
    for m in movements {
        balances.add(&m.ingredient_id, &m.location_id, m.quantity);
    }
    balances
}

/// Balance row returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockBalance {
    pub ingredient_id: String,
    pub location_id: String,
    pub quantity: i64,
}

// =============================================================================
// Planned Movements
// =============================================================================

/// A stock row that has been planned but not written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub ingredient_id: String,
    pub location_id: String,
    pub quantity: i64,
    pub kind: StockMovementKind,
    pub notes: Option<String>,
}

/// One ingredient on a transfer / issue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferLine {
    pub ingredient_id: String,
    pub quantity: i64,
}

/// Plans a stock issue or transfer from `from` to `to`.
///
/// ## Errors
/// - same source and destination
/// - no lines, non-positive quantity, ingredient listed twice
/// - source holds less than requested
///
/// ```rust
/// use bistro_core::stock::{plan_movement, StockBalances, TransferLine};
/// use bistro_core::types::StockIssueKind;
///
/// let mut balances = StockBalances::new();
/// balances.set("rice", "store", 2_000);
/// let lines = [TransferLine { ingredient_id: "rice".into(), quantity: 500 }];
/// let rows = plan_movement(&balances, "store", "kitchen", &lines, StockIssueKind::Transfer).unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0].quantity, -500);
/// assert_eq!(rows[1].quantity, 500);
/// ```
pub fn plan_movement(
    balances: &StockBalances,
    from: &str,
    to: &str,
    lines: &[TransferLine],
    kind: StockIssueKind,
) -> CoreResult<Vec<NewStockMovement>> {
    if from == to {
        return Err(CoreError::SameLocationTransfer(from.to_string()));
    }
    if lines.is_empty() {
        return Err(ValidationError::required("lines").into());
    }

    let mut seen = HashSet::new();
    for line in lines {
        validate_stock_quantity(line.quantity)?;
        if !seen.insert(line.ingredient_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "ingredient_id".to_string(),
                value: line.ingredient_id.clone(),
            }
            .into());
        }
        let available = balances.get(&line.ingredient_id, from);
        if available < line.quantity {
            return Err(CoreError::InsufficientStock {
                ingredient: line.ingredient_id.clone(),
                location: from.to_string(),
                available,
                requested: line.quantity,
            });
        }
    }

    let (out_kind, in_kind) = kind.movement_kinds();
    let mut rows = Vec::with_capacity(lines.len() * 2);
    for line in lines {
        rows.push(NewStockMovement {
            ingredient_id: line.ingredient_id.clone(),
            location_id: from.to_string(),
            quantity: -line.quantity,
            kind: out_kind,
            notes: None,
        });
        rows.push(NewStockMovement {
            ingredient_id: line.ingredient_id.clone(),
            location_id: to.to_string(),
            quantity: line.quantity,
            kind: in_kind,
            notes: None,
        });
    }
    Ok(rows)
}

/// Outlet to outlet.
pub fn plan_transfer(
    balances: &StockBalances,
    from: &str,
    to: &str,
    lines: &[TransferLine],
) -> CoreResult<Vec<NewStockMovement>> {
    plan_movement(balances, from, to, lines, StockIssueKind::Transfer)
}

/// Store to a consuming location (kitchen, bar).
pub fn plan_issue(
    balances: &StockBalances,
    store: &str,
    destination: &str,
    lines: &[TransferLine],
) -> CoreResult<Vec<NewStockMovement>> {
    plan_movement(balances, store, destination, lines, StockIssueKind::Issue)
}

/// Rows that undo a completed issue: every row negated with its kind swapped.
pub fn plan_reversal(original: &[StockTransaction]) -> Vec<NewStockMovement> {
    original
        .iter()
        .map(|row| NewStockMovement {
            ingredient_id: row.ingredient_id.clone(),
            location_id: row.location_id.clone(),
            quantity: -row.quantity,
            kind: match row.kind {
                StockMovementKind::IssueOut => StockMovementKind::IssueIn,
                StockMovementKind::IssueIn => StockMovementKind::IssueOut,
                StockMovementKind::TransferOut => StockMovementKind::TransferIn,
                StockMovementKind::TransferIn => StockMovementKind::TransferOut,
                other => other,
            },
            notes: Some("reversal".to_string()),
        })
        .collect()
}

/// A one-sided stock change (purchase, count correction, wastage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentRequest {
    pub ingredient_id: String,
    pub location_id: String,
    pub kind: StockMovementKind,
    /// Magnitude for purchase / opening / wastage, signed for adjustment.
    pub quantity: i64,
    pub notes: Option<String>,
}

/// Plans a single-row adjustment.
///
/// Purchases and opening balances add stock, wastage removes it, and
/// `Adjustment` carries its own sign. Removals may not go below zero.
pub fn plan_adjustment(
    balances: &StockBalances,
    request: &AdjustmentRequest,
) -> CoreResult<NewStockMovement> {
    let signed = match request.kind {
        StockMovementKind::Purchase | StockMovementKind::Opening => {
            validate_stock_quantity(request.quantity)?;
            request.quantity
        }
        StockMovementKind::Wastage => {
            validate_stock_quantity(request.quantity)?;
            -request.quantity
        }
        StockMovementKind::Adjustment => {
            if request.quantity == 0 {
                return Err(ValidationError::invalid("quantity", "must not be zero").into());
            }
            validate_stock_quantity(request.quantity.abs())?;
            request.quantity
        }
        _ => {
            return Err(ValidationError::NotAllowed {
                field: "kind".to_string(),
                allowed: vec![
                    "purchase".into(),
                    "opening".into(),
                    "wastage".into(),
                    "adjustment".into(),
                ],
            }
            .into())
        }
    };

    if signed < 0 {
        let available = balances.get(&request.ingredient_id, &request.location_id);
        if available + signed < 0 {
            return Err(CoreError::InsufficientStock {
                ingredient: request.ingredient_id.clone(),
                location: request.location_id.clone(),
                available,
                requested: -signed,
            });
        }
    }

    Ok(NewStockMovement {
        ingredient_id: request.ingredient_id.clone(),
        location_id: request.location_id.clone(),
        quantity: signed,
        kind: request.kind,
        notes: request.notes.clone(),
    })
}

// =============================================================================
// Sale Consumption
// =============================================================================

/// Ingredient usage for sold items, one negative row per ingredient.
///
/// `sold` is `(product_id, quantity)`; products without recipe lines consume
/// nothing. Output is sorted by ingredient id.
pub fn plan_consumption(
    recipes: &[RecipeLine],
    sold: &[(String, i64)],
    location_id: &str,
) -> Vec<NewStockMovement> {
    let mut usage: HashMap<&str, i64> = HashMap::new();
    for (product_id, qty) in sold {
        for line in recipes.iter().filter(|r| &r.product_id == product_id) {
            *usage.entry(line.ingredient_id.as_str()).or_insert(0) += line.quantity * qty;
        }
    }

    let mut rows: Vec<NewStockMovement> = usage
        .into_iter()
        .filter(|(_, qty)| *qty > 0)
        .map(|(ingredient_id, qty)| NewStockMovement {
            ingredient_id: ingredient_id.to_string(),
            location_id: location_id.to_string(),
            quantity: -qty,
            kind: StockMovementKind::SaleConsumption,
            notes: None,
        })
        .collect();
    rows.sort_by(|a, b| a.ingredient_id.cmp(&b.ingredient_id));
    rows
}

/// Returns the first movement that would take a balance below zero.
pub fn find_shortfall(
    balances: &StockBalances,
    movements: &[NewStockMovement],
) -> Option<CoreError> {
    let mut projected = balances.clone();
    for m in movements {
        let before = projected.get(&m.ingredient_id, &m.location_id);
        projected.add(&m.ingredient_id, &m.location_id, m.quantity);
        if m.quantity < 0 && before + m.quantity < 0 {
            return Some(CoreError::InsufficientStock {
                ingredient: m.ingredient_id.clone(),
                location: m.location_id.clone(),
                available: before,
                requested: -m.quantity,
            });
        }
    }
    None
}

// =============================================================================
// Low Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockItem {
    pub ingredient_id: String,
    pub name: String,
    pub unit: Unit,
    pub on_hand: i64,
    pub reorder_level: i64,
    pub shortfall: i64,
}

/// Active ingredients at or below their reorder level.
///
/// With `location_id` the balance at that location is used, otherwise the
/// total across locations. Worst shortfall first.
pub fn low_stock(
    ingredients: &[Ingredient],
    balances: &StockBalances,
    location_id: Option<&str>,
) -> Vec<LowStockItem> {
    let mut items: Vec<LowStockItem> = ingredients
        .iter()
        .filter(|i| i.is_active)
        .filter_map(|i| {
            let on_hand = match location_id {
                Some(loc) => balances.get(&i.id, loc),
                None => balances.total_for(&i.id),
            };
            (on_hand <= i.reorder_level).then(|| LowStockItem {
                ingredient_id: i.id.clone(),
                name: i.name.clone(),
                unit: i.unit,
                on_hand,
                reorder_level: i.reorder_level,
                shortfall: i.reorder_level - on_hand,
            })
        })
        .collect();
    items.sort_by(|a, b| b.shortfall.cmp(&a.shortfall).then(a.name.cmp(&b.name)));
    items
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(ing: &str, loc: &str, qty: i64, kind: StockMovementKind) -> StockTransaction {
        StockTransaction {
            id: format!("{ing}-{loc}-{qty}"),
            ingredient_id: ing.into(),
            location_id: loc.into(),
            quantity: qty,
            kind,
            reference_id: None,
            notes: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn line(ing: &str, qty: i64) -> TransferLine {
        TransferLine {
            ingredient_id: ing.into(),
            quantity: qty,
        }
    }

    fn balances() -> StockBalances {
        net_balances(&[
            row("rice", "store", 5_000, StockMovementKind::Purchase),
            row("rice", "store", -1_000, StockMovementKind::IssueOut),
            row("rice", "kitchen", 1_000, StockMovementKind::IssueIn),
            row("oil", "store", 2_000, StockMovementKind::Opening),
        ])
    }

    #[test]
    fn test_net_balances_sum_signed_rows() {
        let b = balances();
        assert_eq!(b.get("rice", "store"), 4_000);
        assert_eq!(b.get("rice", "kitchen"), 1_000);
        assert_eq!(b.get("rice", "bar"), 0);
        assert_eq!(b.total_for("rice"), 5_000);
    }

    #[test]
    fn test_transfer_conserves_total() {
        let mut b = balances();
        let rows = plan_transfer(&b, "store", "outlet-2", &[line("rice", 1_500), line("oil", 500)])
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].kind, StockMovementKind::TransferOut);
        assert_eq!(rows[1].kind, StockMovementKind::TransferIn);

        let before = b.total_for("rice");
        b.apply(&rows);
        assert_eq!(b.total_for("rice"), before);
        assert_eq!(b.get("rice", "store"), 2_500);
        assert_eq!(b.get("rice", "outlet-2"), 1_500);
        assert_eq!(b.get("oil", "store"), 1_500);
    }

    #[test]
    fn test_issue_uses_issue_kinds() {
        let rows = plan_issue(&balances(), "store", "kitchen", &[line("oil", 100)]).unwrap();
        assert_eq!(rows[0].kind, StockMovementKind::IssueOut);
        assert_eq!(rows[1].kind, StockMovementKind::IssueIn);
    }

    #[test]
    fn test_transfer_rejections() {
        let b = balances();
        assert!(matches!(
            plan_transfer(&b, "store", "store", &[line("rice", 1)]),
            Err(CoreError::SameLocationTransfer(_))
        ));
        assert!(plan_transfer(&b, "store", "kitchen", &[]).is_err());
        assert!(plan_transfer(&b, "store", "kitchen", &[line("rice", 0)]).is_err());
        assert!(matches!(
            plan_transfer(&b, "store", "kitchen", &[line("rice", 10), line("rice", 10)]),
            Err(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
        assert!(matches!(
            plan_transfer(&b, "kitchen", "store", &[line("rice", 1_001)]),
            Err(CoreError::InsufficientStock {
                available: 1_000,
                requested: 1_001,
                ..
            })
        ));
    }

    #[test]
    fn test_reversal_restores_balances() {
        let mut b = balances();
        let rows = plan_issue(&b, "store", "kitchen", &[line("rice", 700)]).unwrap();
        b.apply(&rows);
        let written: Vec<StockTransaction> = rows
            .iter()
            .map(|r| row(&r.ingredient_id, &r.location_id, r.quantity, r.kind))
            .collect();
        let reversal = plan_reversal(&written);
        assert_eq!(reversal[0].kind, StockMovementKind::IssueIn);
        b.apply(&reversal);
        assert_eq!(b, balances());
    }

    #[test]
    fn test_adjustments() {
        let b = balances();
        let purchase = AdjustmentRequest {
            ingredient_id: "rice".into(),
            location_id: "store".into(),
            kind: StockMovementKind::Purchase,
            quantity: 10_000,
            notes: None,
        };
        assert_eq!(plan_adjustment(&b, &purchase).unwrap().quantity, 10_000);

        let waste = AdjustmentRequest {
            kind: StockMovementKind::Wastage,
            quantity: 200,
            location_id: "kitchen".into(),
            ..purchase.clone()
        };
        assert_eq!(plan_adjustment(&b, &waste).unwrap().quantity, -200);

        let too_much = AdjustmentRequest {
            kind: StockMovementKind::Adjustment,
            quantity: -1_200,
            location_id: "kitchen".into(),
            ..purchase.clone()
        };
        assert!(matches!(
            plan_adjustment(&b, &too_much),
            Err(CoreError::InsufficientStock { .. })
        ));

        let transfer = AdjustmentRequest {
            kind: StockMovementKind::TransferIn,
            ..purchase
        };
        assert!(plan_adjustment(&b, &transfer).is_err());
    }

    #[test]
    fn test_consumption_aggregates_per_ingredient() {
        let recipes = vec![
            RecipeLine {
                id: "r1".into(),
                product_id: "kottu".into(),
                ingredient_id: "roti".into(),
                quantity: 2,
            },
            RecipeLine {
                id: "r2".into(),
                product_id: "kottu".into(),
                ingredient_id: "oil".into(),
                quantity: 30,
            },
            RecipeLine {
                id: "r3".into(),
                product_id: "fried-rice".into(),
                ingredient_id: "oil".into(),
                quantity: 20,
            },
        ];
        let sold = vec![
            ("kottu".to_string(), 2),
            ("fried-rice".to_string(), 1),
            ("tea".to_string(), 3),
        ];
        let rows = plan_consumption(&recipes, &sold, "kitchen");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ingredient_id, "oil");
        assert_eq!(rows[0].quantity, -80);
        assert_eq!(rows[1].ingredient_id, "roti");
        assert_eq!(rows[1].quantity, -4);
        assert!(rows.iter().all(|r| r.kind == StockMovementKind::SaleConsumption));
    }

    #[test]
    fn test_find_shortfall() {
        let b = balances();
        let ok = vec![NewStockMovement {
            ingredient_id: "rice".into(),
            location_id: "kitchen".into(),
            quantity: -1_000,
            kind: StockMovementKind::SaleConsumption,
            notes: None,
        }];
        assert!(find_shortfall(&b, &ok).is_none());

        let mut short = ok.clone();
        short.push(NewStockMovement {
            quantity: -1,
            ..ok[0].clone()
        });
        assert!(matches!(
            find_shortfall(&b, &short),
            Some(CoreError::InsufficientStock { available: 0, .. })
        ));
    }

    #[test]
    fn test_low_stock() {
        let now = Utc::now();
        let ingredient = |id: &str, reorder: i64| Ingredient {
            id: id.into(),
            name: id.to_uppercase(),
            unit: Unit::Gram,
            reorder_level: reorder,
            unit_cost_cents: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let ingredients = vec![ingredient("rice", 6_000), ingredient("oil", 500), ingredient("salt", 0)];
        let b = balances();

        let all = low_stock(&ingredients, &b, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].ingredient_id, "rice");
        assert_eq!(all[0].shortfall, 1_000);
        assert_eq!(all[1].ingredient_id, "salt");

        let kitchen = low_stock(&ingredients, &b, Some("kitchen"));
        assert!(kitchen.iter().any(|i| i.ingredient_id == "oil"));
    }
}
