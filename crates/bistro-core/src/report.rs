//! # Reports
//!
//! Aggregations over sales, payments and expenses for a period. Callers
//! load the rows for the period; everything here is summation.
//!
//! Only `Completed` sales count toward money figures. Voided and refunded
//! sales are counted separately so the manager can see them.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{
    Expense, ExpenseCategory, OrderType, PaymentMethod, PaymentTransaction, Sale, SaleItem,
    SaleStatus,
};

/// Sri Lanka Standard Time, UTC+05:30.
pub const SRI_LANKA_OFFSET_MINUTES: i32 = 330;

// =============================================================================
// Sales Summary
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub count: i64,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTypeTotal {
    pub order_type: OrderType,
    pub count: i64,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub sale_count: i64,
    pub voided_count: i64,
    pub refunded_count: i64,
    /// Sum of subtotals before discount.
    pub gross_sales: Money,
    pub discounts: Money,
    /// `gross_sales - discounts`.
    pub net_sales: Money,
    pub service_charge: Money,
    pub vat: Money,
    /// What customers were billed.
    pub total_billed: Money,
    pub average_ticket: Money,
    pub by_payment_method: Vec<MethodTotal>,
    pub by_order_type: Vec<OrderTypeTotal>,
}

/// Summarises sales for a period.
///
/// `payments` may include rows for any sale; only captured payments of
/// completed sales are counted, net of refunds.
pub fn sales_summary(sales: &[Sale], payments: &[PaymentTransaction]) -> SalesSummary {
    let completed: Vec<&Sale> = sales
        .iter()
        .filter(|s| s.status == SaleStatus::Completed)
        .collect();
    let completed_ids: HashSet<&str> = completed.iter().map(|s| s.id.as_str()).collect();

    let sum = |f: fn(&Sale) -> i64| -> Money {
        Money::from_cents(completed.iter().map(|s| f(s)).sum())
    };

    let gross_sales = sum(|s| s.subtotal_cents);
    let discounts = sum(|s| s.discount_cents);
    let total_billed = sum(|s| s.total_cents);
    let sale_count = completed.len() as i64;

    let average_ticket = if sale_count == 0 {
        Money::zero()
    } else {
        Money::from_cents((total_billed.cents() as f64 / sale_count as f64).round() as i64)
    };

    let mut by_method: BTreeMap<&str, MethodTotal> = BTreeMap::new();
    for p in payments
        .iter()
        .filter(|p| p.status.is_captured() && completed_ids.contains(p.sale_id.as_str()))
    {
        let entry = by_method.entry(p.method.as_str()).or_insert(MethodTotal {
            method: p.method,
            count: 0,
            amount: Money::zero(),
        });
        entry.count += 1;
        entry.amount += p.refundable();
    }

    let mut by_type: BTreeMap<&str, OrderTypeTotal> = BTreeMap::new();
    for s in &completed {
        let entry = by_type.entry(s.order_type.as_str()).or_insert(OrderTypeTotal {
            order_type: s.order_type,
            count: 0,
            amount: Money::zero(),
        });
        entry.count += 1;
        entry.amount += s.total();
    }

    SalesSummary {
        sale_count,
        voided_count: sales.iter().filter(|s| s.status == SaleStatus::Voided).count() as i64,
        refunded_count: sales
            .iter()
            .filter(|s| s.status == SaleStatus::Refunded)
            .count() as i64,
        gross_sales,
        discounts,
        net_sales: gross_sales - discounts,
        service_charge: sum(|s| s.service_charge_cents),
        vat: sum(|s| s.vat_cents),
        total_billed,
        average_ticket,
        by_payment_method: by_method.into_values().collect(),
        by_order_type: by_type.into_values().collect(),
    }
}

// =============================================================================
// Items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TopItemsBy {
    #[default]
    Quantity,
    Revenue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TopItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: Money,
}

/// Best sellers among `items`, which should belong to completed sales.
pub fn top_items(items: &[SaleItem], by: TopItemsBy, limit: usize) -> Vec<TopItem> {
    let mut totals: HashMap<&str, TopItem> = HashMap::new();
    for item in items {
        let entry = totals
            .entry(item.product_id.as_str())
            .or_insert_with(|| TopItem {
                product_id: item.product_id.clone(),
                name: item.name_snapshot.clone(),
                quantity: 0,
                revenue: Money::zero(),
            });
        entry.quantity += item.quantity;
        entry.revenue += item.line_total();
    }

    let mut ranked: Vec<TopItem> = totals.into_values().collect();
    ranked.sort_by(|a, b| {
        let primary = match by {
            TopItemsBy::Quantity => b.quantity.cmp(&a.quantity).then(b.revenue.cmp(&a.revenue)),
            TopItemsBy::Revenue => b.revenue.cmp(&a.revenue).then(b.quantity.cmp(&a.quantity)),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HourBucket {
    pub hour: u32,
    pub sale_count: i64,
    pub revenue: Money,
}

/// Completed sales per local hour of day (24 buckets, always present).
pub fn hourly_histogram(sales: &[Sale], offset_minutes: i32) -> Vec<HourBucket> {
    let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix());

    let mut buckets: Vec<HourBucket> = (0..24)
        .map(|hour| HourBucket {
            hour,
            sale_count: 0,
            revenue: Money::zero(),
        })
        .collect();

    for sale in sales.iter().filter(|s| s.status == SaleStatus::Completed) {
        let hour = local_hour(sale.created_at, offset) as usize;
        buckets[hour].sale_count += 1;
        buckets[hour].revenue += sale.total();
    }
    buckets
}

fn local_hour(at: DateTime<Utc>, offset: FixedOffset) -> u32 {
    at.with_timezone(&offset).hour()
}

// =============================================================================
// Expenses & Profit
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub count: i64,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpenseSummary {
    pub total: Money,
    pub count: i64,
    pub by_category: Vec<CategoryTotal>,
}

pub fn expense_summary(expenses: &[Expense]) -> ExpenseSummary {
    let mut by_category: BTreeMap<ExpenseCategory, CategoryTotal> = BTreeMap::new();
    for e in expenses {
        let entry = by_category.entry(e.category).or_insert(CategoryTotal {
            category: e.category,
            count: 0,
            amount: Money::zero(),
        });
        entry.count += 1;
        entry.amount += Money::from_cents(e.amount_cents);
    }

    ExpenseSummary {
        total: expenses.iter().map(|e| Money::from_cents(e.amount_cents)).sum(),
        count: expenses.len() as i64,
        by_category: by_category.into_values().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfitAndLoss {
    /// Billed totals less VAT (VAT is owed to the government).
    pub revenue: Money,
    pub cost_of_goods: Money,
    pub gross_profit: Money,
    pub expenses: Money,
    pub net_profit: Money,
    /// Gross profit over revenue, in basis points.
    pub gross_margin_bps: i64,
}

/// Profit & loss for a period.
///
/// Cost of goods comes from the cost snapshot on each sale item, so later
/// price edits do not rewrite history. `items` may include lines of any
/// sale; only lines of completed sales are costed.
pub fn profit_and_loss(sales: &[Sale], items: &[SaleItem], expenses: &[Expense]) -> ProfitAndLoss {
    let completed: HashSet<&str> = sales
        .iter()
        .filter(|s| s.status == SaleStatus::Completed)
        .map(|s| s.id.as_str())
        .collect();

    let revenue: Money = sales
        .iter()
        .filter(|s| completed.contains(s.id.as_str()))
        .map(|s| Money::from_cents(s.total_cents - s.vat_cents))
        .sum();
    let cost_of_goods: Money = items
        .iter()
        .filter(|i| completed.contains(i.sale_id.as_str()))
        .map(|i| i.line_cost())
        .sum();
    let expenses: Money = expenses.iter().map(|e| Money::from_cents(e.amount_cents)).sum();
    let gross_profit = revenue - cost_of_goods;

    let gross_margin_bps = if revenue.is_zero() {
        0
    } else {
        ((gross_profit.cents() as i128 * 10_000) / revenue.cents() as i128) as i64
    };

    ProfitAndLoss {
        revenue,
        cost_of_goods,
        gross_profit,
        expenses,
        net_profit: gross_profit - expenses,
        gross_margin_bps,
    }
}

// =============================================================================
// VAT Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatRateTotal {
    pub rate_bps: i64,
    pub sale_count: i64,
    /// Billed totals less VAT at this rate.
    pub net_amount: Money,
    pub vat: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VatReport {
    pub sale_count: i64,
    pub net_amount: Money,
    pub service_charge: Money,
    pub vat_collected: Money,
    pub by_rate: Vec<VatRateTotal>,
}

/// VAT collected over completed sales, grouped by the rate frozen on each sale.
pub fn vat_report(sales: &[Sale]) -> VatReport {
    let completed: Vec<&Sale> = sales
        .iter()
        .filter(|s| s.status == SaleStatus::Completed)
        .collect();

    let mut by_rate: BTreeMap<i64, VatRateTotal> = BTreeMap::new();
    for s in &completed {
        let entry = by_rate.entry(s.vat_rate_bps).or_insert(VatRateTotal {
            rate_bps: s.vat_rate_bps,
            sale_count: 0,
            net_amount: Money::zero(),
            vat: Money::zero(),
        });
        entry.sale_count += 1;
        entry.net_amount += Money::from_cents(s.total_cents - s.vat_cents);
        entry.vat += Money::from_cents(s.vat_cents);
    }

    VatReport {
        sale_count: completed.len() as i64,
        net_amount: completed
            .iter()
            .map(|s| Money::from_cents(s.total_cents - s.vat_cents))
            .sum(),
        service_charge: completed
            .iter()
            .map(|s| Money::from_cents(s.service_charge_cents))
            .sum(),
        vat_collected: completed.iter().map(|s| Money::from_cents(s.vat_cents)).sum(),
        by_rate: by_rate.into_values().collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use chrono::NaiveDate;

    fn at(hour_utc: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2026-03-01T{hour_utc:02}:15:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sale(id: &str, status: SaleStatus, total: i64, vat: i64, order_type: OrderType) -> Sale {
        Sale {
            id: id.into(),
            receipt_number: format!("R-{id}"),
            order_type,
            table_number: None,
            customer_name: None,
            status,
            subtotal_cents: total - vat,
            discount_cents: 0,
            service_charge_cents: 0,
            vat_cents: vat,
            total_cents: total,
            vat_rate_bps: if vat > 0 { 1800 } else { 0 },
            vat_inclusive: false,
            cashier: "Nimal".into(),
            device_id: None,
            notes: None,
            created_at: at(6),
            updated_at: at(6),
            completed_at: None,
        }
    }

    fn payment(sale_id: &str, method: PaymentMethod, amount: i64, refunded: i64) -> PaymentTransaction {
        PaymentTransaction {
            id: format!("t-{sale_id}-{}", method.as_str()),
            sale_id: sale_id.into(),
            method,
            provider: None,
            amount_cents: amount,
            tendered_cents: None,
            change_cents: None,
            refunded_cents: refunded,
            status: if refunded > 0 {
                PaymentStatus::PartiallyRefunded
            } else {
                PaymentStatus::Completed
            },
            gateway_reference: None,
            session_id: None,
            failure_reason: None,
            created_at: at(6),
            updated_at: at(6),
        }
    }

    fn item(sale_id: &str, product: &str, qty: i64, unit: i64, cost: i64) -> SaleItem {
        SaleItem {
            id: format!("{sale_id}-{product}"),
            sale_id: sale_id.into(),
            product_id: product.into(),
            sku_snapshot: product.to_uppercase(),
            name_snapshot: product.into(),
            unit_price_cents: unit,
            unit_cost_cents: cost,
            quantity: qty,
            line_total_cents: unit * qty,
            vat_applicable: true,
            notes: None,
            created_at: at(6),
        }
    }

    fn expense(category: ExpenseCategory, amount: i64) -> Expense {
        Expense {
            id: format!("e-{}-{amount}", category.as_str()),
            category,
            description: "test".into(),
            amount_cents: amount,
            vendor: None,
            paid_via: None,
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            reference: None,
            created_by: "owner".into(),
            created_at: at(6),
            updated_at: at(6),
        }
    }

    #[test]
    fn test_sales_summary() {
        let sales = vec![
            sale("a", SaleStatus::Completed, 118_000, 18_000, OrderType::DineIn),
            sale("b", SaleStatus::Completed, 59_000, 9_000, OrderType::Takeaway),
            sale("c", SaleStatus::Voided, 10_000, 0, OrderType::DineIn),
            sale("d", SaleStatus::Refunded, 20_000, 0, OrderType::DineIn),
        ];
        let payments = vec![
            payment("a", PaymentMethod::Card, 118_000, 0),
            payment("b", PaymentMethod::Cash, 59_000, 9_000),
            payment("c", PaymentMethod::Cash, 10_000, 0),
        ];
        let s = sales_summary(&sales, &payments);
        assert_eq!(s.sale_count, 2);
        assert_eq!(s.voided_count, 1);
        assert_eq!(s.refunded_count, 1);
        assert_eq!(s.total_billed.cents(), 177_000);
        assert_eq!(s.vat.cents(), 27_000);
        assert_eq!(s.average_ticket.cents(), 88_500);
        assert_eq!(s.by_payment_method.len(), 2);
        let cash = s
            .by_payment_method
            .iter()
            .find(|m| m.method == PaymentMethod::Cash)
            .unwrap();
        assert_eq!(cash.amount.cents(), 50_000);
        assert_eq!(s.by_order_type.len(), 2);
    }

    #[test]
    fn test_empty_summary() {
        let s = sales_summary(&[], &[]);
        assert_eq!(s.sale_count, 0);
        assert!(s.average_ticket.is_zero());
    }

    #[test]
    fn test_top_items() {
        let items = vec![
            item("a", "kottu", 2, 120_000, 40_000),
            item("b", "kottu", 1, 120_000, 40_000),
            item("a", "tea", 5, 8_000, 1_000),
            item("b", "lamprais", 1, 250_000, 90_000),
        ];
        let by_qty = top_items(&items, TopItemsBy::Quantity, 10);
        assert_eq!(by_qty[0].product_id, "tea");
        assert_eq!(by_qty[1].product_id, "kottu");
        assert_eq!(by_qty[1].quantity, 3);

        let by_revenue = top_items(&items, TopItemsBy::Revenue, 1);
        assert_eq!(by_revenue.len(), 1);
        assert_eq!(by_revenue[0].product_id, "kottu");
        assert_eq!(by_revenue[0].revenue.cents(), 360_000);
    }

    #[test]
    fn test_hourly_histogram_uses_local_time() {
        // 06:15 UTC is 11:45 in Colombo
        let sales = vec![sale("a", SaleStatus::Completed, 10_000, 0, OrderType::DineIn)];
        let buckets = hourly_histogram(&sales, SRI_LANKA_OFFSET_MINUTES);
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[11].sale_count, 1);
        assert_eq!(buckets[6].sale_count, 0);

        let utc = hourly_histogram(&sales, 0);
        assert_eq!(utc[6].sale_count, 1);
    }

    #[test]
    fn test_expense_summary() {
        let expenses = vec![
            expense(ExpenseCategory::Rent, 15_000_000),
            expense(ExpenseCategory::Utilities, 2_500_000),
            expense(ExpenseCategory::Utilities, 500_000),
        ];
        let s = expense_summary(&expenses);
        assert_eq!(s.total.cents(), 18_000_000);
        assert_eq!(s.count, 3);
        let utilities = s
            .by_category
            .iter()
            .find(|c| c.category == ExpenseCategory::Utilities)
            .unwrap();
        assert_eq!(utilities.count, 2);
        assert_eq!(utilities.amount.cents(), 3_000_000);
    }

    #[test]
    fn test_profit_and_loss() {
        let sales = vec![
            sale("a", SaleStatus::Completed, 118_000, 18_000, OrderType::DineIn),
            sale("v", SaleStatus::Voided, 50_000, 0, OrderType::DineIn),
        ];
        let items = vec![
            item("a", "kottu", 2, 50_000, 20_000),
            item("v", "kottu", 1, 50_000, 20_000),
        ];
        let expenses = vec![expense(ExpenseCategory::Ingredients, 10_000)];
        let pl = profit_and_loss(&sales, &items, &expenses);
        assert_eq!(pl.revenue.cents(), 100_000);
        assert_eq!(pl.cost_of_goods.cents(), 40_000);
        assert_eq!(pl.gross_profit.cents(), 60_000);
        assert_eq!(pl.net_profit.cents(), 50_000);
        assert_eq!(pl.gross_margin_bps, 6_000);
    }

    #[test]
    fn test_vat_report_groups_by_rate() {
        let sales = vec![
            sale("a", SaleStatus::Completed, 118_000, 18_000, OrderType::DineIn),
            sale("b", SaleStatus::Completed, 30_000, 0, OrderType::Takeaway),
            sale("c", SaleStatus::Voided, 59_000, 9_000, OrderType::DineIn),
        ];
        let r = vat_report(&sales);
        assert_eq!(r.sale_count, 2);
        assert_eq!(r.vat_collected.cents(), 18_000);
        assert_eq!(r.net_amount.cents(), 130_000);
        assert_eq!(r.by_rate.len(), 2);
        assert_eq!(r.by_rate[0].rate_bps, 0);
        assert_eq!(r.by_rate[1].rate_bps, 1800);
    }
}
