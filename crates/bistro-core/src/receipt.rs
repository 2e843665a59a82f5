//! # Receipt Rendering
//!
//! Builds a [`ReceiptDocument`] from a sale and renders it as thermal-printer
//! text or HTML in the customer's language.
//!
//! ## Text Layout (42 columns)
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             LAKESIDE BISTRO              │
//! │           12 Lake Rd, Kandy              │
//! │            Tel: 081 222 3344             │
//! │        VAT Reg. No: 123456789-7000       │
//! │------------------------------------------│
//! │Receipt No: R-20260101-0001               │
//! │Date: 2026-01-01 12:30                    │
//! │------------------------------------------│
//! │Item                        Qty     Amount│
//! │Chicken Kottu                 2   2,400.00│
//! │  @ 1,200.00                              │
//! │------------------------------------------│
//! │Subtotal                      Rs. 2,400.00│
//! │==========================================│
//! │Total                         Rs. 2,832.00│
//! └──────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::i18n::{
    display_width, order_type_name, payment_method_name, status_banner, translate, Language,
    ReceiptLabel,
};
use crate::money::Money;
use crate::types::{OrderType, PaymentMethod, PaymentTransaction, Sale, SaleItem, SaleStatus};

/// Default thermal printer width (80mm paper).
pub const DEFAULT_RECEIPT_WIDTH: usize = 42;

/// Narrowest layout still readable (58mm paper is 32).
pub const MIN_RECEIPT_WIDTH: usize = 32;

/// Widest layout accepted (132-column line printers).
pub const MAX_RECEIPT_WIDTH: usize = 132;

const QTY_COLUMN: usize = 5;
const AMOUNT_COLUMN: usize = 12;

// =============================================================================
// Document
// =============================================================================

/// Store header printed on every receipt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub vat_registration: Option<String>,
    /// Extra footer line under the thank-you message.
    pub footer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptPayment {
    pub method: PaymentMethod,
    /// Translated method name, with provider for wallets.
    pub label: String,
    pub amount: Money,
    pub change: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub service_charge: Money,
    pub vat: Money,
    pub vat_rate_bps: i64,
    pub vat_inclusive: bool,
    pub total: Money,
    pub paid: Money,
    pub change: Money,
    pub balance_due: Money,
}

/// Everything needed to print one receipt, already translated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptDocument {
    pub language: Language,
    pub store: StoreInfo,
    pub receipt_number: String,
    pub issued_at: DateTime<Utc>,
    pub cashier: String,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub status: SaleStatus,
    pub lines: Vec<ReceiptLine>,
    pub payments: Vec<ReceiptPayment>,
    pub totals: ReceiptTotals,
}

impl ReceiptDocument {
    /// Assembles a receipt. Only captured payments are printed.
    pub fn build(
        store: StoreInfo,
        sale: &Sale,
        items: &[SaleItem],
        payments: &[PaymentTransaction],
        language: Language,
    ) -> Self {
        let lines = items
            .iter()
            .map(|item| ReceiptLine {
                name: item.name_snapshot.clone(),
                quantity: item.quantity,
                unit_price: Money::from_cents(item.unit_price_cents),
                line_total: item.line_total(),
            })
            .collect();

        let captured: Vec<&PaymentTransaction> =
            payments.iter().filter(|p| p.status.is_captured()).collect();

        let receipt_payments: Vec<ReceiptPayment> = captured
            .iter()
            .map(|p| {
                let name = payment_method_name(p.method, language);
                let label = match (&p.method, &p.provider) {
                    (PaymentMethod::MobileWallet, Some(provider)) => {
                        format!("{name} ({provider})")
                    }
                    _ => name.to_string(),
                };
                ReceiptPayment {
                    method: p.method,
                    label,
                    amount: Money::from_cents(p.amount_cents + p.change_cents.unwrap_or(0)),
                    change: Money::from_cents(p.change_cents.unwrap_or(0)),
                }
            })
            .collect();

        let paid: Money = captured.iter().map(|p| p.refundable()).sum();
        let change: Money = receipt_payments.iter().map(|p| p.change).sum();
        let total = sale.total();
        let balance_due = if paid >= total {
            Money::zero()
        } else {
            total - paid
        };

        ReceiptDocument {
            language,
            store,
            receipt_number: sale.receipt_number.clone(),
            issued_at: sale.completed_at.unwrap_or(sale.created_at),
            cashier: sale.cashier.clone(),
            order_type: sale.order_type,
            table_number: sale.table_number.clone(),
            customer_name: sale.customer_name.clone(),
            status: sale.status,
            lines,
            payments: receipt_payments,
            totals: ReceiptTotals {
                subtotal: Money::from_cents(sale.subtotal_cents),
                discount: Money::from_cents(sale.discount_cents),
                service_charge: Money::from_cents(sale.service_charge_cents),
                vat: Money::from_cents(sale.vat_cents),
                vat_rate_bps: sale.vat_rate_bps,
                vat_inclusive: sale.vat_inclusive,
                total,
                paid,
                change,
                balance_due,
            },
        }
    }

    fn label(&self, label: ReceiptLabel) -> &'static str {
        translate(label, self.language)
    }

    fn vat_label(&self) -> String {
        let rate = self.totals.vat_rate_bps as f64 / 100.0;
        let mut label = format!("{} {}%", self.label(ReceiptLabel::Vat), trim_rate(rate));
        if self.totals.vat_inclusive {
            label.push_str(" (incl.)");
        }
        label
    }
}

fn trim_rate(rate: f64) -> String {
    let s = format!("{rate:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

// =============================================================================
// Text Rendering
// =============================================================================

/// Renders a fixed-width text receipt.
///
/// `width` is clamped to [`MIN_RECEIPT_WIDTH`]..=[`MAX_RECEIPT_WIDTH`].
pub fn render_text(doc: &ReceiptDocument, width: usize) -> String {
    let width = width.clamp(MIN_RECEIPT_WIDTH, MAX_RECEIPT_WIDTH);
    let mut out = String::new();
    let rule = "-".repeat(width);

    push_line(&mut out, &center(&doc.store.name.to_uppercase(), width));
    if let Some(address) = &doc.store.address {
        push_line(&mut out, &center(address, width));
    }
    if let Some(phone) = &doc.store.phone {
        let tel = format!("{}: {}", doc.label(ReceiptLabel::Tel), phone);
        push_line(&mut out, &center(&tel, width));
    }
    if let Some(reg) = &doc.store.vat_registration {
        let reg = format!("{}: {}", doc.label(ReceiptLabel::VatRegNo), reg);
        push_line(&mut out, &center(&reg, width));
    }
    if let Some(banner) = status_banner(doc.status, doc.language) {
        push_line(&mut out, &center(&format!("*** {banner} ***"), width));
    }
    push_line(&mut out, &rule);

    let mut meta = vec![
        (ReceiptLabel::ReceiptNumber, doc.receipt_number.clone()),
        (
            ReceiptLabel::Date,
            doc.issued_at.format("%Y-%m-%d %H:%M").to_string(),
        ),
        (ReceiptLabel::Cashier, doc.cashier.clone()),
        (
            ReceiptLabel::OrderType,
            order_type_name(doc.order_type, doc.language).to_string(),
        ),
    ];
    if let Some(table) = &doc.table_number {
        meta.push((ReceiptLabel::Table, table.clone()));
    }
    if let Some(customer) = &doc.customer_name {
        meta.push((ReceiptLabel::Customer, customer.clone()));
    }
    for (label, value) in meta {
        push_line(&mut out, &format!("{}: {}", doc.label(label), value));
    }
    push_line(&mut out, &rule);

    let name_width = width - QTY_COLUMN - AMOUNT_COLUMN;
    push_line(
        &mut out,
        &format!(
            "{}{}{}",
            pad_right(doc.label(ReceiptLabel::Item), name_width),
            pad_left(doc.label(ReceiptLabel::Qty), QTY_COLUMN),
            pad_left(doc.label(ReceiptLabel::Amount), AMOUNT_COLUMN),
        ),
    );

    for line in &doc.lines {
        let wrapped = wrap(&line.name, name_width - 1);
        for (i, part) in wrapped.iter().enumerate() {
            if i == 0 {
                push_line(
                    &mut out,
                    &format!(
                        "{}{}{}",
                        pad_right(part, name_width),
                        pad_left(&line.quantity.to_string(), QTY_COLUMN),
                        pad_left(&line.line_total.format_amount(), AMOUNT_COLUMN),
                    ),
                );
            } else {
                push_line(&mut out, part);
            }
        }
        if line.quantity > 1 {
            push_line(&mut out, &format!("  @ {}", line.unit_price.format_amount()));
        }
    }
    push_line(&mut out, &rule);

    let totals = &doc.totals;
    push_line(
        &mut out,
        &two_columns(doc.label(ReceiptLabel::Subtotal), &totals.subtotal.to_string(), width),
    );
    if !totals.discount.is_zero() {
        push_line(
            &mut out,
            &two_columns(
                doc.label(ReceiptLabel::Discount),
                &(-totals.discount).to_string(),
                width,
            ),
        );
    }
    if !totals.service_charge.is_zero() {
        push_line(
            &mut out,
            &two_columns(
                doc.label(ReceiptLabel::ServiceCharge),
                &totals.service_charge.to_string(),
                width,
            ),
        );
    }
    if totals.vat_rate_bps > 0 {
        push_line(
            &mut out,
            &two_columns(&doc.vat_label(), &totals.vat.to_string(), width),
        );
    }
    push_line(&mut out, &"=".repeat(width));
    push_line(
        &mut out,
        &two_columns(doc.label(ReceiptLabel::Total), &totals.total.to_string(), width),
    );

    for payment in &doc.payments {
        push_line(
            &mut out,
            &two_columns(&payment.label, &payment.amount.to_string(), width),
        );
    }
    if !totals.change.is_zero() {
        push_line(
            &mut out,
            &two_columns(doc.label(ReceiptLabel::Change), &totals.change.to_string(), width),
        );
    }
    if !totals.balance_due.is_zero() {
        push_line(
            &mut out,
            &two_columns(
                doc.label(ReceiptLabel::BalanceDue),
                &totals.balance_due.to_string(),
                width,
            ),
        );
    }

    push_line(&mut out, &rule);
    push_line(&mut out, &center(doc.label(ReceiptLabel::ThankYou), width));
    if let Some(footer) = &doc.store.footer {
        push_line(&mut out, &center(footer, width));
    }

    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn pad_right(s: &str, width: usize) -> String {
    let w = display_width(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", s, " ".repeat(width - w))
}

fn pad_left(s: &str, width: usize) -> String {
    let w = display_width(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

fn center(s: &str, width: usize) -> String {
    let w = display_width(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat((width - w) / 2), s)
}

/// Label on the left, amount flush right. Falls back to two lines if they
/// do not fit.
fn two_columns(left: &str, right: &str, width: usize) -> String {
    let used = display_width(left) + display_width(right);
    if used < width {
        format!("{}{}{}", left, " ".repeat(width - used), right)
    } else {
        format!("{}\n{}", left, pad_left(right, width))
    }
}

/// Greedy word wrap by display width. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while display_width(&word) > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            let rest = word.split_off(split_at);
            lines.push(word);
            word = rest;
        }
        if current.is_empty() {
            current = word;
        } else if display_width(&current) + 1 + display_width(&word) <= width {
            current.push(' ');
            current.push_str(&word);
        } else {
            lines.push(std::mem::replace(&mut current, word));
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

// =============================================================================
// HTML Rendering
// =============================================================================

/// Renders a standalone HTML receipt (for e-mail / browser print).
pub fn render_html(doc: &ReceiptDocument) -> String {
    let mut html = String::new();
    let lang = doc.language.code();

    // Writing to a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{} {}</title>\n<style>body{{font-family:monospace;max-width:420px;margin:auto}}\
         table{{width:100%;border-collapse:collapse}}td.num{{text-align:right}}\
         .total td{{font-weight:bold;border-top:2px solid #000}}</style>\n</head>\n<body>\n",
        escape(doc.label(ReceiptLabel::Receipt)),
        escape(&doc.receipt_number),
    );

    let _ = writeln!(html, "<header>\n<h1>{}</h1>", escape(&doc.store.name));
    if let Some(address) = &doc.store.address {
        let _ = writeln!(html, "<p>{}</p>", escape(address));
    }
    if let Some(phone) = &doc.store.phone {
        let _ = writeln!(html, "<p>{}: {}</p>", escape(doc.label(ReceiptLabel::Tel)), escape(phone));
    }
    if let Some(reg) = &doc.store.vat_registration {
        let _ = writeln!(
            html,
            "<p>{}: {}</p>",
            escape(doc.label(ReceiptLabel::VatRegNo)),
            escape(reg)
        );
    }
    if let Some(banner) = status_banner(doc.status, doc.language) {
        let _ = writeln!(html, "<p class=\"banner\"><strong>{}</strong></p>", escape(banner));
    }
    html.push_str("</header>\n<dl>\n");

    let mut meta = vec![
        (doc.label(ReceiptLabel::ReceiptNumber), doc.receipt_number.clone()),
        (
            doc.label(ReceiptLabel::Date),
            doc.issued_at.format("%Y-%m-%d %H:%M").to_string(),
        ),
        (doc.label(ReceiptLabel::Cashier), doc.cashier.clone()),
        (
            doc.label(ReceiptLabel::OrderType),
            order_type_name(doc.order_type, doc.language).to_string(),
        ),
    ];
    if let Some(table) = &doc.table_number {
        meta.push((doc.label(ReceiptLabel::Table), table.clone()));
    }
    if let Some(customer) = &doc.customer_name {
        meta.push((doc.label(ReceiptLabel::Customer), customer.clone()));
    }
    for (label, value) in meta {
        let _ = writeln!(html, "<dt>{}</dt><dd>{}</dd>", escape(label), escape(&value));
    }
    html.push_str("</dl>\n<table>\n");

    let _ = writeln!(
        html,
        "<tr><th>{}</th><th>{}</th><th>{}</th></tr>",
        escape(doc.label(ReceiptLabel::Item)),
        escape(doc.label(ReceiptLabel::Qty)),
        escape(doc.label(ReceiptLabel::Amount)),
    );
    for line in &doc.lines {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            escape(&line.name),
            line.quantity,
            line.line_total.format_amount(),
        );
    }

    let totals = &doc.totals;
    let mut rows: Vec<(String, Money, &str)> =
        vec![(doc.label(ReceiptLabel::Subtotal).to_string(), totals.subtotal, "")];
    if !totals.discount.is_zero() {
        rows.push((doc.label(ReceiptLabel::Discount).to_string(), -totals.discount, ""));
    }
    if !totals.service_charge.is_zero() {
        rows.push((
            doc.label(ReceiptLabel::ServiceCharge).to_string(),
            totals.service_charge,
            "",
        ));
    }
    if totals.vat_rate_bps > 0 {
        rows.push((doc.vat_label(), totals.vat, ""));
    }
    rows.push((doc.label(ReceiptLabel::Total).to_string(), totals.total, " class=\"total\""));
    for payment in &doc.payments {
        rows.push((payment.label.clone(), payment.amount, ""));
    }
    if !totals.change.is_zero() {
        rows.push((doc.label(ReceiptLabel::Change).to_string(), totals.change, ""));
    }
    if !totals.balance_due.is_zero() {
        rows.push((doc.label(ReceiptLabel::BalanceDue).to_string(), totals.balance_due, ""));
    }
    for (label, amount, class) in rows {
        let _ = writeln!(
            html,
            "<tr{class}><td colspan=\"2\">{}</td><td class=\"num\">{}</td></tr>",
            escape(&label),
            escape(&amount.to_string()),
        );
    }

    let _ = writeln!(
        html,
        "</table>\n<footer>\n<p>{}</p>",
        escape(doc.label(ReceiptLabel::ThankYou))
    );
    if let Some(footer) = &doc.store.footer {
        let _ = writeln!(html, "<p>{}</p>", escape(footer));
    }
    html.push_str("</footer>\n</body>\n</html>\n");
    html
}

/// Escapes text for HTML element and attribute content.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;

    fn sample_sale() -> (Sale, Vec<SaleItem>, Vec<PaymentTransaction>) {
        let now = Utc::now();
        let sale = Sale {
            id: "s1".into(),
            receipt_number: "R-20260101-0001".into(),
            order_type: OrderType::DineIn,
            table_number: Some("5".into()),
            customer_name: None,
            status: SaleStatus::Completed,
            subtotal_cents: 240_000,
            discount_cents: 0,
            service_charge_cents: 24_000,
            vat_cents: 47_520,
            total_cents: 311_520,
            vat_rate_bps: 1800,
            vat_inclusive: false,
            cashier: "Nimal".into(),
            device_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };
        let items = vec![SaleItem {
            id: "i1".into(),
            sale_id: "s1".into(),
            product_id: "p1".into(),
            sku_snapshot: "KOTTU-CHK".into(),
            name_snapshot: "Chicken Kottu <Large>".into(),
            unit_price_cents: 120_000,
            unit_cost_cents: 45_000,
            quantity: 2,
            line_total_cents: 240_000,
            vat_applicable: true,
            notes: None,
            created_at: now,
        }];
        let payments = vec![PaymentTransaction {
            id: "t1".into(),
            sale_id: "s1".into(),
            method: PaymentMethod::Cash,
            provider: None,
            amount_cents: 311_520,
            tendered_cents: Some(320_000),
            change_cents: Some(8_480),
            refunded_cents: 0,
            status: PaymentStatus::Completed,
            gateway_reference: None,
            session_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }];
        (sale, items, payments)
    }

    fn store() -> StoreInfo {
        StoreInfo {
            name: "Lakeside Bistro".into(),
            address: Some("12 Lake Rd, Kandy".into()),
            phone: Some("081 222 3344".into()),
            vat_registration: Some("123456789-7000".into()),
            footer: None,
        }
    }

    #[test]
    fn test_build_document_totals() {
        let (sale, items, payments) = sample_sale();
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::En);
        assert_eq!(doc.totals.paid.cents(), 311_520);
        assert_eq!(doc.totals.change.cents(), 8_480);
        assert!(doc.totals.balance_due.is_zero());
        assert_eq!(doc.payments[0].amount.cents(), 320_000);
    }

    #[test]
    fn test_render_text_english() {
        let (sale, items, payments) = sample_sale();
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::En);
        let text = render_text(&doc, DEFAULT_RECEIPT_WIDTH);

        assert!(text.contains("LAKESIDE BISTRO"));
        assert!(text.contains("Receipt No: R-20260101-0001"));
        assert!(text.contains("VAT 18%"));
        assert!(text.contains("Rs. 3,115.20"));
        assert!(text.contains("Change"));
        assert!(text.contains("@ 1,200.00"));
        for line in text.lines() {
            assert!(display_width(line) <= DEFAULT_RECEIPT_WIDTH, "too wide: {line}");
        }
    }

    #[test]
    fn test_render_text_sinhala_labels() {
        let (sale, items, payments) = sample_sale();
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::Si);
        let text = render_text(&doc, DEFAULT_RECEIPT_WIDTH);
        assert!(text.contains("මුළු එකතුව"));
        assert!(text.contains("සේවා ගාස්තුව"));
        assert!(!text.contains("Subtotal"));
    }

    #[test]
    fn test_render_html_escapes_and_sets_lang() {
        let (sale, items, payments) = sample_sale();
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::Ta);
        let html = render_html(&doc);
        assert!(html.contains("<html lang=\"ta\">"));
        assert!(html.contains("Chicken Kottu &lt;Large&gt;"));
        assert!(!html.contains("<Large>"));
        assert!(html.contains("மொத்தம்"));
    }

    #[test]
    fn test_voided_banner() {
        let (mut sale, items, payments) = sample_sale();
        sale.status = SaleStatus::Voided;
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::En);
        assert!(render_text(&doc, 42).contains("*** VOID ***"));
    }

    #[test]
    fn test_render_text_width_is_clamped() {
        let (sale, items, payments) = sample_sale();
        let doc = ReceiptDocument::build(store(), &sale, &items, &payments, Language::En);
        let text = render_text(&doc, usize::MAX);
        assert!(text.lines().all(|line| display_width(line) <= MAX_RECEIPT_WIDTH));
        assert!(text.lines().any(|line| display_width(line) == MAX_RECEIPT_WIDTH));
    }

    #[test]
    fn test_wrap_long_names() {
        let parts = wrap("Seafood Fried Rice with Devilled Prawns", 16);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| display_width(p) <= 16));
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a & b <c> \"d\""), "a &amp; b &lt;c&gt; &quot;d&quot;");
    }
}
