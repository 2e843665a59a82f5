//! # Domain Types
//!
//! Entities shared by every layer of Bistro POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  MENU            INVENTORY            SALES             MONEY IN/OUT    │
//! │  ────            ─────────            ─────             ────────────    │
//! │  Category        Ingredient           Sale              PaymentTxn      │
//! │  Product ──────► RecipeLine           SaleItem          CardSession     │
//! │                  Location                               WalletSession   │
//! │                  StockTransaction                       Expense         │
//! │                  StockIssue(+Line)                      VatSettings     │
//! │                                                                         │
//! │  OFFLINE SYNC: SyncConflict (kind, severity, strategy, status)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID `id` used for relations, and entities people talk
//! about (products, sales, issues) also carry a human-readable business key
//! (`sku`, `receipt_number`, `issue_number`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1800 bps = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

/// Tax calculation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Menu prices exclude VAT; VAT is added on the bill.
    #[default]
    Exclusive,
    /// Menu prices already include VAT.
    Inclusive,
}

// =============================================================================
// Menu
// =============================================================================

/// A menu category ("Rice & Curry", "Beverages").
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A menu item available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    pub description: Option<String>,

    pub category_id: Option<String>,

    /// Price in cents (VAT-exclusive or inclusive per active VAT mode).
    pub price_cents: i64,

    /// Food cost in cents, used for profit reports.
    pub cost_cents: Option<i64>,

    /// Zero-rated / exempt items set this to false.
    pub vat_applicable: bool,

    /// Kitchen toggle: temporarily "86'd" items are unavailable.
    pub is_available: bool,

    /// Deduct recipe ingredients from stock when sold.
    pub track_inventory: bool,

    /// Soft delete flag.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Incremented on every update; used by offline conflict detection.
    pub sync_version: i64,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents.unwrap_or(0))
    }

    /// Checks if the item can be put on an order right now.
    pub fn is_sellable(&self) -> bool {
        self.is_active && self.is_available
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Base unit an ingredient is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Gram,
    Millilitre,
    Piece,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Gram => "gram",
            Unit::Millilitre => "millilitre",
            Unit::Piece => "piece",
        }
    }

    /// Short symbol for reports and receipts.
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Millilitre => "ml",
            Unit::Piece => "pcs",
        }
    }

    /// Base units per costing unit (kg, litre, piece).
    pub fn costing_factor(&self) -> i64 {
        match self {
            Unit::Gram | Unit::Millilitre => 1000,
            Unit::Piece => 1,
        }
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gram" | "g" => Ok(Unit::Gram),
            "millilitre" | "milliliter" | "ml" => Ok(Unit::Millilitre),
            "piece" | "pcs" | "pc" => Ok(Unit::Piece),
            _ => Err(ValidationError::NotAllowed {
                field: "unit".to_string(),
                allowed: vec!["gram".into(), "millilitre".into(), "piece".into()],
            }),
        }
    }
}

/// A raw material consumed by recipes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub unit: Unit,
    /// Low-stock threshold in base units.
    pub reorder_level: i64,
    /// Cost in cents per kg, litre or piece (see [`Unit::costing_factor`]).
    pub unit_cost_cents: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Ingredient {
    /// Cost of `quantity` base units.
    pub fn cost_of(&self, quantity: i64) -> Money {
        let factor = self.unit.costing_factor();
        let cents = (self.unit_cost_cents as i128 * quantity as i128 + factor as i128 / 2)
            / factor as i128;
        Money::from_cents(cents as i64)
    }
}

/// One ingredient line of a menu item's recipe (per portion).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeLine {
    pub id: String,
    pub product_id: String,
    pub ingredient_id: String,
    /// Base units consumed per portion sold.
    pub quantity: i64,
}

/// What a location is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Main store room; receives purchases.
    Store,
    Kitchen,
    Bar,
    /// Another branch / outlet.
    Outlet,
}

/// A place stock is held.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub kind: LocationKind,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementKind {
    Opening,
    Purchase,
    TransferIn,
    TransferOut,
    IssueIn,
    IssueOut,
    Adjustment,
    Wastage,
    SaleConsumption,
}

impl StockMovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMovementKind::Opening => "opening",
            StockMovementKind::Purchase => "purchase",
            StockMovementKind::TransferIn => "transfer_in",
            StockMovementKind::TransferOut => "transfer_out",
            StockMovementKind::IssueIn => "issue_in",
            StockMovementKind::IssueOut => "issue_out",
            StockMovementKind::Adjustment => "adjustment",
            StockMovementKind::Wastage => "wastage",
            StockMovementKind::SaleConsumption => "sale_consumption",
        }
    }
}

/// A signed stock row. Balances are the sum of these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockTransaction {
    pub id: String,
    pub ingredient_id: String,
    pub location_id: String,
    /// Positive adds stock, negative removes it.
    pub quantity: i64,
    pub kind: StockMovementKind,
    /// Issue / sale / purchase this row belongs to.
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Issue (store → kitchen) or transfer (outlet → outlet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockIssueKind {
    Issue,
    Transfer,
}

impl StockIssueKind {
    /// Prefix used in issue numbers (`ISS-…`, `TRF-…`).
    pub fn prefix(&self) -> &'static str {
        match self {
            StockIssueKind::Issue => "ISS",
            StockIssueKind::Transfer => "TRF",
        }
    }

    /// Movement kinds written at (source, destination).
    pub fn movement_kinds(&self) -> (StockMovementKind, StockMovementKind) {
        match self {
            StockIssueKind::Issue => (StockMovementKind::IssueOut, StockMovementKind::IssueIn),
            StockIssueKind::Transfer => {
                (StockMovementKind::TransferOut, StockMovementKind::TransferIn)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockIssueStatus {
    Completed,
    Cancelled,
}

/// Header of a stock issue or transfer document.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockIssue {
    pub id: String,
    pub issue_number: String,
    pub kind: StockIssueKind,
    pub from_location_id: String,
    pub to_location_id: String,
    pub status: StockIssueStatus,
    pub issued_by: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockIssueLine {
    pub id: String,
    pub issue_id: String,
    pub ingredient_id: String,
    pub quantity: i64,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    DineIn,
    Takeaway,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Takeaway => "takeaway",
            OrderType::Delivery => "delivery",
        }
    }
}

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Order recorded, waiting for payment.
    #[default]
    Open,
    /// Fully paid.
    Completed,
    /// Cancelled before or after payment.
    Voided,
    /// Paid then refunded in full.
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "open",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
            SaleStatus::Refunded => "refunded",
        }
    }
}

/// A recorded order with its bill totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub receipt_number: String,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub service_charge_cents: i64,
    pub vat_cents: i64,
    pub total_cents: i64,
    /// VAT rate applied when the bill was computed (frozen).
    pub vat_rate_bps: i64,
    pub vat_inclusive: bool,
    pub cashier: String,
    pub device_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item in a sale. Product data is frozen at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    pub vat_applicable: bool,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    #[inline]
    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileWallet => "mobile_wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "mobile_wallet" | "wallet" => Ok(PaymentMethod::MobileWallet),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: vec!["cash".into(), "card".into(), "mobile_wallet".into()],
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Money from this transaction counts toward the bill.
    pub fn is_captured(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
        )
    }
}

/// One payment attempt against a sale. A sale may have several (split tender).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentTransaction {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    /// Wallet provider code or card brand.
    pub provider: Option<String>,
    pub amount_cents: i64,
    /// For cash: amount the customer handed over.
    pub tendered_cents: Option<i64>,
    /// For cash: change returned.
    pub change_cents: Option<i64>,
    pub refunded_cents: i64,
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    /// Card or wallet session that produced this transaction.
    pub session_id: Option<String>,
    pub failure_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Captured amount not yet refunded.
    pub fn refundable(&self) -> Money {
        if !self.status.is_captured() {
            return Money::zero();
        }
        Money::from_cents(self.amount_cents - self.refunded_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CardSessionStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Cancelled,
    Expired,
}

impl CardSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardSessionStatus::Created => "created",
            CardSessionStatus::Authorized => "authorized",
            CardSessionStatus::Captured => "captured",
            CardSessionStatus::Failed => "failed",
            CardSessionStatus::Cancelled => "cancelled",
            CardSessionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CardSessionStatus::Created | CardSessionStatus::Authorized)
    }
}

/// A card payment in flight at the (simulated) gateway.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CardSession {
    pub id: String,
    pub sale_id: String,
    pub amount_cents: i64,
    pub status: CardSessionStatus,
    /// Handed to the card terminal / web SDK to confirm the payment.
    pub client_secret: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WalletSessionStatus {
    Pending,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl WalletSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletSessionStatus::Pending => "pending",
            WalletSessionStatus::Completed => "completed",
            WalletSessionStatus::Failed => "failed",
            WalletSessionStatus::Expired => "expired",
            WalletSessionStatus::Cancelled => "cancelled",
        }
    }
}

/// A mobile-wallet / QR payment waiting for the customer to approve.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MobilePaymentSession {
    pub id: String,
    pub sale_id: String,
    /// Provider code from the wallet catalog (`ez_cash`, `frimi`, ...).
    pub provider: String,
    pub amount_cents: i64,
    /// Provider fee absorbed by the restaurant.
    pub fee_cents: i64,
    pub payer_phone: Option<String>,
    pub qr_payload: String,
    pub status: WalletSessionStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// VAT
// =============================================================================

/// A VAT configuration. Exactly one row is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct VatSettings {
    pub id: String,
    pub name: String,
    /// Preset code this row was created from, if any.
    pub preset: Option<String>,
    pub rate_bps: i64,
    pub mode: TaxMode,
    pub service_charge_bps: i64,
    /// Whether VAT is also charged on the service charge.
    pub vat_on_service_charge: bool,
    pub registration_number: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl VatSettings {
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.rate_bps.clamp(0, 10_000) as u32)
    }

    pub fn service_charge_rate(&self) -> u32 {
        self.service_charge_bps.clamp(0, 10_000) as u32
    }
}

// =============================================================================
// Expenses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Ingredients,
    Utilities,
    Rent,
    Salaries,
    Maintenance,
    Marketing,
    Transport,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Ingredients => "ingredients",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Rent => "rent",
            ExpenseCategory::Salaries => "salaries",
            ExpenseCategory::Maintenance => "maintenance",
            ExpenseCategory::Marketing => "marketing",
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Other => "other",
        }
    }
}

impl FromStr for ExpenseCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.trim().to_lowercase().as_str() {
            "ingredients" => ExpenseCategory::Ingredients,
            "utilities" => ExpenseCategory::Utilities,
            "rent" => ExpenseCategory::Rent,
            "salaries" => ExpenseCategory::Salaries,
            "maintenance" => ExpenseCategory::Maintenance,
            "marketing" => ExpenseCategory::Marketing,
            "transport" => ExpenseCategory::Transport,
            "other" => ExpenseCategory::Other,
            _ => {
                return Err(ValidationError::NotAllowed {
                    field: "category".to_string(),
                    allowed: [
                        "ingredients",
                        "utilities",
                        "rent",
                        "salaries",
                        "maintenance",
                        "marketing",
                        "transport",
                        "other",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                })
            }
        };
        Ok(category)
    }
}

/// Money paid out of the business.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub category: ExpenseCategory,
    pub description: String,
    pub amount_cents: i64,
    pub vendor: Option<String>,
    pub paid_via: Option<PaymentMethod>,
    #[ts(as = "String")]
    pub expense_date: NaiveDate,
    /// Supplier invoice / bill number.
    pub reference: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Offline Sync Conflicts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DuplicateSale,
    PossibleDuplicateSale,
    ProductFieldMismatch,
    DuplicateProduct,
    InsufficientStock,
    UnknownReference,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateSale => "duplicate_sale",
            ConflictKind::PossibleDuplicateSale => "possible_duplicate_sale",
            ConflictKind::ProductFieldMismatch => "product_field_mismatch",
            ConflictKind::DuplicateProduct => "duplicate_product",
            ConflictKind::InsufficientStock => "insufficient_stock",
            ConflictKind::UnknownReference => "unknown_reference",
        }
    }
}

/// Ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Discard the offline record.
    KeepServer,
    /// Overwrite server data with the offline record.
    KeepClient,
    /// Field-level merge of both versions.
    Merge,
    /// Store the offline record as a separate entity.
    KeepBoth,
    /// A manager must decide. Suggested only; resolving needs a concrete
    /// strategy.
    ManualReview,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 5] = [
        ResolutionStrategy::KeepServer,
        ResolutionStrategy::KeepClient,
        ResolutionStrategy::Merge,
        ResolutionStrategy::KeepBoth,
        ResolutionStrategy::ManualReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::KeepServer => "keep_server",
            ResolutionStrategy::KeepClient => "keep_client",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::KeepBoth => "keep_both",
            ResolutionStrategy::ManualReview => "manual_review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Ignored => "ignored",
        }
    }
}

/// A conflict found while replaying an offline terminal's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SyncConflict {
    pub id: String,
    pub batch_id: String,
    pub device_id: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    /// `sale`, `product` or `stock_movement`.
    pub entity_type: String,
    /// Id of the offline record.
    pub entity_id: String,
    /// Id of the server record it collides with, if any.
    pub server_entity_id: Option<String>,
    /// 0.0 - 1.0 similarity for duplicate checks.
    pub similarity: f64,
    /// Human-readable explanation.
    pub message: String,
    /// JSON snapshot of the offline record.
    pub client_payload: String,
    pub suggested_strategy: ResolutionStrategy,
    pub status: ConflictStatus,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub resolved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1800);
        assert_eq!(rate.bps(), 1800);
        assert!((rate.percentage() - 18.0).abs() < 0.001);
        assert_eq!(TaxRate::from_percentage(2.5).bps(), 250);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SaleStatus::default(), SaleStatus::Open);
        assert_eq!(TaxMode::default(), TaxMode::Exclusive);
        assert_eq!(OrderType::default(), OrderType::DineIn);
        assert_eq!(ConflictStatus::default(), ConflictStatus::Pending);
    }

    #[test]
    fn test_ingredient_cost_of() {
        let now = Utc::now();
        let rice = Ingredient {
            id: "i1".into(),
            name: "Samba Rice".into(),
            unit: Unit::Gram,
            reorder_level: 5_000,
            unit_cost_cents: 28_000, // Rs. 280 per kg
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(rice.cost_of(250).cents(), 7_000);

        let eggs = Ingredient {
            unit: Unit::Piece,
            unit_cost_cents: 5_500,
            ..rice
        };
        assert_eq!(eggs.cost_of(2).cents(), 11_000);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("ml".parse::<Unit>().unwrap(), Unit::Millilitre);
        assert_eq!("wallet".parse::<PaymentMethod>().unwrap(), PaymentMethod::MobileWallet);
        assert_eq!("Rent".parse::<ExpenseCategory>().unwrap(), ExpenseCategory::Rent);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Critical > ConflictSeverity::High);
        assert!(ConflictSeverity::Medium > ConflictSeverity::Low);
    }

    #[test]
    fn test_payment_status_captured() {
        assert!(PaymentStatus::Completed.is_captured());
        assert!(PaymentStatus::PartiallyRefunded.is_captured());
        assert!(!PaymentStatus::Pending.is_captured());
        assert!(!PaymentStatus::Failed.is_captured());
    }
}
