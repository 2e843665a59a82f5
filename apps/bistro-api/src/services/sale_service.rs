//! # Sale Service
//!
//! ## Creating a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CreateSaleRequest                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load products ── missing / unavailable ──► error                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  active VAT settings ──► compute_bill (service charge for dine-in)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  recipes of tracked products ──► plan_consumption @ kitchen             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SaleRepository::create  (sale + items + consumption, one transaction)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bistro_core::conflict::OfflineSale;
use bistro_core::payment::{payment_summary, PaymentSummary};
use bistro_core::stock::{plan_consumption, NewStockMovement};
use bistro_core::validation::{
    validate_amount_cents, validate_name, validate_optional_text, validate_quantity,
    validate_sale_lines,
};
use bistro_core::vat::{compute_bill, BillLine};
use bistro_core::{
    CoreError, LocationKind, Money, OrderType, PaymentMethod, PaymentStatus, PaymentTransaction,
    Product, Sale, SaleItem, SaleStatus, TaxMode,
};
use bistro_db::{new_id, PaymentRecorded, SaleFilter};

use crate::error::{ApiError, ApiResult};
use crate::services::payment_service::PaymentService;
use crate::services::vat_service::VatService;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub customer_name: Option<String>,
    pub cashier: String,
    pub items: Vec<SaleLineRequest>,
    #[serde(default)]
    pub discount_cents: i64,
    pub device_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoidSaleRequest {
    pub voided_by: String,
    pub reason: Option<String>,
}

/// A sale with its lines and payment position.
#[derive(Debug, Clone, Serialize)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<PaymentTransaction>,
    pub summary: PaymentSummary,
}

pub struct SaleService<'a> {
    state: &'a AppState,
}

impl<'a> SaleService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        SaleService { state }
    }

    pub async fn create(&self, request: CreateSaleRequest) -> ApiResult<SaleDetail> {
        validate_name("cashier", &request.cashier)?;
        validate_sale_lines(request.items.len())?;
        validate_amount_cents("discount_cents", request.discount_cents)?;
        validate_optional_text("table_number", request.table_number.as_deref(), 16)?;
        validate_optional_text("customer_name", request.customer_name.as_deref(), 100)?;
        validate_optional_text("notes", request.notes.as_deref(), 500)?;
        for line in &request.items {
            validate_quantity(line.quantity)?;
        }

        let products = self.load_products(request.items.iter().map(|l| &l.product_id)).await?;
        for line in &request.items {
            let product = &products[&line.product_id];
            if !product.is_sellable() {
                return Err(ApiError::business(format!(
                    "{} is not available",
                    product.name
                )));
            }
        }

        let now = Utc::now();
        let sale_id = new_id();

        let bill_lines: Vec<BillLine> = request
            .items
            .iter()
            .map(|l| {
                let product = &products[&l.product_id];
                BillLine {
                    line_total: product.price() * l.quantity,
                    vat_applicable: product.vat_applicable,
                }
            })
            .collect();

        let (_, vat_config) = VatService::new(self.state).active_config().await?;
        let bill = compute_bill(
            &bill_lines,
            Money::from_cents(request.discount_cents),
            &vat_config.for_order(request.order_type),
        )?;

        let items: Vec<SaleItem> = request
            .items
            .iter()
            .map(|l| {
                let product = &products[&l.product_id];
                sale_item(&sale_id, product, l.quantity, product.price_cents, l.notes.clone(), now)
            })
            .collect();

        let sale = Sale {
            id: sale_id,
            receipt_number: String::new(),
            order_type: request.order_type,
            table_number: request.table_number,
            customer_name: request.customer_name,
            status: SaleStatus::Open,
            subtotal_cents: bill.subtotal.cents(),
            discount_cents: bill.discount.cents(),
            service_charge_cents: bill.service_charge.cents(),
            vat_cents: bill.vat.cents(),
            total_cents: bill.total.cents(),
            vat_rate_bps: i64::from(bill.vat_rate_bps),
            vat_inclusive: bill.mode == TaxMode::Inclusive,
            cashier: request.cashier.trim().to_string(),
            device_id: request.device_id,
            notes: request.notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let consumption = self.consumption(&items, &products).await?;
        let (sale, items) = self
            .state
            .db
            .sales()
            .create(sale, items, &consumption, self.state.config.stock.enforce_on_sale)
            .await?;

        // Nothing to collect on a fully discounted bill.
        let sale = if sale.total_cents == 0 {
            self.state.db.sales().complete(&sale.id).await?
        } else {
            sale
        };

        info!(
            id = %sale.id,
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_cents,
            consumed = consumption.len(),
            "Sale rung up"
        );

        Ok(SaleDetail {
            summary: payment_summary(sale.total(), &[]),
            sale,
            items,
            payments: Vec::new(),
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<SaleDetail> {
        let db = &self.state.db;
        let sale = db
            .sales()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", id))?;
        let items = db.sales().items(id).await?;
        let payments = db.payments().transactions_for_sale(id).await?;
        let summary = payment_summary(sale.total(), &payments);

        Ok(SaleDetail {
            sale,
            items,
            payments,
            summary,
        })
    }

    pub async fn list(&self, filter: &SaleFilter) -> ApiResult<Vec<Sale>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            bistro_core::validation::validate_date_range(from, to)?;
        }
        Ok(self.state.db.sales().list(filter).await?)
    }

    /// Voids a sale and puts its ingredients back.
    ///
    /// Money that was taken must be refunded first. Card and wallet sessions
    /// still open on the sale are cancelled, releasing any card hold.
    pub async fn void(&self, id: &str, request: VoidSaleRequest) -> ApiResult<Sale> {
        validate_name("voided_by", &request.voided_by)?;
        validate_optional_text("reason", request.reason.as_deref(), 500)?;

        let detail = self.get(id).await?;
        if detail.summary.paid.is_positive() {
            warn!(
                id = %id,
                paid_cents = detail.summary.paid.cents(),
                "Void rejected, payments outstanding"
            );
            return Err(ApiError::business(format!(
                "Sale {} has {} in captured payments; refund them before voiding",
                detail.sale.receipt_number, detail.summary.paid
            )));
        }

        if detail.sale.status == SaleStatus::Open {
            PaymentService::new(self.state).cancel_open_sessions(id).await?;
        }

        let sale = self
            .state
            .db
            .sales()
            .void(id, request.voided_by.trim(), request.reason.as_deref())
            .await?;
        info!(id = %id, receipt_number = %sale.receipt_number, "Sale voided");
        Ok(sale)
    }

    /// Stores a sale rung up on an offline terminal, keeping the terminal's
    /// totals. A sale the terminal settled gets a matching captured payment.
    ///
    /// With `fresh_receipt` the terminal's receipt number is replaced by the
    /// next server number.
    pub async fn record_offline(
        &self,
        offline: &OfflineSale,
        device_id: &str,
        fresh_receipt: bool,
    ) -> ApiResult<Sale> {
        let products = self
            .load_products(offline.items.iter().map(|i| &i.product_id))
            .await?;

        let items: Vec<SaleItem> = offline
            .items
            .iter()
            .map(|i| {
                let product = &products[&i.product_id];
                sale_item(&offline.id, product, i.quantity, i.unit_price_cents, None, offline.created_at)
            })
            .collect();

        let (_, vat_config) = VatService::new(self.state).active_config().await?;
        let vat_rate_bps = if offline.vat_cents > 0 {
            i64::from(vat_config.rate.bps())
        } else {
            0
        };

        let receipt_number = match (&offline.receipt_number, fresh_receipt) {
            (Some(r), false) => r.clone(),
            _ => String::new(),
        };

        let sale = Sale {
            id: offline.id.clone(),
            receipt_number,
            order_type: offline.order_type,
            table_number: offline.table_number.clone(),
            customer_name: offline.customer_name.clone(),
            status: SaleStatus::Open,
            subtotal_cents: offline.subtotal_cents,
            discount_cents: offline.discount_cents,
            service_charge_cents: offline.service_charge_cents,
            vat_cents: offline.vat_cents,
            total_cents: offline.total_cents,
            vat_rate_bps,
            vat_inclusive: vat_config.mode == TaxMode::Inclusive,
            cashier: offline.cashier.clone(),
            device_id: Some(device_id.to_string()),
            notes: offline.notes.clone(),
            created_at: offline.created_at,
            updated_at: Utc::now(),
            completed_at: None,
        };

        // Replays never block on stock; shortfalls surface as warnings.
        let consumption = self.consumption(&items, &products).await?;
        let (sale, _) = self
            .state
            .db
            .sales()
            .create(sale, items, &consumption, false)
            .await?;

        match offline.payment_method {
            Some(method) if sale.total_cents > 0 => {
                let recorded = self.settle_offline(&sale, method, offline.created_at).await?;
                debug!(id = %sale.id, completed = recorded.sale_completed, "Offline payment recorded");
                self.state
                    .db
                    .sales()
                    .get_by_id(&sale.id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Sale", &sale.id))
            }
            _ => Ok(sale),
        }
    }

    async fn settle_offline(
        &self,
        sale: &Sale,
        method: PaymentMethod,
        at: DateTime<Utc>,
    ) -> ApiResult<PaymentRecorded> {
        let txn = PaymentTransaction {
            id: new_id(),
            sale_id: sale.id.clone(),
            method,
            provider: None,
            amount_cents: sale.total_cents,
            tendered_cents: None,
            change_cents: None,
            refunded_cents: 0,
            status: PaymentStatus::Completed,
            gateway_reference: None,
            session_id: None,
            failure_reason: None,
            created_at: at,
            updated_at: Utc::now(),
        };
        Ok(self.state.db.payments().record(&txn, None).await?)
    }

    /// Loads every referenced product, failing on the first unknown id.
    async fn load_products<'i>(
        &self,
        ids: impl Iterator<Item = &'i String>,
    ) -> ApiResult<HashMap<String, Product>> {
        let mut wanted: Vec<String> = ids.cloned().collect();
        wanted.sort();
        wanted.dedup();

        let found: HashMap<String, Product> = self
            .state
            .db
            .products()
            .get_many(&wanted)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        if let Some(missing) = wanted.iter().find(|id| !found.contains_key(*id)) {
            return Err(CoreError::ProductNotFound(missing.clone()).into());
        }
        Ok(found)
    }

    /// Ingredient usage of the tracked items, drawn from the consumption
    /// location.
    async fn consumption(
        &self,
        items: &[SaleItem],
        products: &HashMap<String, Product>,
    ) -> ApiResult<Vec<NewStockMovement>> {
        let sold: Vec<(String, i64)> = items
            .iter()
            .filter(|i| products.get(&i.product_id).is_some_and(|p| p.track_inventory))
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();
        if sold.is_empty() {
            return Ok(Vec::new());
        }

        let Some(location_id) = self.consumption_location().await? else {
            warn!("No kitchen location configured, sale recorded without consumption");
            return Ok(Vec::new());
        };

        let product_ids: Vec<String> = sold.iter().map(|(id, _)| id.clone()).collect();
        let recipes = self.state.db.products().recipes_for(&product_ids).await?;
        Ok(plan_consumption(&recipes, &sold, &location_id))
    }

    async fn consumption_location(&self) -> ApiResult<Option<String>> {
        if let Some(id) = &self.state.config.stock.consumption_location_id {
            return Ok(Some(id.clone()));
        }
        Ok(self
            .state
            .db
            .locations()
            .first_of_kind(LocationKind::Kitchen)
            .await?
            .map(|l| l.id))
    }
}

fn sale_item(
    sale_id: &str,
    product: &Product,
    quantity: i64,
    unit_price_cents: i64,
    notes: Option<String>,
    at: DateTime<Utc>,
) -> SaleItem {
    SaleItem {
        id: new_id(),
        sale_id: sale_id.to_string(),
        product_id: product.id.clone(),
        sku_snapshot: product.sku.clone(),
        name_snapshot: product.name.clone(),
        unit_price_cents,
        unit_cost_cents: product.cost_cents.unwrap_or(0),
        quantity,
        line_total_cents: unit_price_cents * quantity,
        vat_applicable: product.vat_applicable,
        notes,
        created_at: at,
    }
}
