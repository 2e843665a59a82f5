//! # Payment Service
//!
//! Cash, card and mobile-wallet payments against open sales.
//!
//! ## Card Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_card_session ──► Created ── confirm ──► Authorized              │
//! │                             │          │            │                   │
//! │                          cancel     declined     capture                │
//! │                             │          │            │                   │
//! │                             ▼          ▼            ▼                   │
//! │                        Cancelled     Failed      Captured ──► payment   │
//! │                                                                         │
//! │  Any non-terminal session past its TTL becomes Expired on next touch.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wallet sessions are `Pending` until the customer approves on their phone,
//! then `Completed` with a captured payment.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bistro_core::payment::{
    card_transition, ensure_within_balance, find_wallet_provider, is_expired, payment_summary,
    plan_refund, qr_payload, session_expiry, settle_cash, wallet_transition, CashSettlement,
    PaymentSummary, WalletProvider, WALLET_PROVIDERS,
};
use bistro_core::validation::{
    validate_card_number, validate_optional_text, validate_payment_amount, validate_phone,
};
use bistro_core::{
    CardSession, CardSessionStatus, CoreError, MobilePaymentSession, Money, PaymentMethod,
    PaymentStatus, PaymentTransaction, Sale, SaleStatus, ValidationError, WalletSessionStatus,
};
use bistro_db::{new_id, PaymentRecorded, SessionUpdate};

use crate::error::{ApiError, ApiResult};
use crate::services::gateway::{CardDetails, GatewayError};
use crate::state::AppState;

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CashPaymentRequest {
    /// Part of the bill to settle; the full balance when omitted.
    pub amount_cents: Option<i64>,
    pub tendered_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashPaymentResponse {
    #[serde(flatten)]
    pub recorded: PaymentRecorded,
    pub settlement: CashSettlement,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCardSessionRequest {
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmCardRequest {
    pub payment_token: String,
    pub card_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWalletSessionRequest {
    pub provider: String,
    pub amount_cents: Option<i64>,
    pub payer_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmWalletRequest {
    pub approval_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    /// Amount to refund; everything still refundable when omitted.
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub transaction: PaymentTransaction,
    pub refunded_cents: i64,
    /// Refund reference from the card or wallet gateway; `None` for cash.
    pub gateway_reference: Option<String>,
    pub sale_refunded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalePayments {
    pub sale_id: String,
    pub summary: PaymentSummary,
    pub transactions: Vec<PaymentTransaction>,
}

// =============================================================================
// Service
// =============================================================================

pub struct PaymentService<'a> {
    state: &'a AppState,
}

impl<'a> PaymentService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        PaymentService { state }
    }

    pub async fn sale_payments(&self, sale_id: &str) -> ApiResult<SalePayments> {
        let sale = self.sale(sale_id).await?;
        let transactions = self.state.db.payments().transactions_for_sale(sale_id).await?;
        Ok(SalePayments {
            sale_id: sale.id,
            summary: payment_summary(Money::from_cents(sale.total_cents), &transactions),
            transactions,
        })
    }

    // =========================================================================
    // Cash
    // =========================================================================

    pub async fn pay_cash(
        &self,
        sale_id: &str,
        request: CashPaymentRequest,
    ) -> ApiResult<CashPaymentResponse> {
        let (sale, balance_due) = self.open_sale_balance(sale_id).await?;
        let amount = self.requested_amount(request.amount_cents, balance_due)?;
        let settlement = settle_cash(amount, Money::from_cents(request.tendered_cents))?;

        let mut txn = transaction(&sale.id, PaymentMethod::Cash, amount, PaymentStatus::Completed);
        txn.tendered_cents = Some(settlement.tendered.cents());
        txn.change_cents = Some(settlement.change.cents());

        let recorded = self.state.db.payments().record(&txn, None).await?;
        info!(
            sale_id = %sale.id,
            amount_cents = amount.cents(),
            change_cents = settlement.change.cents(),
            "Cash payment taken"
        );

        Ok(CashPaymentResponse {
            recorded,
            settlement,
        })
    }

    // =========================================================================
    // Card
    // =========================================================================

    pub async fn create_card_session(
        &self,
        sale_id: &str,
        request: CreateCardSessionRequest,
    ) -> ApiResult<CardSession> {
        let (sale, balance_due) = self.open_sale_balance(sale_id).await?;
        let amount = self.requested_amount(request.amount_cents, balance_due)?;

        let now = Utc::now();
        let session = CardSession {
            id: new_id(),
            sale_id: sale.id,
            amount_cents: amount.cents(),
            status: CardSessionStatus::Created,
            client_secret: format!("cs_secret_{}", Uuid::new_v4().simple()),
            card_brand: None,
            card_last4: None,
            gateway_reference: None,
            failure_reason: None,
            expires_at: session_expiry(now, self.state.config.payments.card_session_ttl_minutes),
            created_at: now,
            updated_at: now,
        };
        self.state.db.payments().insert_card_session(&session).await?;

        info!(id = %session.id, sale_id = %session.sale_id, amount_cents = session.amount_cents, "Card session created");
        Ok(session)
    }

    pub async fn get_card_session(&self, id: &str) -> ApiResult<CardSession> {
        let session = self.card_session(id).await?;
        self.expire_card(session).await
    }

    /// Authorizes the session with the card the customer presented.
    pub async fn confirm_card_session(
        &self,
        id: &str,
        request: ConfirmCardRequest,
    ) -> ApiResult<CardSession> {
        let mut session = self.live_card_session(id).await?;
        card_transition(session.status, CardSessionStatus::Authorized)?;
        self.ensure_payable(&session.sale_id, session.amount_cents).await?;

        if request.payment_token.trim().is_empty() {
            return Err(ValidationError::required("payment_token").into());
        }
        let card_number = request
            .card_number
            .as_deref()
            .map(validate_card_number)
            .transpose()?;

        let details = CardDetails {
            payment_token: request.payment_token,
            card_number,
        };

        match self.state.card_gateway.authorize(&session, &details).await {
            Ok(auth) => {
                session.status = CardSessionStatus::Authorized;
                session.card_brand = Some(auth.card_brand);
                session.card_last4 = Some(auth.card_last4);
                session.gateway_reference = Some(auth.reference);
                session.updated_at = Utc::now();
                self.state.db.payments().update_card_session(&session).await?;
                info!(id = %session.id, brand = ?session.card_brand, "Card authorized");
                Ok(session)
            }
            Err(err) => {
                self.fail_card(session, &err).await?;
                Err(err.into())
            }
        }
    }

    /// Captures an authorized session and records the payment.
    ///
    /// The sale must still be open and owe at least the session amount; the
    /// gateway is only called after that check.
    pub async fn capture_card_session(&self, id: &str) -> ApiResult<PaymentRecorded> {
        let mut session = self.live_card_session(id).await?;
        card_transition(session.status, CardSessionStatus::Captured)?;
        self.ensure_payable(&session.sale_id, session.amount_cents).await?;

        let reference = match self.state.card_gateway.capture(&session).await {
            Ok(reference) => reference,
            Err(err) => {
                self.fail_card(session, &err).await?;
                return Err(err.into());
            }
        };

        session.status = CardSessionStatus::Captured;
        session.gateway_reference = Some(reference.clone());
        session.updated_at = Utc::now();

        let mut txn = transaction(
            &session.sale_id,
            PaymentMethod::Card,
            Money::from_cents(session.amount_cents),
            PaymentStatus::Completed,
        );
        txn.provider = session.card_brand.clone();
        txn.gateway_reference = Some(reference);
        txn.session_id = Some(session.id.clone());

        let recorded = match self
            .state
            .db
            .payments()
            .record(&txn, Some(SessionUpdate::Card(&session)))
            .await
        {
            Ok(recorded) => recorded,
            Err(err) => {
                error!(id = %session.id, error = %err, "Captured card payment not recorded, refunding");
                if let Err(refund_err) = self
                    .state
                    .card_gateway
                    .refund(&txn, Money::from_cents(txn.amount_cents))
                    .await
                {
                    error!(id = %session.id, error = %refund_err, "Compensating card refund failed");
                }
                return Err(err.into());
            }
        };
        info!(id = %session.id, sale_id = %session.sale_id, "Card payment captured");
        Ok(recorded)
    }

    pub async fn cancel_card_session(&self, id: &str) -> ApiResult<CardSession> {
        let mut session = self.live_card_session(id).await?;
        card_transition(session.status, CardSessionStatus::Cancelled)?;

        if session.status == CardSessionStatus::Authorized {
            self.state.card_gateway.release(&session).await?;
        }

        session.status = CardSessionStatus::Cancelled;
        session.updated_at = Utc::now();
        self.state.db.payments().update_card_session(&session).await?;
        info!(id = %session.id, "Card session cancelled");
        Ok(session)
    }

    /// Marks the session failed and keeps the declined attempt on record.
    async fn fail_card(&self, mut session: CardSession, err: &GatewayError) -> ApiResult<()> {
        warn!(id = %session.id, error = %err, "Card payment failed");
        session.status = CardSessionStatus::Failed;
        session.failure_reason = Some(err.to_string());
        session.updated_at = Utc::now();

        let mut txn = transaction(
            &session.sale_id,
            PaymentMethod::Card,
            Money::from_cents(session.amount_cents),
            PaymentStatus::Failed,
        );
        txn.session_id = Some(session.id.clone());
        txn.failure_reason = Some(err.to_string());

        self.state
            .db
            .payments()
            .record(&txn, Some(SessionUpdate::Card(&session)))
            .await?;
        Ok(())
    }

    async fn card_session(&self, id: &str) -> ApiResult<CardSession> {
        self.state
            .db
            .payments()
            .get_card_session(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Card session", id))
    }

    /// Moves a session past its TTL to `Expired`.
    async fn expire_card(&self, mut session: CardSession) -> ApiResult<CardSession> {
        if !session.status.is_terminal() && is_expired(session.expires_at, Utc::now()) {
            card_transition(session.status, CardSessionStatus::Expired)?;
            session.status = CardSessionStatus::Expired;
            session.updated_at = Utc::now();
            self.state.db.payments().update_card_session(&session).await?;
            debug!(id = %session.id, "Card session expired");
        }
        Ok(session)
    }

    async fn live_card_session(&self, id: &str) -> ApiResult<CardSession> {
        let session = self.expire_card(self.card_session(id).await?).await?;
        if session.status == CardSessionStatus::Expired {
            return Err(CoreError::SessionExpired {
                entity: "Card session".to_string(),
                id: session.id,
            }
            .into());
        }
        Ok(session)
    }

    // =========================================================================
    // Mobile Wallets
    // =========================================================================

    pub fn wallet_providers(&self) -> &'static [WalletProvider] {
        &WALLET_PROVIDERS
    }

    pub async fn create_wallet_session(
        &self,
        sale_id: &str,
        request: CreateWalletSessionRequest,
    ) -> ApiResult<MobilePaymentSession> {
        let provider = find_wallet_provider(&request.provider)?;
        let payer_phone = match request.payer_phone.as_deref() {
            Some(phone) => Some(validate_phone(phone)?),
            None if provider.requires_phone => {
                return Err(ValidationError::required("payer_phone").into())
            }
            None => None,
        };

        let (sale, balance_due) = self.open_sale_balance(sale_id).await?;
        let amount = self.requested_amount(request.amount_cents, balance_due)?;
        provider.check_amount(amount)?;

        let now = Utc::now();
        let id = new_id();
        let qr = if provider.qr_based {
            qr_payload(provider.code, &id, amount, &sale.receipt_number)
        } else {
            String::new()
        };

        let mut session = MobilePaymentSession {
            id,
            sale_id: sale.id,
            provider: provider.code.to_string(),
            amount_cents: amount.cents(),
            fee_cents: provider.fee(amount).cents(),
            payer_phone,
            qr_payload: qr,
            status: WalletSessionStatus::Pending,
            provider_reference: None,
            failure_reason: None,
            expires_at: session_expiry(now, self.state.config.payments.wallet_session_ttl_minutes),
            created_at: now,
            updated_at: now,
        };
        session.provider_reference = Some(self.state.wallet_gateway.request_payment(&session).await?);

        self.state.db.payments().insert_wallet_session(&session).await?;
        info!(
            id = %session.id,
            sale_id = %session.sale_id,
            provider = %session.provider,
            amount_cents = session.amount_cents,
            "Wallet session created"
        );
        Ok(session)
    }

    /// Current state of a wallet session, expiring it if its TTL passed.
    pub async fn wallet_status(&self, id: &str) -> ApiResult<MobilePaymentSession> {
        let session = self.wallet_session(id).await?;
        self.expire_wallet(session).await
    }

    pub async fn confirm_wallet_session(
        &self,
        id: &str,
        request: ConfirmWalletRequest,
    ) -> ApiResult<PaymentRecorded> {
        let mut session = self.live_wallet_session(id).await?;
        wallet_transition(session.status, WalletSessionStatus::Completed)?;
        self.ensure_payable(&session.sale_id, session.amount_cents).await?;

        let mut txn = transaction(
            &session.sale_id,
            PaymentMethod::MobileWallet,
            Money::from_cents(session.amount_cents),
            PaymentStatus::Completed,
        );
        txn.provider = Some(session.provider.clone());
        txn.gateway_reference = session.provider_reference.clone();
        txn.session_id = Some(session.id.clone());

        if let Err(err) = self
            .state
            .wallet_gateway
            .confirm(&session, request.approval_code.as_deref())
            .await
        {
            warn!(id = %session.id, error = %err, "Wallet payment failed");
            session.status = WalletSessionStatus::Failed;
            session.failure_reason = Some(err.to_string());
            session.updated_at = Utc::now();
            txn.status = PaymentStatus::Failed;
            txn.failure_reason = Some(err.to_string());
            self.state
                .db
                .payments()
                .record(&txn, Some(SessionUpdate::Wallet(&session)))
                .await?;
            return Err(err.into());
        }

        session.status = WalletSessionStatus::Completed;
        session.updated_at = Utc::now();
        let recorded = match self
            .state
            .db
            .payments()
            .record(&txn, Some(SessionUpdate::Wallet(&session)))
            .await
        {
            Ok(recorded) => recorded,
            Err(err) => {
                error!(id = %session.id, error = %err, "Wallet payment not recorded, refunding");
                if let Err(refund_err) = self
                    .state
                    .wallet_gateway
                    .refund(&txn, Money::from_cents(txn.amount_cents))
                    .await
                {
                    error!(id = %session.id, error = %refund_err, "Compensating wallet refund failed");
                }
                return Err(err.into());
            }
        };
        info!(id = %session.id, provider = %session.provider, "Wallet payment completed");
        Ok(recorded)
    }

    pub async fn cancel_wallet_session(&self, id: &str) -> ApiResult<MobilePaymentSession> {
        let mut session = self.live_wallet_session(id).await?;
        wallet_transition(session.status, WalletSessionStatus::Cancelled)?;
        session.status = WalletSessionStatus::Cancelled;
        session.updated_at = Utc::now();
        self.state.db.payments().update_wallet_session(&session).await?;
        Ok(session)
    }

    /// Cancels every card and wallet session still open on a sale, releasing
    /// card authorizations at the gateway. Returns how many were closed.
    pub async fn cancel_open_sessions(&self, sale_id: &str) -> ApiResult<usize> {
        let payments = self.state.db.payments();
        let mut closed = 0;

        for mut session in payments.card_sessions_for_sale(sale_id).await? {
            if session.status.is_terminal() {
                continue;
            }
            if session.status == CardSessionStatus::Authorized {
                self.state.card_gateway.release(&session).await?;
            }
            card_transition(session.status, CardSessionStatus::Cancelled)?;
            session.status = CardSessionStatus::Cancelled;
            session.updated_at = Utc::now();
            payments.update_card_session(&session).await?;
            closed += 1;
        }

        for mut session in payments.wallet_sessions_for_sale(sale_id).await? {
            if session.status != WalletSessionStatus::Pending {
                continue;
            }
            session.status = WalletSessionStatus::Cancelled;
            session.updated_at = Utc::now();
            payments.update_wallet_session(&session).await?;
            closed += 1;
        }

        if closed > 0 {
            info!(sale_id = %sale_id, closed, "Open payment sessions cancelled");
        }
        Ok(closed)
    }

    async fn wallet_session(&self, id: &str) -> ApiResult<MobilePaymentSession> {
        self.state
            .db
            .payments()
            .get_wallet_session(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Wallet session", id))
    }

    async fn expire_wallet(&self, mut session: MobilePaymentSession) -> ApiResult<MobilePaymentSession> {
        if session.status == WalletSessionStatus::Pending
            && is_expired(session.expires_at, Utc::now())
        {
            session.status = WalletSessionStatus::Expired;
            session.updated_at = Utc::now();
            self.state.db.payments().update_wallet_session(&session).await?;
            debug!(id = %session.id, "Wallet session expired");
        }
        Ok(session)
    }

    async fn live_wallet_session(&self, id: &str) -> ApiResult<MobilePaymentSession> {
        let session = self.expire_wallet(self.wallet_session(id).await?).await?;
        if session.status == WalletSessionStatus::Expired {
            return Err(CoreError::SessionExpired {
                entity: "Wallet session".to_string(),
                id: session.id,
            }
            .into());
        }
        Ok(session)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub async fn refund(&self, txn_id: &str, request: RefundRequest) -> ApiResult<RefundResponse> {
        validate_optional_text("reason", request.reason.as_deref(), 500)?;

        let txn = self
            .state
            .db
            .payments()
            .get_transaction(txn_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Payment", txn_id))?;

        let amount = match request.amount_cents {
            Some(cents) => {
                validate_payment_amount(cents)?;
                Money::from_cents(cents)
            }
            None => txn.refundable(),
        };
        let plan = plan_refund(&txn, amount)?;

        let gateway_reference = match txn.method {
            PaymentMethod::Cash => None,
            PaymentMethod::Card => Some(self.state.card_gateway.refund(&txn, amount).await?),
            PaymentMethod::MobileWallet => Some(self.state.wallet_gateway.refund(&txn, amount).await?),
        };

        let (updated, sale_refunded) = self
            .state
            .db
            .payments()
            .apply_refund(txn_id, &plan, txn.refunded_cents)
            .await?;

        info!(
            txn_id = %txn_id,
            amount_cents = amount.cents(),
            reason = ?request.reason,
            gateway_reference = ?gateway_reference,
            sale_refunded,
            "Payment refunded"
        );

        Ok(RefundResponse {
            transaction: updated,
            refunded_cents: amount.cents(),
            gateway_reference,
            sale_refunded,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn sale(&self, sale_id: &str) -> ApiResult<Sale> {
        self.state
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", sale_id))
    }

    /// An open sale and what is still owed on it.
    async fn open_sale_balance(&self, sale_id: &str) -> ApiResult<(Sale, Money)> {
        let sale = self.sale(sale_id).await?;
        if sale.status != SaleStatus::Open {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id,
                current_status: sale.status.as_str().to_string(),
            }
            .into());
        }
        let transactions = self.state.db.payments().transactions_for_sale(sale_id).await?;
        let summary = payment_summary(sale.total(), &transactions);
        Ok((sale, summary.balance_due))
    }

    /// Fails unless the sale is open and still owes at least `amount_cents`.
    async fn ensure_payable(&self, sale_id: &str, amount_cents: i64) -> ApiResult<()> {
        let (_, balance_due) = self.open_sale_balance(sale_id).await?;
        ensure_within_balance(Money::from_cents(amount_cents), balance_due)?;
        Ok(())
    }

    fn requested_amount(&self, requested: Option<i64>, balance_due: Money) -> ApiResult<Money> {
        let amount = match requested {
            Some(cents) => {
                validate_payment_amount(cents)?;
                Money::from_cents(cents)
            }
            None => balance_due,
        };
        ensure_within_balance(amount, balance_due)?;
        Ok(amount)
    }
}

fn transaction(
    sale_id: &str,
    method: PaymentMethod,
    amount: Money,
    status: PaymentStatus,
) -> PaymentTransaction {
    let now = Utc::now();
    PaymentTransaction {
        id: new_id(),
        sale_id: sale_id.to_string(),
        method,
        provider: None,
        amount_cents: amount.cents(),
        tendered_cents: None,
        change_cents: None,
        refunded_cents: 0,
        status,
        gateway_reference: None,
        session_id: None,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bistro_core::{OrderType, Product};
    use bistro_db::{Database, DbConfig};

    use super::*;
    use crate::config::ApiConfig;
    use crate::error::ErrorCode;
    use crate::services::gateway::{
        CardAuthorization, CardGateway, SimulatedCardGateway, TOKEN_DECLINE,
        TOKEN_INSUFFICIENT_FUNDS, WALLET_REJECT_CODE,
    };
    use crate::services::sale_service::{
        CreateSaleRequest, SaleLineRequest, SaleService, VoidSaleRequest,
    };

    /// Simulated card gateway that remembers which calls reached it.
    #[derive(Clone, Default)]
    struct RecordingCardGateway {
        inner: SimulatedCardGateway,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingCardGateway {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CardGateway for RecordingCardGateway {
        async fn authorize(
            &self,
            session: &CardSession,
            card: &CardDetails,
        ) -> Result<CardAuthorization, GatewayError> {
            self.push("authorize");
            self.inner.authorize(session, card).await
        }

        async fn capture(&self, session: &CardSession) -> Result<String, GatewayError> {
            self.push("capture");
            self.inner.capture(session).await
        }

        async fn release(&self, session: &CardSession) -> Result<(), GatewayError> {
            self.push("release");
            self.inner.release(session).await
        }

        async fn refund(
            &self,
            payment: &PaymentTransaction,
            amount: Money,
        ) -> Result<String, GatewayError> {
            self.push("refund");
            self.inner.refund(payment, amount).await
        }
    }

    async fn state_with(config: ApiConfig) -> (AppState, RecordingCardGateway) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut state = AppState::new(db, config);
        let card = RecordingCardGateway::default();
        state.card_gateway = Arc::new(card.clone());
        (state, card)
    }

    async fn state() -> (AppState, RecordingCardGateway) {
        state_with(ApiConfig::default()).await
    }

    /// Takeaway sale of one 1,000.00 dish: 1,180.00 with VAT.
    async fn open_sale(state: &AppState) -> Sale {
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku: format!("DEV-{}", &new_id()[..6]),
            name: "Devilled Chicken".into(),
            description: None,
            category_id: None,
            price_cents: 1_000_00,
            cost_cents: None,
            vat_applicable: true,
            is_available: true,
            track_inventory: false,
            is_active: true,
            created_at: now,
            updated_at: now,
            sync_version: 1,
        };
        state.db.products().insert(&product).await.unwrap();

        let detail = SaleService::new(state)
            .create(CreateSaleRequest {
                order_type: OrderType::Takeaway,
                table_number: None,
                customer_name: None,
                cashier: "Nimal".into(),
                items: vec![SaleLineRequest {
                    product_id: product.id,
                    quantity: 1,
                    notes: None,
                }],
                discount_cents: 0,
                device_id: None,
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(detail.sale.total_cents, 1_180_00);
        detail.sale
    }

    fn card(token: &str) -> ConfirmCardRequest {
        ConfirmCardRequest {
            payment_token: token.into(),
            card_number: None,
        }
    }

    fn wallet(provider: &str) -> CreateWalletSessionRequest {
        CreateWalletSessionRequest {
            provider: provider.into(),
            amount_cents: None,
            payer_phone: Some("0771234567".into()),
        }
    }

    async fn sale_status(state: &AppState, id: &str) -> SaleStatus {
        state.db.sales().get_by_id(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_declined_tokens_fail_session_and_keep_attempt() {
        let (state, _) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        for token in [TOKEN_DECLINE, TOKEN_INSUFFICIENT_FUNDS] {
            let session = service
                .create_card_session(&sale.id, CreateCardSessionRequest::default())
                .await
                .unwrap();
            let err = service.confirm_card_session(&session.id, card(token)).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::PaymentDeclined);

            let stored = service.get_card_session(&session.id).await.unwrap();
            assert_eq!(stored.status, CardSessionStatus::Failed);
            assert!(stored.failure_reason.is_some());
        }

        let payments = service.sale_payments(&sale.id).await.unwrap();
        assert_eq!(payments.transactions.len(), 2);
        assert!(payments
            .transactions
            .iter()
            .all(|t| t.status == PaymentStatus::Failed && t.method == PaymentMethod::Card));
        assert_eq!(payments.summary.balance_due.cents(), 1_180_00);
        assert_eq!(sale_status(&state, &sale.id).await, SaleStatus::Open);
    }

    #[tokio::test]
    async fn test_card_capture_of_full_total_completes_sale() {
        let (state, gateway) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let session = service
            .create_card_session(&sale.id, CreateCardSessionRequest::default())
            .await
            .unwrap();
        let authorized = service.confirm_card_session(&session.id, card("tok_visa")).await.unwrap();
        assert_eq!(authorized.status, CardSessionStatus::Authorized);
        assert_eq!(authorized.card_brand.as_deref(), Some("visa"));

        let recorded = service.capture_card_session(&session.id).await.unwrap();
        assert!(recorded.sale_completed);
        assert_eq!(recorded.transaction.session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(sale_status(&state, &sale.id).await, SaleStatus::Completed);
        assert_eq!(
            service.get_card_session(&session.id).await.unwrap().status,
            CardSessionStatus::Captured
        );
        assert_eq!(gateway.calls(), vec!["authorize", "capture"]);
    }

    #[tokio::test]
    async fn test_capture_on_settled_sale_never_reaches_gateway() {
        let (state, gateway) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let session = service
            .create_card_session(&sale.id, CreateCardSessionRequest::default())
            .await
            .unwrap();
        service.confirm_card_session(&session.id, card("tok_visa")).await.unwrap();

        // Customer pays cash instead while the card hold is still open
        service
            .pay_cash(
                &sale.id,
                CashPaymentRequest {
                    amount_cents: None,
                    tendered_cents: 1_200_00,
                },
            )
            .await
            .unwrap();
        assert_eq!(sale_status(&state, &sale.id).await, SaleStatus::Completed);

        let err = service.capture_card_session(&session.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
        assert!(!gateway.calls().contains(&"capture"));
        assert_eq!(
            service.get_card_session(&session.id).await.unwrap().status,
            CardSessionStatus::Authorized
        );

        // The hold can still be released
        let cancelled = service.cancel_card_session(&session.id).await.unwrap();
        assert_eq!(cancelled.status, CardSessionStatus::Cancelled);
        assert_eq!(gateway.calls(), vec!["authorize", "release"]);
    }

    #[tokio::test]
    async fn test_void_releases_open_sessions() {
        let (state, gateway) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let held = service
            .create_card_session(
                &sale.id,
                CreateCardSessionRequest {
                    amount_cents: Some(500_00),
                },
            )
            .await
            .unwrap();
        service.confirm_card_session(&held.id, card("tok_visa")).await.unwrap();
        let fresh = service
            .create_card_session(&sale.id, CreateCardSessionRequest::default())
            .await
            .unwrap();
        let pending = service.create_wallet_session(&sale.id, wallet("ez_cash")).await.unwrap();

        let voided = SaleService::new(&state)
            .void(
                &sale.id,
                VoidSaleRequest {
                    voided_by: "manager".into(),
                    reason: Some("walked out".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);

        for id in [&held.id, &fresh.id] {
            assert_eq!(
                service.get_card_session(id).await.unwrap().status,
                CardSessionStatus::Cancelled
            );
        }
        assert_eq!(
            service.wallet_status(&pending.id).await.unwrap().status,
            WalletSessionStatus::Cancelled
        );
        assert_eq!(gateway.calls(), vec!["authorize", "release"]);

        assert!(service.capture_card_session(&held.id).await.is_err());
        assert!(!gateway.calls().contains(&"capture"));
    }

    #[tokio::test]
    async fn test_wallet_rejection_then_approval() {
        let (state, _) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let rejected = service.create_wallet_session(&sale.id, wallet("ez_cash")).await.unwrap();
        assert_eq!(rejected.status, WalletSessionStatus::Pending);
        let err = service
            .confirm_wallet_session(
                &rejected.id,
                ConfirmWalletRequest {
                    approval_code: Some(WALLET_REJECT_CODE.into()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentDeclined);
        assert_eq!(
            service.wallet_status(&rejected.id).await.unwrap().status,
            WalletSessionStatus::Failed
        );

        let session = service.create_wallet_session(&sale.id, wallet("ez_cash")).await.unwrap();
        let recorded = service
            .confirm_wallet_session(&session.id, ConfirmWalletRequest::default())
            .await
            .unwrap();
        assert!(recorded.sale_completed);
        assert_eq!(recorded.transaction.provider.as_deref(), Some("ez_cash"));
        assert_eq!(sale_status(&state, &sale.id).await, SaleStatus::Completed);
    }

    #[tokio::test]
    async fn test_sessions_past_ttl_expire() {
        let mut config = ApiConfig::default();
        config.payments.card_session_ttl_minutes = 0;
        config.payments.wallet_session_ttl_minutes = 0;
        let (state, gateway) = state_with(config).await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let session = service
            .create_card_session(&sale.id, CreateCardSessionRequest::default())
            .await
            .unwrap();
        let err = service.confirm_card_session(&session.id, card("tok_visa")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentError);
        assert_eq!(
            service.get_card_session(&session.id).await.unwrap().status,
            CardSessionStatus::Expired
        );
        assert!(gateway.calls().is_empty());

        let wallet_session = service.create_wallet_session(&sale.id, wallet("ez_cash")).await.unwrap();
        let err = service
            .confirm_wallet_session(&wallet_session.id, ConfirmWalletRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentError);
        assert_eq!(
            service.wallet_status(&wallet_session.id).await.unwrap().status,
            WalletSessionStatus::Expired
        );
        assert_eq!(sale_status(&state, &sale.id).await, SaleStatus::Open);
    }

    #[tokio::test]
    async fn test_card_refund_goes_through_gateway() {
        let (state, gateway) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let session = service
            .create_card_session(&sale.id, CreateCardSessionRequest::default())
            .await
            .unwrap();
        service.confirm_card_session(&session.id, card("tok_visa")).await.unwrap();
        let captured = service.capture_card_session(&session.id).await.unwrap();

        let refund = service
            .refund(
                &captured.transaction.id,
                RefundRequest {
                    amount_cents: Some(180_00),
                    reason: Some("cold dish".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(refund.refunded_cents, 180_00);
        assert!(refund.gateway_reference.is_some());
        assert_eq!(refund.transaction.status, PaymentStatus::PartiallyRefunded);
        assert!(!refund.sale_refunded);
        assert_eq!(gateway.calls(), vec!["authorize", "capture", "refund"]);
    }

    #[tokio::test]
    async fn test_cash_refund_has_no_gateway_reference() {
        let (state, gateway) = state().await;
        let sale = open_sale(&state).await;
        let service = PaymentService::new(&state);

        let paid = service
            .pay_cash(
                &sale.id,
                CashPaymentRequest {
                    amount_cents: None,
                    tendered_cents: 1_180_00,
                },
            )
            .await
            .unwrap();
        let refund = service
            .refund(&paid.recorded.transaction.id, RefundRequest::default())
            .await
            .unwrap();
        assert_eq!(refund.refunded_cents, 1_180_00);
        assert!(refund.gateway_reference.is_none());
        assert!(refund.sale_refunded);
        assert!(gateway.calls().is_empty());
    }
}
