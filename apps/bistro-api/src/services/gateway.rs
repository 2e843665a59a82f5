//! # Payment Gateways
//!
//! Card acquirer and mobile-wallet provider behind traits, with simulated
//! implementations. No request leaves the process.
//!
//! ## Test Tokens
//! | token                    | authorize result            |
//! |--------------------------|-----------------------------|
//! | `tok_decline`            | declined                    |
//! | `tok_insufficient_funds` | declined, insufficient funds|
//! | anything else            | authorized                  |
//!
//! With `decline_all` set every authorization is declined.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bistro_core::payment::{detect_card_brand, mask_card_number};
use bistro_core::{CardSession, MobilePaymentSession, Money, PaymentTransaction};

pub const TOKEN_DECLINE: &str = "tok_decline";
pub const TOKEN_INSUFFICIENT_FUNDS: &str = "tok_insufficient_funds";

/// Approval code a simulated wallet treats as the customer rejecting the
/// request on their phone.
pub const WALLET_REJECT_CODE: &str = "reject";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Card declined: {0}")]
    Declined(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Payment rejected by {provider}: {reason}")]
    Rejected { provider: String, reason: String },

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// What the cashier's card terminal hands over when confirming a session.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub payment_token: String,
    /// Full card number. Only its brand and last four digits are kept.
    pub card_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardAuthorization {
    pub reference: String,
    pub card_brand: String,
    pub card_last4: String,
}

#[async_trait]
pub trait CardGateway: Send + Sync {
    async fn authorize(
        &self,
        session: &CardSession,
        card: &CardDetails,
    ) -> Result<CardAuthorization, GatewayError>;

    /// Captures a previously authorized session. Returns the capture reference.
    async fn capture(&self, session: &CardSession) -> Result<String, GatewayError>;

    /// Releases an authorization.
    async fn release(&self, session: &CardSession) -> Result<(), GatewayError>;

    /// Returns `amount` of a captured card payment. Returns the refund reference.
    async fn refund(&self, payment: &PaymentTransaction, amount: Money) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    /// Pushes a payment request to the provider. Returns its reference.
    async fn request_payment(&self, session: &MobilePaymentSession) -> Result<String, GatewayError>;

    /// Confirms the customer approved the request.
    async fn confirm(
        &self,
        session: &MobilePaymentSession,
        approval_code: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Sends `amount` of a completed wallet payment back to the payer.
    async fn refund(&self, payment: &PaymentTransaction, amount: Money) -> Result<String, GatewayError>;
}

fn reference(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

// =============================================================================
// Simulated Card Gateway
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SimulatedCardGateway {
    decline_all: bool,
}

impl SimulatedCardGateway {
    pub fn new(decline_all: bool) -> Self {
        SimulatedCardGateway { decline_all }
    }
}

#[async_trait]
impl CardGateway for SimulatedCardGateway {
    async fn authorize(
        &self,
        session: &CardSession,
        card: &CardDetails,
    ) -> Result<CardAuthorization, GatewayError> {
        debug!(session_id = %session.id, amount_cents = session.amount_cents, "Simulated card authorize");

        if self.decline_all {
            warn!(session_id = %session.id, "Card gateway set to decline all");
            return Err(GatewayError::Declined("do not honour".to_string()));
        }
        match card.payment_token.as_str() {
            TOKEN_DECLINE => return Err(GatewayError::Declined("generic decline".to_string())),
            TOKEN_INSUFFICIENT_FUNDS => return Err(GatewayError::InsufficientFunds),
            _ => {}
        }

        let (card_brand, card_last4) = match &card.card_number {
            Some(number) => (
                detect_card_brand(number).to_string(),
                mask_card_number(number),
            ),
            None => {
                let brand = card
                    .payment_token
                    .strip_prefix("tok_")
                    .filter(|b| !b.is_empty())
                    .unwrap_or("unknown");
                (brand.to_string(), "4242".to_string())
            }
        };

        Ok(CardAuthorization {
            reference: reference("auth"),
            card_brand,
            card_last4,
        })
    }

    async fn capture(&self, session: &CardSession) -> Result<String, GatewayError> {
        let reference = reference("ch");
        info!(session_id = %session.id, reference = %reference, "Simulated card capture");
        Ok(reference)
    }

    async fn release(&self, session: &CardSession) -> Result<(), GatewayError> {
        debug!(session_id = %session.id, "Simulated authorization release");
        Ok(())
    }

    async fn refund(&self, payment: &PaymentTransaction, amount: Money) -> Result<String, GatewayError> {
        let reference = reference("re");
        info!(
            payment_id = %payment.id,
            charge = ?payment.gateway_reference,
            amount_cents = amount.cents(),
            reference = %reference,
            "Simulated card refund"
        );
        Ok(reference)
    }
}

// =============================================================================
// Simulated Wallet Gateway
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SimulatedWalletGateway {
    decline_all: bool,
}

impl SimulatedWalletGateway {
    pub fn new(decline_all: bool) -> Self {
        SimulatedWalletGateway { decline_all }
    }
}

#[async_trait]
impl WalletGateway for SimulatedWalletGateway {
    async fn request_payment(&self, session: &MobilePaymentSession) -> Result<String, GatewayError> {
        debug!(
            session_id = %session.id,
            provider = %session.provider,
            amount_cents = session.amount_cents,
            "Simulated wallet payment request"
        );
        Ok(reference(&session.provider))
    }

    async fn confirm(
        &self,
        session: &MobilePaymentSession,
        approval_code: Option<&str>,
    ) -> Result<(), GatewayError> {
        if self.decline_all {
            return Err(GatewayError::Rejected {
                provider: session.provider.clone(),
                reason: "provider declined".to_string(),
            });
        }
        if approval_code == Some(WALLET_REJECT_CODE) {
            return Err(GatewayError::Rejected {
                provider: session.provider.clone(),
                reason: "customer rejected the request".to_string(),
            });
        }
        Ok(())
    }

    async fn refund(&self, payment: &PaymentTransaction, amount: Money) -> Result<String, GatewayError> {
        let provider = payment.provider.as_deref().unwrap_or("wallet");
        let reference = reference(&format!("{provider}_re"));
        info!(
            payment_id = %payment.id,
            provider = %provider,
            amount_cents = amount.cents(),
            reference = %reference,
            "Simulated wallet refund"
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bistro_core::{CardSessionStatus, PaymentMethod, PaymentStatus, WalletSessionStatus};
    use chrono::Utc;

    fn card_session() -> CardSession {
        let now = Utc::now();
        CardSession {
            id: "cs-1".into(),
            sale_id: "s-1".into(),
            amount_cents: 1_500_00,
            status: CardSessionStatus::Created,
            client_secret: "secret".into(),
            card_brand: None,
            card_last4: None,
            gateway_reference: None,
            failure_reason: None,
            expires_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn details(token: &str, number: Option<&str>) -> CardDetails {
        CardDetails {
            payment_token: token.into(),
            card_number: number.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_authorize_keeps_only_last_four() {
        let gw = SimulatedCardGateway::new(false);
        let auth = gw
            .authorize(&card_session(), &details("tok_card", Some("5555 5555 5555 4444")))
            .await
            .unwrap();
        assert_eq!(auth.card_brand, "mastercard");
        assert_eq!(auth.card_last4, "4444");
        assert!(auth.reference.starts_with("auth_"));
    }

    #[tokio::test]
    async fn test_test_tokens() {
        let gw = SimulatedCardGateway::new(false);
        let s = card_session();
        assert!(matches!(
            gw.authorize(&s, &details(TOKEN_DECLINE, None)).await,
            Err(GatewayError::Declined(_))
        ));
        assert!(matches!(
            gw.authorize(&s, &details(TOKEN_INSUFFICIENT_FUNDS, None)).await,
            Err(GatewayError::InsufficientFunds)
        ));

        let auth = gw.authorize(&s, &details("tok_visa", None)).await.unwrap();
        assert_eq!(auth.card_brand, "visa");
    }

    #[tokio::test]
    async fn test_decline_all() {
        let gw = SimulatedCardGateway::new(true);
        assert!(gw
            .authorize(&card_session(), &details("tok_visa", None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_wallet_rejection() {
        let now = Utc::now();
        let session = MobilePaymentSession {
            id: "ws-1".into(),
            sale_id: "s-1".into(),
            provider: "frimi".into(),
            amount_cents: 500_00,
            fee_cents: 0,
            payer_phone: None,
            qr_payload: String::new(),
            status: WalletSessionStatus::Pending,
            provider_reference: None,
            failure_reason: None,
            expires_at: now,
            created_at: now,
            updated_at: now,
        };

        let gw = SimulatedWalletGateway::new(false);
        assert!(gw.request_payment(&session).await.unwrap().starts_with("frimi_"));
        assert!(gw.confirm(&session, Some("123456")).await.is_ok());
        assert!(gw.confirm(&session, Some(WALLET_REJECT_CODE)).await.is_err());
        assert!(SimulatedWalletGateway::new(true)
            .confirm(&session, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_refund_references() {
        let now = Utc::now();
        let payment = PaymentTransaction {
            id: "t-1".into(),
            sale_id: "s-1".into(),
            method: PaymentMethod::MobileWallet,
            provider: Some("ez_cash".into()),
            amount_cents: 500_00,
            tendered_cents: None,
            change_cents: None,
            refunded_cents: 0,
            status: PaymentStatus::Completed,
            gateway_reference: Some("ez_cash_abc".into()),
            session_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let wallet = SimulatedWalletGateway::new(false)
            .refund(&payment, Money::from_cents(200_00))
            .await
            .unwrap();
        assert!(wallet.starts_with("ez_cash_re_"));

        let card = SimulatedCardGateway::new(false)
            .refund(&payment, Money::from_cents(200_00))
            .await
            .unwrap();
        assert!(card.starts_with("re_"));
    }
}
