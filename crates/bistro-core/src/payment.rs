//! # Payment Rules
//!
//! Cash settlement, card and wallet session state machines, refunds and the
//! per-sale payment summary. Gateways are called from the API layer; this
//! module only decides what is allowed.
//!
//! ## Card Session
//! ```text
//!   Created ──confirm──► Authorized ──capture──► Captured
//!      │                     │
//!      ├──decline──► Failed ◄┘ (capture declined)
//!      ├──cancel───► Cancelled ◄── cancel ──┘
//!      └──TTL──────► Expired   ◄── TTL ─────┘
//! ```
//!
//! ## Wallet Session
//! ```text
//!   Pending ──► Completed | Failed | Expired | Cancelled
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CardSessionStatus, PaymentStatus, PaymentTransaction, WalletSessionStatus};

/// Card sessions not confirmed within this window expire.
pub const CARD_SESSION_TTL_MINUTES: i64 = 15;

/// Wallet approvals not received within this window expire.
pub const WALLET_SESSION_TTL_MINUTES: i64 = 10;

// =============================================================================
// Cash
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashSettlement {
    pub amount_due: Money,
    pub tendered: Money,
    pub change: Money,
}

/// Settles a cash payment of `amount_due` with `tendered` notes.
///
/// ```rust
/// use bistro_core::money::Money;
/// use bistro_core::payment::settle_cash;
///
/// let s = settle_cash(Money::from_cents(311_520), Money::from_cents(320_000)).unwrap();
/// assert_eq!(s.change.cents(), 8_480);
/// ```
pub fn settle_cash(amount_due: Money, tendered: Money) -> CoreResult<CashSettlement> {
    if !amount_due.is_positive() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount due must be positive".to_string(),
        });
    }
    if tendered < amount_due {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("tendered {tendered} is less than amount due {amount_due}"),
        });
    }
    Ok(CashSettlement {
        amount_due,
        tendered,
        change: tendered - amount_due,
    })
}

/// Rejects payments larger than what is still owed on the sale.
pub fn ensure_within_balance(amount: Money, balance_due: Money) -> CoreResult<()> {
    if !amount.is_positive() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "amount must be positive".to_string(),
        });
    }
    if !balance_due.is_positive() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "sale is already fully paid".to_string(),
        });
    }
    if amount > balance_due {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("amount {amount} exceeds balance due {balance_due}"),
        });
    }
    Ok(())
}

// =============================================================================
// Sessions
// =============================================================================

/// Saturates at the latest representable instant.
pub fn session_expiry(now: DateTime<Utc>, ttl_minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[inline]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Checks a card session transition.
pub fn card_transition(from: CardSessionStatus, to: CardSessionStatus) -> CoreResult<()> {
    use CardSessionStatus::*;

    let allowed = matches!(
        (from, to),
        (Created, Authorized)
            | (Created, Failed)
            | (Created, Cancelled)
            | (Created, Expired)
            | (Authorized, Captured)
            | (Authorized, Failed)
            | (Authorized, Cancelled)
            | (Authorized, Expired)
    );

    if allowed {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "card session".to_string(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// Checks a wallet session transition. Only `Pending` sessions move.
pub fn wallet_transition(from: WalletSessionStatus, to: WalletSessionStatus) -> CoreResult<()> {
    if from == WalletSessionStatus::Pending && to != WalletSessionStatus::Pending {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "wallet session".to_string(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

// =============================================================================
// Cards
// =============================================================================

/// Card scheme from the issuer identification number.
pub fn detect_card_brand(number: &str) -> &'static str {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let prefix = |n: usize| -> u32 {
        digits
            .get(..n.min(digits.len()))
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    };

    if digits.starts_with('4') {
        "visa"
    } else if (51..=55).contains(&prefix(2)) || (2221..=2720).contains(&prefix(4)) {
        "mastercard"
    } else if matches!(prefix(2), 34 | 37) {
        "amex"
    } else if prefix(2) == 62 {
        "unionpay"
    } else if prefix(4) == 6011 || prefix(2) == 65 || (644..=649).contains(&prefix(3)) {
        "discover"
    } else {
        "unknown"
    }
}

/// Last four digits; the only part of a card number that is ever stored.
pub fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}

// =============================================================================
// Mobile Wallets
// =============================================================================

/// A mobile wallet / QR scheme accepted at the till.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletProvider {
    pub code: &'static str,
    pub name: &'static str,
    pub min_amount_cents: i64,
    pub max_amount_cents: i64,
    /// Merchant fee in basis points.
    pub fee_bps: u32,
    /// Customer scans a merchant QR instead of approving a push request.
    pub qr_based: bool,
    /// A payer mobile number is needed to send the push request.
    pub requires_phone: bool,
}

pub const WALLET_PROVIDERS: [WalletProvider; 6] = [
    WalletProvider {
        code: "ez_cash",
        name: "eZ Cash",
        min_amount_cents: 1_000,
        max_amount_cents: 10_000_000,
        fee_bps: 100,
        qr_based: false,
        requires_phone: true,
    },
    WalletProvider {
        code: "m_cash",
        name: "mCash",
        min_amount_cents: 1_000,
        max_amount_cents: 5_000_000,
        fee_bps: 100,
        qr_based: false,
        requires_phone: true,
    },
    WalletProvider {
        code: "frimi",
        name: "FriMi",
        min_amount_cents: 1_000,
        max_amount_cents: 20_000_000,
        fee_bps: 50,
        qr_based: true,
        requires_phone: false,
    },
    WalletProvider {
        code: "genie",
        name: "Genie",
        min_amount_cents: 1_000,
        max_amount_cents: 10_000_000,
        fee_bps: 150,
        qr_based: true,
        requires_phone: false,
    },
    WalletProvider {
        code: "lanka_qr",
        name: "LANKAQR",
        min_amount_cents: 100,
        max_amount_cents: 50_000_000,
        fee_bps: 50,
        qr_based: true,
        requires_phone: false,
    },
    WalletProvider {
        code: "payhere",
        name: "PayHere",
        min_amount_cents: 1_000,
        max_amount_cents: 50_000_000,
        fee_bps: 300,
        qr_based: false,
        requires_phone: false,
    },
];

pub fn find_wallet_provider(code: &str) -> CoreResult<&'static WalletProvider> {
    let code = code.trim().to_lowercase();
    WALLET_PROVIDERS
        .iter()
        .find(|p| p.code == code)
        .ok_or(CoreError::UnknownWalletProvider(code))
}

impl WalletProvider {
    /// Checks the amount against the provider's per-transaction limits.
    pub fn check_amount(&self, amount: Money) -> CoreResult<()> {
        let cents = amount.cents();
        if cents < self.min_amount_cents || cents > self.max_amount_cents {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!(
                    "{} accepts {} to {}",
                    self.name,
                    Money::from_cents(self.min_amount_cents),
                    Money::from_cents(self.max_amount_cents)
                ),
            });
        }
        Ok(())
    }

    pub fn fee(&self, amount: Money) -> Money {
        amount.percentage(self.fee_bps)
    }
}

/// Payload encoded into the QR shown to the customer.
pub fn qr_payload(provider: &str, session_id: &str, amount: Money, reference: &str) -> String {
    format!(
        "BISTRO|{}|{}|{}|{}",
        provider,
        session_id,
        amount.cents(),
        reference
    )
}

// =============================================================================
// Refunds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPlan {
    pub amount: Money,
    pub refunded_total: Money,
    pub status: PaymentStatus,
}

/// Works out the effect of refunding `amount` from a captured transaction.
pub fn plan_refund(txn: &PaymentTransaction, amount: Money) -> CoreResult<RefundPlan> {
    if !txn.status.is_captured() {
        return Err(CoreError::InvalidTransition {
            entity: "payment".to_string(),
            from: txn.status.as_str().to_string(),
            to: PaymentStatus::Refunded.as_str().to_string(),
        });
    }
    if !amount.is_positive() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "refund amount must be positive".to_string(),
        });
    }

    let refundable = txn.refundable();
    if amount > refundable {
        return Err(CoreError::RefundExceedsCaptured {
            requested: amount.cents(),
            refundable: refundable.cents(),
        });
    }

    let refunded_total = Money::from_cents(txn.refunded_cents) + amount;
    let status = if refunded_total == txn.amount() {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    };

    Ok(RefundPlan {
        amount,
        refunded_total,
        status,
    })
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentSummary {
    pub total: Money,
    /// Captured amounts, before refunds.
    pub captured: Money,
    pub refunded: Money,
    /// `captured - refunded`.
    pub paid: Money,
    pub balance_due: Money,
    pub is_fully_paid: bool,
}

/// Sums the transactions recorded against a sale.
pub fn payment_summary(total: Money, transactions: &[PaymentTransaction]) -> PaymentSummary {
    let captured_txns = transactions.iter().filter(|t| t.status.is_captured());
    let captured: Money = captured_txns.clone().map(|t| t.amount()).sum();
    let refunded: Money = captured_txns
        .map(|t| Money::from_cents(t.refunded_cents))
        .sum();
    let paid = captured - refunded;
    let balance_due = if captured >= total {
        Money::zero()
    } else {
        total - captured
    };

    PaymentSummary {
        total,
        captured,
        refunded,
        paid,
        balance_due,
        is_fully_paid: captured >= total && total.is_positive(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;

    fn txn(amount: i64, refunded: i64, status: PaymentStatus) -> PaymentTransaction {
        let now = Utc::now();
        PaymentTransaction {
            id: "t".into(),
            sale_id: "s".into(),
            method: PaymentMethod::Card,
            provider: Some("visa".into()),
            amount_cents: amount,
            tendered_cents: None,
            change_cents: None,
            refunded_cents: refunded,
            status,
            gateway_reference: None,
            session_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_settle_cash() {
        let s = settle_cash(Money::from_cents(1_000), Money::from_cents(5_000)).unwrap();
        assert_eq!(s.change.cents(), 4_000);

        let exact = settle_cash(Money::from_cents(1_000), Money::from_cents(1_000)).unwrap();
        assert!(exact.change.is_zero());

        assert!(settle_cash(Money::from_cents(1_000), Money::from_cents(999)).is_err());
        assert!(settle_cash(Money::zero(), Money::from_cents(100)).is_err());
    }

    #[test]
    fn test_ensure_within_balance() {
        assert!(ensure_within_balance(Money::from_cents(500), Money::from_cents(1_000)).is_ok());
        assert!(ensure_within_balance(Money::from_cents(1_500), Money::from_cents(1_000)).is_err());
        assert!(ensure_within_balance(Money::from_cents(100), Money::zero()).is_err());
    }

    #[test]
    fn test_card_transitions() {
        use CardSessionStatus::*;
        assert!(card_transition(Created, Authorized).is_ok());
        assert!(card_transition(Authorized, Captured).is_ok());
        assert!(card_transition(Created, Captured).is_err());
        assert!(card_transition(Captured, Cancelled).is_err());
        assert!(card_transition(Failed, Authorized).is_err());
        assert!(card_transition(Expired, Authorized).is_err());
    }

    #[test]
    fn test_wallet_transitions() {
        use WalletSessionStatus::*;
        assert!(wallet_transition(Pending, Completed).is_ok());
        assert!(wallet_transition(Pending, Expired).is_ok());
        assert!(wallet_transition(Completed, Failed).is_err());
        assert!(wallet_transition(Pending, Pending).is_err());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let expires = session_expiry(now, CARD_SESSION_TTL_MINUTES);
        assert!(!is_expired(expires, now));
        assert!(is_expired(expires, now + Duration::minutes(15)));

        assert_eq!(session_expiry(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_card_brand_and_mask() {
        assert_eq!(detect_card_brand("4242 4242 4242 4242"), "visa");
        assert_eq!(detect_card_brand("5555555555554444"), "mastercard");
        assert_eq!(detect_card_brand("2223003122003222"), "mastercard");
        assert_eq!(detect_card_brand("378282246310005"), "amex");
        assert_eq!(detect_card_brand("6200000000000005"), "unionpay");
        assert_eq!(detect_card_brand("6011111111111117"), "discover");
        assert_eq!(detect_card_brand("9999"), "unknown");

        assert_eq!(mask_card_number("4242 4242 4242 4242"), "4242");
        assert_eq!(mask_card_number("12"), "12");
    }

    #[test]
    fn test_wallet_catalog() {
        let ez = find_wallet_provider("EZ_CASH").unwrap();
        assert!(ez.requires_phone);
        assert!(ez.check_amount(Money::from_cents(500)).is_err());
        assert!(ez.check_amount(Money::from_cents(250_000)).is_ok());
        assert_eq!(ez.fee(Money::from_cents(100_000)).cents(), 1_000);

        assert!(find_wallet_provider("lanka_qr").unwrap().qr_based);
        assert!(matches!(
            find_wallet_provider("paypal"),
            Err(CoreError::UnknownWalletProvider(_))
        ));
    }

    #[test]
    fn test_qr_payload() {
        assert_eq!(
            qr_payload("frimi", "sess-1", Money::from_cents(12_500), "R-1"),
            "BISTRO|frimi|sess-1|12500|R-1"
        );
    }

    #[test]
    fn test_partial_then_full_refund() {
        let mut t = txn(10_000, 0, PaymentStatus::Completed);

        let plan = plan_refund(&t, Money::from_cents(4_000)).unwrap();
        assert_eq!(plan.status, PaymentStatus::PartiallyRefunded);
        t.refunded_cents = plan.refunded_total.cents();
        t.status = plan.status;

        assert!(matches!(
            plan_refund(&t, Money::from_cents(7_000)),
            Err(CoreError::RefundExceedsCaptured { refundable: 6_000, .. })
        ));

        let plan = plan_refund(&t, Money::from_cents(6_000)).unwrap();
        assert_eq!(plan.status, PaymentStatus::Refunded);
        assert_eq!(plan.refunded_total.cents(), 10_000);
    }

    #[test]
    fn test_refund_requires_captured() {
        let t = txn(10_000, 0, PaymentStatus::Failed);
        assert!(plan_refund(&t, Money::from_cents(100)).is_err());
    }

    #[test]
    fn test_payment_summary_split_tender() {
        let total = Money::from_cents(10_000);
        let txns = vec![
            txn(6_000, 0, PaymentStatus::Completed),
            txn(4_000, 0, PaymentStatus::Failed),
        ];
        let summary = payment_summary(total, &txns);
        assert_eq!(summary.balance_due.cents(), 4_000);
        assert!(!summary.is_fully_paid);

        let txns = vec![
            txn(6_000, 0, PaymentStatus::Completed),
            txn(4_000, 1_000, PaymentStatus::PartiallyRefunded),
        ];
        let summary = payment_summary(total, &txns);
        assert!(summary.is_fully_paid);
        assert_eq!(summary.refunded.cents(), 1_000);
        assert_eq!(summary.paid.cents(), 9_000);
    }
}
