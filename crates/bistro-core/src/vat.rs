//! # VAT Module
//!
//! Sri Lankan VAT presets and the bill computation every sale goes through.
//!
//! ## Bill Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines ──► subtotal ──► − discount ──► net                              │
//! │                          (prorated over                                 │
//! │                           taxable / exempt)                             │
//! │                                                                         │
//! │  net ──► service charge (dine-in only, on VAT-exclusive net)            │
//! │                                                                         │
//! │  EXCLUSIVE: VAT = (net_taxable + sc_taxable) × rate, added on top       │
//! │  INCLUSIVE: VAT = extracted from net_taxable                            │
//! │             (+ sc_taxable × rate added on top)                          │
//! │                                                                         │
//! │  total = net + service charge + VAT added on top                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `sc_taxable` is the share of the service charge attributable to
//! VAT-applicable lines, and is zero unless `vat_on_service_charge` is set.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{OrderType, TaxMode, TaxRate, VatSettings};
use crate::validation::validate_bps;

/// Default restaurant service charge (10%).
pub const DEFAULT_SERVICE_CHARGE_BPS: u32 = 1000;

// =============================================================================
// Presets
// =============================================================================

/// A named Sri Lankan tax rate the back office can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VatPreset {
    pub code: &'static str,
    pub name: &'static str,
    pub rate_bps: u32,
    pub description: &'static str,
}

/// Built-in presets.
pub const VAT_PRESETS: [VatPreset; 5] = [
    VatPreset {
        code: "standard",
        name: "Standard VAT",
        rate_bps: 1800,
        description: "Standard rate of Value Added Tax (18%)",
    },
    VatPreset {
        code: "zero_rated",
        name: "Zero Rated",
        rate_bps: 0,
        description: "Zero-rated supplies; VAT registered but charged at 0%",
    },
    VatPreset {
        code: "exempt",
        name: "Exempt",
        rate_bps: 0,
        description: "Exempt supplies; no VAT charged or shown",
    },
    VatPreset {
        code: "sscl",
        name: "Social Security Contribution Levy",
        rate_bps: 250,
        description: "SSCL charged on turnover (2.5%)",
    },
    VatPreset {
        code: "tourism_levy",
        name: "Tourism Development Levy",
        rate_bps: 100,
        description: "Levy for tourist-registered establishments (1%)",
    },
];

/// Looks up a preset by code.
pub fn find_preset(code: &str) -> Option<&'static VatPreset> {
    let code = code.trim().to_lowercase();
    VAT_PRESETS.iter().find(|p| p.code == code)
}

// =============================================================================
// Configuration
// =============================================================================

/// The VAT and service-charge rules a bill is computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatConfig {
    pub rate: TaxRate,
    pub mode: TaxMode,
    pub service_charge_bps: u32,
    pub vat_on_service_charge: bool,
}

impl VatConfig {
    /// Standard 18% exclusive VAT with the default 10% service charge.
    pub fn standard() -> Self {
        VatConfig {
            rate: TaxRate::from_bps(1800),
            mode: TaxMode::Exclusive,
            service_charge_bps: DEFAULT_SERVICE_CHARGE_BPS,
            vat_on_service_charge: true,
        }
    }

    /// No VAT, no service charge.
    pub fn none() -> Self {
        VatConfig {
            rate: TaxRate::zero(),
            mode: TaxMode::Exclusive,
            service_charge_bps: 0,
            vat_on_service_charge: false,
        }
    }

    /// Service charge only applies to dine-in orders.
    pub fn for_order(mut self, order_type: OrderType) -> Self {
        if order_type != OrderType::DineIn {
            self.service_charge_bps = 0;
        }
        self
    }
}

impl From<&VatSettings> for VatConfig {
    fn from(settings: &VatSettings) -> Self {
        VatConfig {
            rate: settings.tax_rate(),
            mode: settings.mode,
            service_charge_bps: settings.service_charge_rate(),
            vat_on_service_charge: settings.vat_on_service_charge,
        }
    }
}

/// Checks rates supplied for a new or updated settings row.
pub fn validate_settings(rate_bps: i64, service_charge_bps: i64) -> Result<(), ValidationError> {
    validate_bps("rate_bps", rate_bps)?;
    validate_bps("service_charge_bps", service_charge_bps)?;
    Ok(())
}

// =============================================================================
// Bill Computation
// =============================================================================

/// One priced line going into a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillLine {
    pub line_total: Money,
    pub vat_applicable: bool,
}

/// The computed bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillBreakdown {
    /// Sum of line totals as priced.
    pub subtotal: Money,
    pub discount: Money,
    /// `subtotal - discount`.
    pub net: Money,
    /// Part of `net` coming from VAT-exempt / zero-rated lines.
    pub exempt_amount: Money,
    pub service_charge: Money,
    /// Amount VAT was computed on (VAT-exclusive).
    pub taxable_base: Money,
    pub vat: Money,
    pub total: Money,
    pub vat_rate_bps: u32,
    pub mode: TaxMode,
}

/// Computes the bill for a set of lines.
///
/// ## Errors
/// - `discount` is negative or larger than the subtotal
///
/// ```rust
/// use bistro_core::money::Money;
/// use bistro_core::vat::{compute_bill, BillLine, VatConfig};
///
/// let lines = [BillLine { line_total: Money::from_cents(100_000), vat_applicable: true }];
/// let bill = compute_bill(&lines, Money::zero(), &VatConfig::standard()).unwrap();
/// assert_eq!(bill.service_charge.cents(), 10_000);
/// assert_eq!(bill.vat.cents(), 19_800);
/// assert_eq!(bill.total.cents(), 129_800);
/// ```
pub fn compute_bill(
    lines: &[BillLine],
    discount: Money,
    config: &VatConfig,
) -> CoreResult<BillBreakdown> {
    let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
    let taxable_gross: Money = lines
        .iter()
        .filter(|l| l.vat_applicable)
        .map(|l| l.line_total)
        .sum();

    if discount.is_negative() {
        return Err(ValidationError::invalid("discount", "must not be negative").into());
    }
    if discount > subtotal {
        return Err(ValidationError::invalid("discount", "exceeds the bill subtotal").into());
    }

    let taxable_discount = discount.prorate(taxable_gross, subtotal);
    let net = subtotal - discount;
    let net_taxable = taxable_gross - taxable_discount;
    let exempt_amount = net - net_taxable;

    let (item_vat, net_ex_vat_taxable) = match config.mode {
        TaxMode::Exclusive => (Money::zero(), net_taxable),
        TaxMode::Inclusive => {
            let vat = net_taxable.extract_inclusive_tax(config.rate);
            (vat, net_taxable - vat)
        }
    };

    let service_base = net_ex_vat_taxable + exempt_amount;
    let service_charge = service_base.percentage(config.service_charge_bps);

    let sc_taxable = if config.vat_on_service_charge {
        service_charge.prorate(net_ex_vat_taxable, service_base)
    } else {
        Money::zero()
    };

    let (vat, total) = match config.mode {
        TaxMode::Exclusive => {
            let vat = (net_taxable + sc_taxable).calculate_tax(config.rate);
            (vat, net + service_charge + vat)
        }
        TaxMode::Inclusive => {
            let sc_vat = sc_taxable.calculate_tax(config.rate);
            (item_vat + sc_vat, net + service_charge + sc_vat)
        }
    };

    Ok(BillBreakdown {
        subtotal,
        discount,
        net,
        exempt_amount,
        service_charge,
        taxable_base: net_ex_vat_taxable + sc_taxable,
        vat,
        total,
        vat_rate_bps: config.rate.bps(),
        mode: config.mode,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(cents: i64, vat: bool) -> BillLine {
        BillLine {
            line_total: Money::from_cents(cents),
            vat_applicable: vat,
        }
    }

    #[test]
    fn test_presets() {
        assert_eq!(find_preset("standard").unwrap().rate_bps, 1800);
        assert_eq!(find_preset("SSCL").unwrap().rate_bps, 250);
        assert_eq!(find_preset("tourism_levy").unwrap().rate_bps, 100);
        assert_eq!(find_preset("zero_rated").unwrap().rate_bps, 0);
        assert!(find_preset("gst").is_none());
    }

    #[test]
    fn test_exclusive_with_vat_on_service_charge() {
        let bill = compute_bill(&[line(100_000, true)], Money::zero(), &VatConfig::standard())
            .unwrap();
        assert_eq!(bill.subtotal.cents(), 100_000);
        assert_eq!(bill.service_charge.cents(), 10_000);
        assert_eq!(bill.taxable_base.cents(), 110_000);
        assert_eq!(bill.vat.cents(), 19_800);
        assert_eq!(bill.total.cents(), 129_800);
    }

    #[test]
    fn test_exclusive_without_vat_on_service_charge() {
        let config = VatConfig {
            vat_on_service_charge: false,
            ..VatConfig::standard()
        };
        let bill = compute_bill(&[line(100_000, true)], Money::zero(), &config).unwrap();
        assert_eq!(bill.vat.cents(), 18_000);
        assert_eq!(bill.total.cents(), 128_000);
    }

    #[test]
    fn test_inclusive_mode_extracts_vat() {
        let config = VatConfig {
            mode: TaxMode::Inclusive,
            vat_on_service_charge: false,
            ..VatConfig::standard()
        };
        let bill = compute_bill(&[line(118_000, true)], Money::zero(), &config).unwrap();
        assert_eq!(bill.vat.cents(), 18_000);
        assert_eq!(bill.service_charge.cents(), 10_000);
        assert_eq!(bill.total.cents(), 128_000);

        let config = VatConfig {
            vat_on_service_charge: true,
            ..config
        };
        let bill = compute_bill(&[line(118_000, true)], Money::zero(), &config).unwrap();
        assert_eq!(bill.vat.cents(), 19_800);
        assert_eq!(bill.total.cents(), 129_800);
    }

    #[test]
    fn test_discount_prorated_over_exempt_lines() {
        let config = VatConfig {
            service_charge_bps: 0,
            ..VatConfig::standard()
        };
        // Rs. 600 taxable + Rs. 400 exempt, Rs. 100 discount
        let bill = compute_bill(
            &[line(60_000, true), line(40_000, false)],
            Money::from_cents(10_000),
            &config,
        )
        .unwrap();
        assert_eq!(bill.net.cents(), 90_000);
        assert_eq!(bill.exempt_amount.cents(), 36_000);
        assert_eq!(bill.taxable_base.cents(), 54_000);
        assert_eq!(bill.vat.cents(), 9_720);
        assert_eq!(bill.total.cents(), 99_720);
    }

    #[test]
    fn test_takeaway_has_no_service_charge() {
        let config = VatConfig::standard().for_order(OrderType::Takeaway);
        let bill = compute_bill(&[line(100_000, true)], Money::zero(), &config).unwrap();
        assert!(bill.service_charge.is_zero());
        assert_eq!(bill.total.cents(), 118_000);
    }

    #[test]
    fn test_discount_larger_than_subtotal_rejected() {
        let result = compute_bill(
            &[line(1_000, true)],
            Money::from_cents(2_000),
            &VatConfig::standard(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_bill_is_zero() {
        let bill = compute_bill(&[], Money::zero(), &VatConfig::standard()).unwrap();
        assert!(bill.total.is_zero());
    }
}
