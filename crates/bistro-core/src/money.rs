//! # Money Module
//!
//! Provides the `Money` type for monetary values in the smallest currency
//! unit (cents of a Sri Lankan rupee).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Floating point:  0.1 + 0.2 = 0.30000000000000004                       │
//! │                                                                         │
//! │  A bill of Rs. 1,000.00 split three ways:                               │
//! │    100000 cents / 3 = 33333 cents (×3 = 99999)                          │
//! │    split_evenly() hands the leftover cent to the first share            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bistro_core::money::Money;
//!
//! let kottu = Money::from_cents(125_000); // Rs. 1,250.00
//! let total = kottu * 2 + Money::from_cents(35_000);
//! assert_eq!(total.to_string(), "Rs. 2,850.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in cents.
///
/// Signed so that refunds and discounts can be expressed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use bistro_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from rupees and cents.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -Rs. 5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the rupee portion (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax on a tax-exclusive amount.
    ///
    /// Integer math: `(amount * bps + 5000) / 10000`, i.e. half-up rounding
    /// on positive amounts.
    ///
    /// ```rust
    /// use bistro_core::money::Money;
    /// use bistro_core::types::TaxRate;
    ///
    /// let bill = Money::from_cents(100_000);  // Rs. 1,000.00
    /// let vat = bill.calculate_tax(TaxRate::from_bps(1800));
    /// assert_eq!(vat.cents(), 18_000);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money::from_cents(round_div(
            self.0 as i128 * rate.bps() as i128,
            BPS_DENOMINATOR,
        ))
    }

    /// Extracts the tax already contained in a tax-inclusive amount.
    ///
    /// `tax = gross * bps / (10000 + bps)`
    ///
    /// ```rust
    /// use bistro_core::money::Money;
    /// use bistro_core::types::TaxRate;
    ///
    /// let gross = Money::from_cents(118_000);
    /// let vat = gross.extract_inclusive_tax(TaxRate::from_bps(1800));
    /// assert_eq!(vat.cents(), 18_000);
    /// ```
    pub fn extract_inclusive_tax(&self, rate: TaxRate) -> Money {
        let denominator = BPS_DENOMINATOR + rate.bps() as i128;
        Money::from_cents(round_div(self.0 as i128 * rate.bps() as i128, denominator))
    }

    /// Returns `bps` basis points of this amount (service charge, fees).
    pub fn percentage(&self, bps: u32) -> Money {
        Money::from_cents(round_div(self.0 as i128 * bps as i128, BPS_DENOMINATOR))
    }

    /// Returns the share `part / whole` of this amount, rounded.
    ///
    /// Used to prorate a bill-level discount across VAT-able and exempt lines.
    pub fn prorate(&self, part: Money, whole: Money) -> Money {
        if whole.is_zero() {
            return Money::zero();
        }
        Money::from_cents(round_div(self.0 as i128 * part.0 as i128, whole.0 as i128))
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Formats the amount without the currency symbol: `1,250.00`.
    ///
    /// Used for receipt columns where the header already names the currency.
    pub fn format_amount(&self) -> String {
        let rupees = self.rupees().unsigned_abs().to_string();

        let mut grouped = String::with_capacity(rupees.len() + rupees.len() / 3);
        for (i, ch) in rupees.chars().enumerate() {
            if i > 0 && (rupees.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, grouped, self.cents_part().abs())
    }

    /// Splits the amount into `parts` shares that sum back to the original.
    ///
    /// Leftover cents go to the first shares.
    ///
    /// ```rust
    /// use bistro_core::money::Money;
    ///
    /// let shares = Money::from_cents(1000).split_evenly(3);
    /// let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![334, 333, 333]);
    /// ```
    pub fn split_evenly(&self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let n = parts as i64;
        let base = self.0 / n;
        let remainder = self.0 % n;
        (0..n)
            .map(|i| {
                if i < remainder.abs() {
                    Money(base + remainder.signum())
                } else {
                    Money(base)
                }
            })
            .collect()
    }
}

/// Divides with half-away-from-zero rounding.
fn round_div(numerator: i128, denominator: i128) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let half = denominator / 2;
    let rounded = if (numerator < 0) != (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `Rs. 1,250.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}Rs. {}", sign, self.abs().format_amount())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
