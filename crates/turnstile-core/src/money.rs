//! # Money Module
//!
//! Provides the two monetary types used by the settlement engine.
//!
//! ## Two Precisions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WHERE EACH TYPE LIVES                                                  │
//! │                                                                         │
//! │  UnitPrice (1/10000 of a unit)          Money (cents)                   │
//! │  ─────────────────────────────          ─────────────                   │
//! │  TicketType.price_e4                    Order.total_cents               │
//! │  MealType.price_e4                      Order.gross_total_cents         │
//! │  TicketUnit.sold_price_e4 (snapshot)    PaymentRecord.amount_cents      │
//! │  OrderMealLine.price_at_order_e4        Settlement totals               │
//! │                                                                         │
//! │  Catalog prices may carry sub-cent precision (10.005).                  │
//! │  Anything settled against tendered money is whole cents.               │
//! │  UnitPrice → Money only through round-half-up at the cent.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use turnstile_core::money::{Money, UnitPrice};
//!
//! let price: UnitPrice = "10.005".parse().unwrap();
//! assert_eq!(price.e4(), 100_050);
//! assert_eq!(price.round_to_money(), Money::from_cents(1001)); // 10.01
//!
//! let total = Money::from_cents(1000) + Money::from_cents(500);
//! assert_eq!(total.to_string(), "15.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Number of `UnitPrice` steps in one cent.
const E4_PER_CENT: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A settled monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: running totals can dip below zero mid-amendment
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as the bare integer**: the request layer speaks cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use turnstile_core::money::Money;
    ///
    /// let price = Money::from_cents(5000); // 50.00
    /// assert_eq!(price.cents(), 5000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero.
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

    /// Rounds a value expressed in 1/10000 units to the nearest cent,
    /// with halves rounding up.
    ///
    /// ## Rounding Table
    /// ```text
    ///   e4 value      exact        cents
    ///   ─────────     ─────────    ─────
    ///   100_050       10.0050  →   1001   (half rounds up)
    ///    40_040        4.0040  →    400
    ///      -50       -0.0050  →      0   (half rounds toward +∞)
    /// ```
    ///
    /// Integer only: `floor((e4 + 50) / 100)`, computed without the
    /// intermediate sum so it holds over the full `i64` range.
    #[inline]
    pub const fn round_half_up_e4(e4: i64) -> Self {
        let cents = e4.div_euclid(E4_PER_CENT);
        if e4.rem_euclid(E4_PER_CENT) >= E4_PER_CENT / 2 {
            Money(cents + 1)
        } else {
            Money(cents)
        }
    }

    /// `None` when the sum leaves the `i64` range.
    #[inline]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// `None` when the difference leaves the `i64` range.
    #[inline]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Money)
    }
}

/// Displays as a plain decimal ("15.00", "-5.50"). Currency symbols are a
/// presentation concern of the request layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
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
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Price
// =============================================================================

/// A catalog or snapshot price in 1/10000 of a currency unit.
///
/// ## Why Not Cents?
/// Catalog prices are entered as free decimals and may carry fractions of a
/// cent (a 10.005 day pass). Keeping four decimal places lets the basket
/// aggregate exactly and round once per subtotal, which is what the
/// settlement totals are defined against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct UnitPrice(i64);

impl UnitPrice {
    /// Creates a price from 1/10000 units.
    #[inline]
    pub const fn from_e4(e4: i64) -> Self {
        UnitPrice(e4)
    }

    /// Creates a whole-cent price.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        UnitPrice(cents * E4_PER_CENT)
    }

    /// Returns the raw 1/10000 value (the stored column value).
    #[inline]
    pub const fn e4(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Exact line value for `qty` units, still in 1/10000 units.
    #[inline]
    pub const fn extend(&self, qty: i64) -> Self {
        UnitPrice(self.0 * qty)
    }

    /// Like [`extend`](Self::extend), `None` on overflow.
    #[inline]
    pub fn checked_extend(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(UnitPrice)
    }

    #[inline]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(UnitPrice)
    }

    /// Rounds to the cent, halves up.
    #[inline]
    pub const fn round_to_money(&self) -> Money {
        Money::round_half_up_e4(self.0)
    }
}

impl Add for UnitPrice {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        UnitPrice(self.0 + other.0)
    }
}

impl Sum for UnitPrice {
    fn sum<I: Iterator<Item = UnitPrice>>(iter: I) -> Self {
        iter.fold(UnitPrice(0), Add::add)
    }
}

/// Four decimal places, trailing zeros trimmed down to two ("10.005",
/// "50.00").
impl fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let mut frac = format!("{:04}", abs % 10_000);
        while frac.len() > 2 && frac.ends_with('0') {
            frac.pop();
        }
        write!(f, "{}{}.{}", sign, abs / 10_000, frac)
    }
}

/// Parses a plain decimal with at most four fractional digits.
///
/// ```rust
/// use turnstile_core::money::UnitPrice;
///
/// assert_eq!("50".parse::<UnitPrice>().unwrap().e4(), 500_000);
/// assert_eq!("4.004".parse::<UnitPrice>().unwrap().e4(), 40_040);
/// assert!("1.00001".parse::<UnitPrice>().is_err());
/// assert!("abc".parse::<UnitPrice>().is_err());
/// ```
impl FromStr for UnitPrice {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "price".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty value"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("must be a decimal number"));
        }
        if frac.len() > 4 {
            return Err(invalid("at most 4 decimal places"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("value too large"))?
        };
        let frac: i64 = format!("{:0<4}", frac)
            .parse()
            .map_err(|_| invalid("must be a decimal number"))?;

        let e4 = whole
            .checked_mul(10_000)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| invalid("value too large"))?;

        Ok(UnitPrice(if negative { -e4 } else { e4 }))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
