//! # Domain Types
//!
//! Core domain types used throughout Turnstile.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Catalog (shared, read-mostly)      Ledger                              │
//! │  ┌─────────────────┐                ┌─────────────────┐                 │
//! │  │   TicketType    │◄───────────────│   TicketUnit    │                 │
//! │  │  ─────────────  │  ticket_type_id│  ─────────────  │                 │
//! │  │  id (INTEGER)   │                │  id (INTEGER)   │                 │
//! │  │  category       │                │  status, valid  │                 │
//! │  │  subcategory    │                │  sold_price_e4  │──┐ snapshot     │
//! │  │  price_e4       │                │  order_id       │  │              │
//! │  └─────────────────┘                └─────────────────┘  │              │
//! │  ┌─────────────────┐                                     ▼              │
//! │  │    MealType     │                ┌─────────────────────────────┐     │
//! │  │  price_e4       │◄───────────────│           Order             │     │
//! │  └─────────────────┘ OrderMealLine  │  id (UUID), user_id         │     │
//! │                      (snapshot)     │  total / gross / discount   │     │
//! │                                     └──────────────┬──────────────┘     │
//! │                                                    │ 1..n               │
//! │                                     ┌──────────────▼──────────────┐     │
//! │                                     │  PaymentRecord (method)     │     │
//! │                                     └─────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Catalog prices are not versioned. A sale freezes the price on the unit
//! (`sold_price_e4`) and on each meal line (`price_at_order_e4`); history is
//! reconstructed from those snapshots only.
//!
//! Row types keep raw integer columns (`*_e4`, `*_cents`) so they map
//! directly onto the storage shape, with typed accessors on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::lifecycle::TicketStatus;
use crate::money::{Money, UnitPrice};
use crate::pricing::Settlement;

// =============================================================================
// Catalog
// =============================================================================

/// A priced category/subcategory of admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TicketType {
    pub id: i64,
    pub category: String,
    pub subcategory: String,
    pub description: Option<String>,
    /// Current price in 1/10000 units.
    pub price_e4: i64,
    /// Archived types cannot be sold; existing units keep their history.
    pub archived: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TicketType {
    #[inline]
    pub fn price(&self) -> UnitPrice {
        UnitPrice::from_e4(self.price_e4)
    }
}

/// A food or drink item sold alongside tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MealType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_e4: i64,
    pub archived: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl MealType {
    #[inline]
    pub fn price(&self) -> UnitPrice {
        UnitPrice::from_e4(self.price_e4)
    }
}

// =============================================================================
// Ticket Unit
// =============================================================================

/// One admission instance with its own lifecycle.
///
/// `sold_price_e4`, `sold_at` and `order_id` are set exactly when
/// `status == Sold`. The table enforces this with a CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TicketUnit {
    pub id: i64,
    pub ticket_type_id: i64,
    pub status: TicketStatus,
    /// Independent of status: a sold unit can be revoked later.
    pub valid: bool,
    /// Price frozen at sale time.
    pub sold_price_e4: Option<i64>,
    #[ts(as = "Option<String>")]
    pub sold_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TicketUnit {
    #[inline]
    pub fn sold_price(&self) -> Option<UnitPrice> {
        self.sold_price_e4.map(UnitPrice::from_e4)
    }

    /// Available and valid.
    #[inline]
    pub fn is_sellable(&self) -> bool {
        self.status == TicketStatus::Available && self.valid
    }
}

/// A unit handed back to inventory by an amendment, with the price it was
/// sold at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReleasedUnit {
    pub id: i64,
    pub sold_price_e4: i64,
}

impl ReleasedUnit {
    #[inline]
    pub fn sold_price(&self) -> UnitPrice {
        UnitPrice::from_e4(self.sold_price_e4)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
///
/// `total_cents == gross_total_cents - discount_cents` at all times, and the
/// gross total tracks the ticket units and meal lines attached to the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    /// UUID v4.
    pub id: String,
    /// Buyer reference.
    pub user_id: String,
    pub description: Option<String>,
    /// Net total, after discount.
    pub total_cents: i64,
    /// Basket value before discount.
    pub gross_total_cents: i64,
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn gross_total(&self) -> Money {
        Money::from_cents(self.gross_total_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }
}

/// A meal line on an order. `(order_id, meal_id)` is unique; repeated
/// additions increment `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderMealLine {
    pub order_id: String,
    pub meal_id: i64,
    pub quantity: i64,
    pub price_at_order_e4: i64,
}

impl OrderMealLine {
    #[inline]
    pub fn price_at_order(&self) -> UnitPrice {
        UnitPrice::from_e4(self.price_at_order_e4)
    }

    /// Line value rounded to the cent.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price_at_order().extend(self.quantity).round_to_money()
    }
}

/// Everything attached to one order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetails {
    pub order: Order,
    pub tickets: Vec<TicketUnit>,
    pub meals: Vec<OrderMealLine>,
    pub payments: Vec<PaymentRecord>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// Closed set of payment methods.
///
/// `Discount` is a negative adjustment, not tendered money. `Postponed`
/// defers collection and must be the only line on an order.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Voucher,
    Discount,
    Postponed,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Transfer,
        PaymentMethod::Voucher,
        PaymentMethod::Discount,
        PaymentMethod::Postponed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Voucher => "voucher",
            PaymentMethod::Discount => "discount",
            PaymentMethod::Postponed => "postponed",
        }
    }

    #[inline]
    pub const fn is_discount(&self) -> bool {
        matches!(self, PaymentMethod::Discount)
    }

    #[inline]
    pub const fn is_postponed(&self) -> bool {
        matches!(self, PaymentMethod::Postponed)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::invalid_input("payment method", s))
    }
}

// =============================================================================
// Payments
// =============================================================================

/// One line of a payment breakdown as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentLine {
    pub method: PaymentMethod,
    pub amount: Money,
}

impl PaymentLine {
    pub const fn new(method: PaymentMethod, amount: Money) -> Self {
        PaymentLine { method, amount }
    }
}

/// A stored payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn as_line(&self) -> PaymentLine {
        PaymentLine::new(self.method, self.amount())
    }
}

// =============================================================================
// Baskets & Requests
// =============================================================================

/// `quantity` fresh units of a ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketLine {
    pub ticket_type_id: i64,
    pub quantity: i64,
}

/// `quantity` of a meal at catalog price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MealLine {
    pub meal_id: i64,
    pub quantity: i64,
}

/// A meal added during an amendment, priced by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AmendMealLine {
    pub meal_id: i64,
    pub quantity: i64,
    pub price: UnitPrice,
}

/// A proposed combination of ticket and meal lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Basket {
    #[serde(default)]
    pub tickets: Vec<TicketLine>,
    #[serde(default)]
    pub meals: Vec<MealLine>,
}

impl Basket {
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty() && self.meals.is_empty()
    }
}

/// Checkout selling freshly created units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutNewRequest {
    pub user_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub basket: Basket,
    /// `None` is rejected; an order always carries a payment breakdown.
    pub payments: Option<Vec<PaymentLine>>,
}

/// Checkout selling pre-generated units.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutExistingRequest {
    #[serde(default)]
    pub unit_ids: Vec<i64>,
    pub user_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub meals: Vec<MealLine>,
    pub payments: Option<Vec<PaymentLine>>,
}

/// Changes applied to an existing order, in this order: added tickets,
/// removed tickets, added meals, removed meals, payments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AmendRequest {
    #[serde(default)]
    pub add_tickets: Vec<TicketLine>,
    #[serde(default)]
    pub remove_tickets: Vec<TicketLine>,
    #[serde(default)]
    pub add_meals: Vec<AmendMealLine>,
    #[serde(default)]
    pub remove_meals: Vec<MealLine>,
    /// Replaces the whole payment breakdown when present.
    pub payments: Option<Vec<PaymentLine>>,
}

// =============================================================================
// Amendment Options
// =============================================================================

/// How a meal removal larger than the line quantity is credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealRemoval {
    /// Credit the full requested quantity even past what the line holds.
    #[default]
    Unclamped,
    /// Credit at most the quantity the line holds.
    Clamped,
}

/// Whether replacement payments are checked against the amended total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCheck {
    /// Store the new payments verbatim.
    #[default]
    Skip,
    /// Tendered money must equal the amended net total.
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmendOptions {
    #[serde(default)]
    pub meal_removal: MealRemoval,
    #[serde(default)]
    pub payment_check: PaymentCheck,
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a best-effort refund.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundOutcome {
    /// Units moved from sold back to available.
    pub refunded: Vec<i64>,
    /// Units that were not sold (or do not exist) and were left alone.
    pub skipped: Vec<i64>,
}

/// Result of a bulk validity flip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValidityOutcome {
    pub updated: Vec<i64>,
    pub already_in_state: Vec<i64>,
    pub missing: Vec<i64>,
}

/// A created order with the totals it was settled against.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub settlement: Settlement,
}

/// An amended order with the units the amendment touched.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AmendReceipt {
    pub order: Order,
    pub sold_units: Vec<i64>,
    pub released_units: Vec<i64>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parse() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
        assert!(matches!(
            "bitcoin".parse::<PaymentMethod>(),
            Err(CoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_payment_line_json_shape() {
        let line: PaymentLine = serde_json::from_str(r#"{"method":"discount","amount":2000}"#).unwrap();
        assert_eq!(line, PaymentLine::new(PaymentMethod::Discount, Money::from_cents(2000)));
        assert!(serde_json::from_str::<PaymentLine>(r#"{"method":"iou","amount":1}"#).is_err());
    }

    #[test]
    fn test_amend_request_defaults() {
        let req: AmendRequest = serde_json::from_str(r#"{"add_tickets":[{"ticket_type_id":1,"quantity":2}]}"#).unwrap();
        assert_eq!(req.add_tickets.len(), 1);
        assert!(req.remove_meals.is_empty());
        assert!(req.payments.is_none());
    }

    #[test]
    fn test_meal_line_total_rounds_once() {
        let line = OrderMealLine {
            order_id: "o".to_string(),
            meal_id: 1,
            quantity: 3,
            price_at_order_e4: 3_335, // 0.3335
        };
        // 1.0005 → 1.00 (rounded once, not 0.33 × 3 = 0.99)
        assert_eq!(line.line_total(), Money::from_cents(100));
    }

    #[test]
    fn test_amend_options_default() {
        let opts = AmendOptions::default();
        assert_eq!(opts.meal_removal, MealRemoval::Unclamped);
        assert_eq!(opts.payment_check, PaymentCheck::Skip);
    }
}
