//! # Pricing & Totals
//!
//! Pure basket pricing and payment reconciliation. No state, no I/O: the
//! same catalog and the same basket always give the same totals.
//!
//! ## Rounding Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ticket lines ──► Σ unit price (exact, e4) ──► round ──► ticket_subtotal│
//! │                                                              │          │
//! │  meal lines ───► Σ qty × price (exact, e4) ──► round ──► meal_subtotal  │
//! │                                                              │          │
//! │                                    gross_total = ticket + meal (cents)  │
//! │                                                              │          │
//! │  payments ──► discount = Σ discount lines                    ▼          │
//! │           └─► tendered = Σ other lines     final = gross − discount     │
//! │                                            tendered == final, exactly   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rounding each subtotal separately is observable: 0.005 of tickets plus
//! 0.005 of meals settles at 0.02, where rounding the raw sum once would
//! give 0.01.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, UnitPrice};
use crate::types::{Basket, MealLine, PaymentLine};
use crate::MAX_PAYMENT_CENTS;

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// Current prices of sellable (non-archived) catalog entries.
///
/// An id absent from the map is treated as unknown or archived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPrices {
    pub tickets: HashMap<i64, UnitPrice>,
    pub meals: HashMap<i64, UnitPrice>,
}

// =============================================================================
// Priced Basket
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedTicketLine {
    pub ticket_type_id: i64,
    pub quantity: i64,
    pub unit_price: UnitPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedMealLine {
    pub meal_id: i64,
    pub quantity: i64,
    pub unit_price: UnitPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Ticket,
    Meal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Unknown id, or the catalog entry is archived.
    NotForSale,
    NonPositiveQuantity,
}

/// A basket line filtered out during pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DroppedLine {
    pub kind: LineKind,
    pub id: i64,
    pub quantity: i64,
    pub reason: DropReason,
}

/// The sellable part of a basket with its rounded subtotals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedBasket {
    pub tickets: Vec<PricedTicketLine>,
    pub meals: Vec<PricedMealLine>,
    pub dropped: Vec<DroppedLine>,
    pub ticket_subtotal: Money,
    pub meal_subtotal: Money,
    pub gross_total: Money,
}

impl PricedBasket {
    /// Nothing left to sell after filtering.
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty() && self.meals.is_empty()
    }

    /// Number of ticket units the basket sells.
    pub fn ticket_units(&self) -> i64 {
        self.tickets.iter().map(|l| l.quantity).sum()
    }
}

// =============================================================================
// Basket Pricing
// =============================================================================

/// Prices a basket against current catalog prices.
///
/// Lines with an id missing from `catalog` or a quantity below 1 are
/// dropped and reported in [`PricedBasket::dropped`]; they never fail the
/// call.
///
/// ## Errors
/// * `Validation` - a subtotal does not fit in an `i64`
pub fn price_basket(basket: &Basket, catalog: &CatalogPrices) -> CoreResult<PricedBasket> {
    let mut dropped = Vec::new();

    let tickets: Vec<PricedTicketLine> = basket
        .tickets
        .iter()
        .filter_map(|line| {
            match keep_line(LineKind::Ticket, line.ticket_type_id, line.quantity, &catalog.tickets) {
                Ok(unit_price) => Some(PricedTicketLine {
                    ticket_type_id: line.ticket_type_id,
                    quantity: line.quantity,
                    unit_price,
                }),
                Err(d) => {
                    dropped.push(d);
                    None
                }
            }
        })
        .collect();

    let meals = price_meals(&basket.meals, catalog, &mut dropped);

    assemble(tickets, meals, dropped)
}

/// Prices units that are already sold, one line per unit at the price
/// stamped on it, plus catalog-priced meals.
///
/// `units` holds `(ticket_type_id, sold_price)` pairs.
pub fn price_sold_units(
    units: &[(i64, UnitPrice)],
    meals: &[MealLine],
    catalog: &CatalogPrices,
) -> CoreResult<PricedBasket> {
    let tickets: Vec<PricedTicketLine> = units
        .iter()
        .map(|&(ticket_type_id, unit_price)| PricedTicketLine {
            ticket_type_id,
            quantity: 1,
            unit_price,
        })
        .collect();

    let mut dropped = Vec::new();
    let meals = price_meals(meals, catalog, &mut dropped);

    assemble(tickets, meals, dropped)
}

fn price_meals(lines: &[MealLine], catalog: &CatalogPrices, dropped: &mut Vec<DroppedLine>) -> Vec<PricedMealLine> {
    lines
        .iter()
        .filter_map(|line| match keep_line(LineKind::Meal, line.meal_id, line.quantity, &catalog.meals) {
            Ok(unit_price) => Some(PricedMealLine {
                meal_id: line.meal_id,
                quantity: line.quantity,
                unit_price,
            }),
            Err(d) => {
                dropped.push(d);
                None
            }
        })
        .collect()
}

fn keep_line(
    kind: LineKind,
    id: i64,
    quantity: i64,
    prices: &HashMap<i64, UnitPrice>,
) -> Result<UnitPrice, DroppedLine> {
    let dropped_line = |reason| DroppedLine {
        kind,
        id,
        quantity,
        reason,
    };

    if quantity < 1 {
        return Err(dropped_line(DropReason::NonPositiveQuantity));
    }
    prices.get(&id).copied().ok_or_else(|| dropped_line(DropReason::NotForSale))
}

fn assemble(
    tickets: Vec<PricedTicketLine>,
    meals: Vec<PricedMealLine>,
    dropped: Vec<DroppedLine>,
) -> CoreResult<PricedBasket> {
    let ticket_subtotal = subtotal(tickets.iter().map(|l| (l.unit_price, l.quantity)), "ticket subtotal")?;
    let meal_subtotal = subtotal(meals.iter().map(|l| (l.unit_price, l.quantity)), "meal subtotal")?;

    // Both operands are whole cents, so the final rounding step is exact.
    let gross_total = ticket_subtotal
        .checked_add(meal_subtotal)
        .ok_or_else(|| ValidationError::overflow("gross total"))?;

    Ok(PricedBasket {
        tickets,
        meals,
        dropped,
        ticket_subtotal,
        meal_subtotal,
        gross_total,
    })
}

/// Exact sum of `price × qty` over the lines, rounded once.
fn subtotal(lines: impl Iterator<Item = (UnitPrice, i64)>, field: &str) -> CoreResult<Money> {
    let mut exact = UnitPrice::from_e4(0);
    for (price, qty) in lines {
        exact = price
            .checked_extend(qty)
            .and_then(|value| exact.checked_add(value))
            .ok_or_else(|| ValidationError::overflow(field))?;
    }
    Ok(exact.round_to_money())
}

/// Value of `qty` units at `price`, rounded to the cent.
pub fn line_value(price: UnitPrice, qty: i64) -> CoreResult<Money> {
    price
        .checked_extend(qty)
        .map(|value| value.round_to_money())
        .ok_or_else(|| ValidationError::overflow("line value").into())
}

// =============================================================================
// Payment Reconciliation
// =============================================================================

/// Totals an order is settled against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    pub gross_total: Money,
    /// Sum of all `discount` lines.
    pub discount: Money,
    /// `gross_total - discount`.
    pub final_total: Money,
    /// Sum of every non-discount line.
    pub tendered: Money,
    /// The breakdown is a single postponed line.
    pub postponed: bool,
}

/// Splits payments into discount and tendered money and checks the
/// tendered sum against the discounted total.
///
/// ## Errors
/// * `InvalidPaymentCombination` - `postponed` next to any other line
/// * `Validation` - a negative amount
/// * `AmountMismatch` - tendered != gross - discount
pub fn apply_payments(gross_total: Money, payments: &[PaymentLine]) -> CoreResult<Settlement> {
    check_lines(payments)?;

    let discount = discount_of(payments)?;
    let tendered = tendered_of(payments)?;
    let final_total = gross_total
        .checked_sub(discount)
        .ok_or_else(|| ValidationError::overflow("final total"))?;

    if tendered != final_total {
        return Err(CoreError::AmountMismatch {
            tendered,
            expected: final_total,
        });
    }

    Ok(Settlement {
        gross_total,
        discount,
        final_total,
        tendered,
        postponed: is_postponed(payments),
    })
}

/// Checks a replacement breakdown against an already-discounted total.
///
/// Discount lines in `payments` are ignored for the comparison since
/// `net_total` already has the discount taken off.
pub fn validate_tender(net_total: Money, payments: &[PaymentLine]) -> CoreResult<Money> {
    check_lines(payments)?;

    let tendered = tendered_of(payments)?;

    if tendered != net_total {
        return Err(CoreError::AmountMismatch {
            tendered,
            expected: net_total,
        });
    }
    Ok(tendered)
}

/// Sum of the discount lines of a breakdown.
pub fn discount_of(payments: &[PaymentLine]) -> CoreResult<Money> {
    sum_lines(payments.iter().filter(|p| p.method.is_discount()), "discount")
}

fn tendered_of(payments: &[PaymentLine]) -> CoreResult<Money> {
    sum_lines(payments.iter().filter(|p| !p.method.is_discount()), "tendered amount")
}

fn sum_lines<'a>(mut lines: impl Iterator<Item = &'a PaymentLine>, field: &str) -> CoreResult<Money> {
    lines.try_fold(Money::zero(), |total, line| -> CoreResult<Money> {
        total
            .checked_add(line.amount)
            .ok_or_else(|| ValidationError::overflow(field).into())
    })
}

fn check_lines(payments: &[PaymentLine]) -> CoreResult<()> {
    if payments.len() > 1 && payments.iter().any(|p| p.method.is_postponed()) {
        return Err(CoreError::InvalidPaymentCombination);
    }

    if payments.iter().any(|p| p.amount.is_negative()) {
        return Err(ValidationError::MustNotBeNegative {
            field: "payment amount".to_string(),
        }
        .into());
    }

    if payments.iter().any(|p| p.amount.cents() > MAX_PAYMENT_CENTS) {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 0,
            max: MAX_PAYMENT_CENTS,
        }
        .into());
    }

    Ok(())
}

fn is_postponed(payments: &[PaymentLine]) -> bool {
    matches!(payments, [only] if only.method.is_postponed())
}

// =============================================================================
// Unit Tests
// =============================================================================
