//! # turnstile-core: Pure Settlement Logic
//!
//! This crate is the arithmetic and rule half of the order settlement
//! engine. It contains no I/O; the database crate feeds it catalog prices
//! and persists what it computes.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Turnstile Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request layer (HTTP, auth, reports)                │   │
//! │  │      sell, checkout-existing, amend, refund, validate ...       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               turnstile-db (transactions, SQL)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ turnstile-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  pricing  │  │ lifecycle │  │   │
//! │  │   │ TicketUnit│  │   Money   │  │  Basket   │  │  Status   │  │   │
//! │  │   │   Order   │  │ UnitPrice │  │ Settlement│  │Transition │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TicketUnit, Order, PaymentRecord, requests)
//! - [`money`] - Cent-precise `Money` and sub-cent `UnitPrice`
//! - [`pricing`] - Basket pricing and payment reconciliation
//! - [`lifecycle`] - Ticket status transitions
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use turnstile_core::money::{Money, UnitPrice};
//! use turnstile_core::pricing::{apply_payments, price_basket, CatalogPrices};
//! use turnstile_core::types::{Basket, PaymentLine, PaymentMethod, TicketLine};
//!
//! let catalog = CatalogPrices {
//!     tickets: HashMap::from([(1, UnitPrice::from_cents(5000))]),
//!     meals: HashMap::new(),
//! };
//! let basket = Basket {
//!     tickets: vec![TicketLine { ticket_type_id: 1, quantity: 2 }],
//!     meals: vec![],
//! };
//!
//! let priced = price_basket(&basket, &catalog).unwrap();
//! assert_eq!(priced.gross_total, Money::from_cents(10000));
//!
//! let payments = [
//!     PaymentLine::new(PaymentMethod::Cash, Money::from_cents(8000)),
//!     PaymentLine::new(PaymentMethod::Discount, Money::from_cents(2000)),
//! ];
//! let settlement = apply_payments(priced.gross_total, &payments).unwrap();
//! assert_eq!(settlement.final_total, Money::from_cents(8000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::{TicketStatus, TicketTransition};
pub use money::{Money, UnitPrice};
pub use pricing::{CatalogPrices, PricedBasket, Settlement};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum units a single ticket line may generate or sell.
///
/// Guards against a mistyped quantity (10000 instead of 10) bulk-creating
/// inventory rows inside one transaction.
pub const MAX_LINE_QUANTITY: i64 = 1000;

/// Maximum length of the free-text order description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Largest accepted unit price, in 1/10000 units (1,000,000.00).
pub const MAX_UNIT_PRICE_E4: i64 = 10_000_000_000;

/// Largest accepted single payment line, in cents (100,000,000.00).
pub const MAX_PAYMENT_CENTS: i64 = 10_000_000_000;
