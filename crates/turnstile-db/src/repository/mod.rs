//! # Repository Module
//!
//! Database repository implementations for Turnstile.
//!
//! ## Two Call Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository methods (own their transaction)                            │
//! │       db.tickets().refund(&ids)                                        │
//! │       db.orders().checkout_new(request)                                │
//! │            │                                                            │
//! │            │ begin_write() → &mut tx                                    │
//! │            ▼                                                            │
//! │  Module functions (join the caller's transaction)                      │
//! │       ticket::sell_existing(&mut tx, ids, order_id)                    │
//! │       payment::replace_all(&mut tx, order_id, lines)                   │
//! │       catalog::catalog_prices(&mut tx, ticket_ids, meal_ids)           │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Ticket types, meals, price lookups
//! - [`TicketRepository`](ticket::TicketRepository) - Ticket unit ledger
//! - [`OrderRepository`](order::OrderRepository) - Checkout and amendment
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment breakdowns

pub mod catalog;
pub mod order;
pub mod payment;
pub mod ticket;
