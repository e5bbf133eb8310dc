//! # turnstile-db: Database Layer for Turnstile
//!
//! This crate owns every SQLite transaction of the settlement engine.
//! It uses sqlx for async access to a local SQLite file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Turnstile Data Flow                              │
//! │                                                                         │
//! │  Request layer (checkout, amend, refund)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   turnstile-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ OrderRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ TicketRepo    │    │ 001_initial  │  │   │
//! │  │   │ begin_write() │    │ PaymentRepo   │    │   _schema    │  │   │
//! │  │   │               │    │ CatalogRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  │                                ▼                               │   │
//! │  │                  turnstile-core (pricing, lifecycle)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Settings file and environment overrides
//! - [`pool`] - Connection pool, configuration, write-locked transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Ticket ledger, orders, payments, catalog
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turnstile_db::{Database, Settings};
//!
//! let settings = Settings::load(None)?;
//! let db = Database::new(settings.db_config()).await?;
//!
//! let receipt = db.orders().checkout_new(request).await?;
//! let outcome = db.tickets().refund(&unit_ids).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::Settings;
pub use error::{ConfigError, DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
pub use repository::ticket::TicketRepository;
