//! # Database Pool Management
//!
//! Connection pool creation, configuration and write-locked transactions.
//!
//! ## Settlement Transaction
//! ```text
//!   Database::new(DbConfig)      pool of N connections, migrations applied
//!          │
//!   begin_write()                BEGIN
//!          │                     UPDATE ledger_lock SET claimed_at = now
//!          │                       (other writers now queue on busy_timeout)
//!          ▼
//!   reads + compare-and-set writes
//!          │
//!   commit()  ─or─  drop         COMMIT / ROLLBACK
//! ```
//!
//! ## Write Lock
//! SQLite has no row locks. A plain deferred transaction that reads first
//! and writes later can lose the race for the write lock after its snapshot
//! went stale. `begin_write` makes the lock claim the first statement of
//! every settlement transaction, so concurrent settlements run one after
//! the other, each waiting up to `busy_timeout`.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use turnstile_core::AmendOptions;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::catalog::CatalogRepository;
use crate::repository::order::OrderRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::ticket::TicketRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Pool and lock settings.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/turnstile/turnstile.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Default: 5. An in-memory database is limited to one connection.
    pub max_connections: u32,
    pub min_connections: u32,

    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,

    /// How long a queued writer waits for the write lock before failing.
    pub busy_timeout: Duration,

    pub run_migrations: bool,

    /// Amendment behaviour handed to [`OrderRepository`].
    pub amend: AmendOptions,
}

impl DbConfig {
    /// Settings for a database file, created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            amend: AmendOptions::default(),
        }
    }

    /// A private in-memory database for tests.
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to a single connection that never idles out.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            ..DbConfig::new(":memory:")
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self.min_connections = self.min_connections.min(max);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn amend_options(mut self, options: AmendOptions) -> Self {
        self.amend = options;
        self
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./turnstile.db")).await?;
/// let receipt = db.orders().checkout_new(request).await?;
/// let refund = db.tickets().refund(&[7, 8]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Amendment defaults handed to the order repository.
    amend: AmendOptions,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    ///
    /// Connections run in WAL mode with foreign keys on and wait up to
    /// `busy_timeout` for the write lock.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database {
            pool,
            amend: config.amend,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a transaction that already holds the database write lock.
    ///
    /// Dropping the returned transaction without `commit()` rolls back
    /// everything done through it.
    pub async fn begin_write(&self) -> DbResult<Transaction<'static, Sqlite>> {
        begin_write(&self.pool).await
    }

    /// Returns the ticket ledger repository.
    pub fn tickets(&self) -> TicketRepository {
        TicketRepository::new(self.pool.clone())
    }

    /// Returns the order repository.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone()).with_amend_defaults(self.amend)
    }

    /// Returns the payment repository.
    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    /// Returns the catalog repository.
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Begins a transaction and claims the write lock with its first statement.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query("UPDATE ledger_lock SET claimed_at = ? WHERE id = 1")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    if claimed.rows_affected() != 1 {
        return Err(DbError::Internal("ledger_lock row is missing".to_string()));
    }

    Ok(tx)
}

// =============================================================================
// Unit Tests
// =============================================================================
