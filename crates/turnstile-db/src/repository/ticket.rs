//! # Ticket Ledger
//!
//! Ticket units and their lifecycle transitions.
//!
//! ## Unit Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ticket Unit Lifecycle                             │
//! │                                                                         │
//! │  1. GENERATE                                                           │
//! │     └── generate() → N units { available, valid }                      │
//! │                                                                         │
//! │  2. SELL                                                               │
//! │     ├── sell_new()      → N units inserted directly as sold            │
//! │     └── sell_existing() → available ∧ valid → sold   (all-or-nothing)  │
//! │                                                                         │
//! │  3. GIVE BACK                                                          │
//! │     ├── remove()  → up to N sold units of a type leave their order     │
//! │     └── refund()  → sold → available             (best-effort)         │
//! │                                                                         │
//! │  Side flags: set_validity(), reassign_type() never touch status        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Compare-and-Set
//! Every status write carries its expected prior state in the WHERE clause:
//!
//! ```sql
//! UPDATE tickets SET status = 'sold', ... WHERE id = ? AND status = 'available' AND valid = 1
//! ```
//!
//! Combined with the write lock taken by `begin_write`, two settlements
//! racing for the same unit produce one sale and one `Conflict`.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use turnstile_core::validation::{validate_quantity, validate_unit_ids};
use turnstile_core::{
    CoreError, RefundOutcome, ReleasedUnit, TicketStatus, TicketTransition, TicketUnit, UnitPrice,
    ValidityOutcome,
};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;

const UNIT_COLUMNS: &str = "id, ticket_type_id, status, valid, sold_price_e4, sold_at, order_id, created_at";

// =============================================================================
// Ledger Operations (inside a caller's transaction)
// =============================================================================

/// Creates `quantity` available, valid units of a ticket type.
///
/// ## Errors
/// * `InvalidInput` - unknown or archived ticket type, quantity out of range
pub async fn generate(conn: &mut SqliteConnection, ticket_type_id: i64, quantity: i64) -> DbResult<Vec<i64>> {
    if validate_quantity(quantity).is_err() {
        return Err(CoreError::invalid_input("quantity", quantity).into());
    }

    let sellable: Option<i64> = sqlx::query_scalar("SELECT id FROM ticket_types WHERE id = ? AND archived = 0")
        .bind(ticket_type_id)
        .fetch_optional(&mut *conn)
        .await?;
    if sellable.is_none() {
        return Err(CoreError::invalid_input("ticket_type_id", ticket_type_id).into());
    }

    let now = Utc::now();
    let mut ids = Vec::with_capacity(quantity as usize);
    for _ in 0..quantity {
        let result = sqlx::query(
            "INSERT INTO tickets (ticket_type_id, status, valid, created_at) VALUES (?1, ?2, 1, ?3)",
        )
        .bind(ticket_type_id)
        .bind(TicketStatus::Available)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        ids.push(result.last_insert_rowid());
    }

    info!(ticket_type_id, quantity, "Generated ticket units");
    Ok(ids)
}

/// Inserts `quantity` units directly as sold to `order_id` at `unit_price`.
pub async fn sell_new(
    conn: &mut SqliteConnection,
    order_id: &str,
    ticket_type_id: i64,
    quantity: i64,
    unit_price: UnitPrice,
) -> DbResult<Vec<i64>> {
    let now = Utc::now();
    let mut ids = Vec::with_capacity(quantity.max(0) as usize);

    for _ in 0..quantity {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (ticket_type_id, status, valid, sold_price_e4, sold_at, order_id, created_at)
            VALUES (?1, ?2, 1, ?3, ?4, ?5, ?4)
            "#,
        )
        .bind(ticket_type_id)
        .bind(TicketStatus::Sold)
        .bind(unit_price.e4())
        .bind(now)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
        ids.push(result.last_insert_rowid());
    }

    debug!(order_id, ticket_type_id, quantity, price = %unit_price, "Sold new ticket units");
    Ok(ids)
}

/// Sells pre-generated units to `order_id`, stamping each with its ticket
/// type's current price.
///
/// Returns `(ticket_type_id, sold_price)` per unit, in request order.
///
/// ## Errors
/// * `Validation` - empty list or a repeated id
/// * `NotFound` - unknown unit
/// * `Conflict` - a unit is not available, or not valid
///
/// On error nothing is committed: the caller drops its transaction and
/// every unit already stamped in this call is rolled back.
pub async fn sell_existing(
    conn: &mut SqliteConnection,
    unit_ids: &[i64],
    order_id: &str,
) -> DbResult<Vec<(i64, UnitPrice)>> {
    validate_unit_ids(unit_ids)?;

    let now = Utc::now();
    let mut sold = Vec::with_capacity(unit_ids.len());

    for &unit_id in unit_ids {
        let row: Option<(i64, TicketStatus, bool, i64)> = sqlx::query_as(
            r#"
            SELECT t.ticket_type_id, t.status, t.valid, tt.price_e4
            FROM tickets t
            JOIN ticket_types tt ON tt.id = t.ticket_type_id
            WHERE t.id = ?1
            "#,
        )
        .bind(unit_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (ticket_type_id, status, valid, price_e4) =
            row.ok_or_else(|| CoreError::not_found("Ticket", unit_id))?;

        TicketTransition::Sell.check(unit_id, status, valid)?;

        let price = UnitPrice::from_e4(price_e4);
        if !cas_sell(conn, unit_id, order_id, price, now).await? {
            return Err(conflict(unit_id, TicketTransition::Sell, "status changed concurrently"));
        }

        sold.push((ticket_type_id, price));
    }

    info!(order_id, units = sold.len(), "Sold existing ticket units");
    Ok(sold)
}

/// Moves sold units back to available. Anything not sold is skipped.
///
/// Each refunded unit's snapshot price (rounded to the cent) is taken off
/// its order's gross and net totals.
pub async fn refund(conn: &mut SqliteConnection, unit_ids: &[i64]) -> DbResult<RefundOutcome> {
    let mut outcome = RefundOutcome::default();
    let now = Utc::now();

    for &unit_id in unit_ids {
        let row: Option<(TicketStatus, Option<i64>, Option<String>)> =
            sqlx::query_as("SELECT status, sold_price_e4, order_id FROM tickets WHERE id = ?1")
                .bind(unit_id)
                .fetch_optional(&mut *conn)
                .await?;

        let (price_e4, order_id) = match row {
            Some((status, Some(price_e4), Some(order_id)))
                if TicketTransition::Refund.check(unit_id, status, true).is_ok() =>
            {
                (price_e4, order_id)
            }
            _ => {
                outcome.skipped.push(unit_id);
                continue;
            }
        };

        if !cas_release(conn, unit_id, TicketTransition::Refund).await? {
            outcome.skipped.push(unit_id);
            continue;
        }

        let credit = UnitPrice::from_e4(price_e4).round_to_money();
        sqlx::query(
            r#"
            UPDATE orders
            SET total_cents = total_cents - ?1,
                gross_total_cents = gross_total_cents - ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(credit.cents())
        .bind(now)
        .bind(&order_id)
        .execute(&mut *conn)
        .await?;

        outcome.refunded.push(unit_id);
    }

    info!(
        refunded = outcome.refunded.len(),
        skipped = outcome.skipped.len(),
        "Refund processed"
    );
    Ok(outcome)
}

/// Releases up to `count` sold units of `ticket_type_id` from `order_id`,
/// most recently created first.
///
/// Returns the released units with the price each was sold at; crediting
/// the order is the caller's job.
pub async fn remove(
    conn: &mut SqliteConnection,
    order_id: &str,
    ticket_type_id: i64,
    count: i64,
) -> DbResult<Vec<ReleasedUnit>> {
    if count < 1 {
        return Ok(Vec::new());
    }

    let candidates: Vec<ReleasedUnit> = sqlx::query_as(
        r#"
        SELECT id, sold_price_e4
        FROM tickets
        WHERE order_id = ?1 AND ticket_type_id = ?2 AND status = ?3
        ORDER BY id DESC
        LIMIT ?4
        "#,
    )
    .bind(order_id)
    .bind(ticket_type_id)
    .bind(TicketTransition::Release.from())
    .bind(count)
    .fetch_all(&mut *conn)
    .await?;

    let mut released = Vec::with_capacity(candidates.len());
    for unit in candidates {
        if cas_release(conn, unit.id, TicketTransition::Release).await? {
            released.push(unit);
        }
    }

    if (released.len() as i64) < count {
        debug!(
            order_id,
            ticket_type_id,
            requested = count,
            released = released.len(),
            "Fewer units on the order than requested for removal"
        );
    }

    Ok(released)
}

/// Sets the `valid` flag. Units already in the requested state are not
/// rewritten.
pub async fn set_validity(conn: &mut SqliteConnection, unit_ids: &[i64], valid: bool) -> DbResult<ValidityOutcome> {
    let mut outcome = ValidityOutcome::default();
    let mut seen = HashSet::with_capacity(unit_ids.len());

    for &unit_id in unit_ids.iter().filter(|id| seen.insert(**id)) {
        let current: Option<bool> = sqlx::query_scalar("SELECT valid FROM tickets WHERE id = ?1")
            .bind(unit_id)
            .fetch_optional(&mut *conn)
            .await?;

        match current {
            None => outcome.missing.push(unit_id),
            Some(v) if v == valid => outcome.already_in_state.push(unit_id),
            Some(_) => {
                sqlx::query("UPDATE tickets SET valid = ?1 WHERE id = ?2 AND valid = ?3")
                    .bind(valid)
                    .bind(unit_id)
                    .bind(!valid)
                    .execute(&mut *conn)
                    .await?;
                outcome.updated.push(unit_id);
            }
        }
    }

    info!(
        valid,
        updated = outcome.updated.len(),
        unchanged = outcome.already_in_state.len(),
        missing = outcome.missing.len(),
        "Ticket validity updated"
    );
    Ok(outcome)
}

/// Moves units to another ticket type. Status and sale snapshot are kept.
///
/// ## Errors
/// * `NotFound` - unknown unit or ticket type (nothing is changed)
pub async fn reassign_type(conn: &mut SqliteConnection, pairs: &[(i64, i64)]) -> DbResult<()> {
    for &(unit_id, ticket_type_id) in pairs {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM ticket_types WHERE id = ?1")
            .bind(ticket_type_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(CoreError::not_found("TicketType", ticket_type_id).into());
        }

        let result = sqlx::query("UPDATE tickets SET ticket_type_id = ?1 WHERE id = ?2")
            .bind(ticket_type_id)
            .bind(unit_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Ticket", unit_id).into());
        }
    }

    info!(units = pairs.len(), "Ticket units reassigned");
    Ok(())
}

/// All units attached to an order.
pub async fn list_for_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<TicketUnit>> {
    let sql = format!("SELECT {UNIT_COLUMNS} FROM tickets WHERE order_id = ?1 ORDER BY id");
    let units = sqlx::query_as::<_, TicketUnit>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(units)
}

// =============================================================================
// Compare-and-Set Writes
// =============================================================================

async fn cas_sell(
    conn: &mut SqliteConnection,
    unit_id: i64,
    order_id: &str,
    price: UnitPrice,
    now: chrono::DateTime<Utc>,
) -> DbResult<bool> {
    let t = TicketTransition::Sell;
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET status = ?1, sold_price_e4 = ?2, sold_at = ?3, order_id = ?4
        WHERE id = ?5 AND status = ?6 AND valid = 1
        "#,
    )
    .bind(t.to())
    .bind(price.e4())
    .bind(now)
    .bind(order_id)
    .bind(unit_id)
    .bind(t.from())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn cas_release(conn: &mut SqliteConnection, unit_id: i64, t: TicketTransition) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET status = ?1, sold_price_e4 = NULL, sold_at = NULL, order_id = NULL
        WHERE id = ?2 AND status = ?3
        "#,
    )
    .bind(t.to())
    .bind(unit_id)
    .bind(t.from())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(unit_id, transition = t.verb(), "Compare-and-set matched no row");
        return Ok(false);
    }
    Ok(true)
}

fn conflict(unit_id: i64, t: TicketTransition, reason: &str) -> DbError {
    CoreError::Conflict {
        unit_id,
        action: t.verb().to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the ticket ledger. Each method runs in its own
/// write-locked transaction.
///
/// ## Usage
/// ```rust,ignore
/// let ids = db.tickets().generate(adult.id, 100).await?;
/// let outcome = db.tickets().refund(&[ids[0], ids[1]]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    pub async fn generate(&self, ticket_type_id: i64, quantity: i64) -> DbResult<Vec<i64>> {
        let mut tx = begin_write(&self.pool).await?;
        let ids = generate(&mut tx, ticket_type_id, quantity).await?;
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn refund(&self, unit_ids: &[i64]) -> DbResult<RefundOutcome> {
        let mut tx = begin_write(&self.pool).await?;
        let outcome = refund(&mut tx, unit_ids).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn set_validity(&self, unit_ids: &[i64], valid: bool) -> DbResult<ValidityOutcome> {
        let mut tx = begin_write(&self.pool).await?;
        let outcome = set_validity(&mut tx, unit_ids, valid).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn reassign_type(&self, pairs: &[(i64, i64)]) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        reassign_type(&mut tx, pairs).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Gets a unit by ID.
    pub async fn get(&self, unit_id: i64) -> DbResult<Option<TicketUnit>> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM tickets WHERE id = ?1");
        let unit = sqlx::query_as::<_, TicketUnit>(&sql)
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(unit)
    }

    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<TicketUnit>> {
        let mut conn = self.pool.acquire().await?;
        list_for_order(&mut conn, order_id).await
    }

    /// Number of units of a type in a given status.
    pub async fn count(&self, ticket_type_id: i64, status: TicketStatus) -> DbResult<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE ticket_type_id = ?1 AND status = ?2")
            .bind(ticket_type_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
