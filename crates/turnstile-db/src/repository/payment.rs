//! # Payment Repository
//!
//! Payment breakdown per order. A breakdown is replaced as a whole, never
//! edited line by line.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::debug;
use turnstile_core::{PaymentLine, PaymentMethod, PaymentRecord};
use uuid::Uuid;

use crate::error::DbResult;

/// Deletes the order's payment rows and inserts `payments` in their place.
///
/// Lines are stored verbatim; checking amounts against the order total is
/// up to the caller.
pub async fn replace_all(conn: &mut SqliteConnection, order_id: &str, payments: &[PaymentLine]) -> DbResult<()> {
    let deleted = sqlx::query("DELETE FROM payments WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let now = Utc::now();
    for line in payments {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, method, amount_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(line.method)
        .bind(line.amount.cents())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    debug!(order_id, deleted, inserted = payments.len(), "Payments replaced");
    Ok(())
}

/// All payment rows of an order, in insertion order.
pub async fn list_for(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<PaymentRecord>> {
    // Rows of one breakdown share a timestamp, so rowid carries the order.
    let rows = sqlx::query_as::<_, (String, String, String, i64, chrono::DateTime<Utc>)>(
        r#"
        SELECT id, order_id, method, amount_cents, created_at
        FROM payments
        WHERE order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(id, order_id, method, amount_cents, created_at)| -> DbResult<PaymentRecord> {
            Ok(PaymentRecord {
                id,
                order_id,
                method: PaymentMethod::from_str(&method)?,
                amount_cents,
                created_at,
            })
        })
        .collect()
}

/// Repository for payment rows.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn list_for(&self, order_id: &str) -> DbResult<Vec<PaymentRecord>> {
        let mut conn = self.pool.acquire().await?;
        list_for(&mut conn, order_id).await
    }

    /// Sum of the tendered (non-discount) lines of an order.
    pub async fn tendered_total(&self, order_id: &str) -> DbResult<turnstile_core::Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE order_id = ?1 AND method != ?2",
        )
        .bind(order_id)
        .bind(PaymentMethod::Discount)
        .fetch_one(&self.pool)
        .await?;
        Ok(turnstile_core::Money::from_cents(cents))
    }
}
