//! # Order Repository
//!
//! Checkout and amendment: each call prices, mutates the ledger, writes the
//! order and its lines, and replaces the payments in one write-locked
//! transaction.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Lifecycle                                 │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     ├── checkout_new()      → price basket → sell_new → meals → pay    │
//! │     └── checkout_existing() → sell_existing → price units → meals → pay│
//! │                                                                         │
//! │  2. AMEND (any number of times)                                        │
//! │     └── amend()                                                        │
//! │           1. + added tickets      (catalog price, sell_new)            │
//! │           2. − removed tickets    (snapshot price, remove)             │
//! │           3. + added meals        (request price, upsert line)         │
//! │           4. − removed meals      (line price, decrement/delete)       │
//! │           5. write running total                                       │
//! │           6. replace payments     (when supplied)                      │
//! │                                                                         │
//! │  There is no cancelled state. Refunding every unit empties an order.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error returns early with `?`; the dropped transaction rolls back
//! every change the call made.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use turnstile_core::pricing::{
    apply_payments, line_value, price_basket, price_sold_units, validate_tender, PricedMealLine,
};
use turnstile_core::validation::{
    validate_description, validate_payments, validate_price, validate_quantity, validate_unit_ids, validate_user_id,
    validate_uuid,
};
use turnstile_core::{
    AmendOptions, AmendReceipt, AmendRequest, CheckoutExistingRequest, CheckoutNewRequest, CheckoutReceipt, CoreError,
    MealRemoval, Money, Order, OrderDetails, OrderMealLine, PaymentCheck, PricedBasket, Settlement, UnitPrice,
    ValidationError,
};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::{catalog, payment, ticket};

const ORDER_COLUMNS: &str =
    "id, user_id, description, total_cents, gross_total_cents, discount_cents, created_at, updated_at";

/// Repository for orders.
///
/// ## Usage
/// ```rust,ignore
/// let receipt = db.orders().checkout_new(CheckoutNewRequest {
///     user_id: Some("till-3".into()),
///     basket: Basket { tickets: vec![TicketLine { ticket_type_id: 1, quantity: 2 }], meals: vec![] },
///     payments: Some(vec![PaymentLine::new(PaymentMethod::Cash, Money::from_cents(10_000))]),
///     ..Default::default()
/// }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    amend: AmendOptions,
}

impl OrderRepository {
    /// Creates a new OrderRepository with default amendment options.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository {
            pool,
            amend: AmendOptions::default(),
        }
    }

    /// Options `amend` uses when the caller does not pick its own.
    pub fn with_amend_defaults(mut self, options: AmendOptions) -> Self {
        self.amend = options;
        self
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Creates an order selling freshly created units plus meals.
    ///
    /// ## Errors
    /// * `Validation` - buyer or payments missing, nothing sellable in the basket
    /// * `InvalidPaymentCombination`, `AmountMismatch` - payments don't settle the basket
    pub async fn checkout_new(&self, request: CheckoutNewRequest) -> DbResult<CheckoutReceipt> {
        let user_id = validate_user_id(request.user_id.as_deref())?;
        let description = validate_description(request.description.as_deref())?;
        let payments = validate_payments(request.payments.as_deref())?;
        check_quantities(request.basket.tickets.iter().map(|l| l.quantity))?;
        check_quantities(request.basket.meals.iter().map(|l| l.quantity))?;

        let ticket_type_ids: Vec<i64> = request.basket.tickets.iter().map(|l| l.ticket_type_id).collect();
        let meal_ids: Vec<i64> = request.basket.meals.iter().map(|l| l.meal_id).collect();

        let mut tx = begin_write(&self.pool).await?;

        let prices = catalog::catalog_prices(&mut tx, &ticket_type_ids, &meal_ids).await?;
        let priced = price_basket(&request.basket, &prices)?;
        ensure_sellable(&priced)?;

        let settlement = apply_payments(priced.gross_total, payments)?;

        let order = new_order(user_id, description, &settlement);
        insert_order(&mut tx, &order).await?;

        for line in &priced.tickets {
            ticket::sell_new(&mut tx, &order.id, line.ticket_type_id, line.quantity, line.unit_price).await?;
        }
        insert_meal_lines(&mut tx, &order.id, &priced.meals).await?;
        payment::replace_all(&mut tx, &order.id, payments).await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            tickets = priced.ticket_units(),
            meals = priced.meals.len(),
            total = %settlement.final_total,
            "Order created"
        );

        Ok(CheckoutReceipt { order, settlement })
    }

    /// Creates an order selling pre-generated units plus meals.
    ///
    /// The units are sold before anything is priced: a single unit that is
    /// sold already, or invalid, rejects the whole checkout with `Conflict`.
    pub async fn checkout_existing(&self, request: CheckoutExistingRequest) -> DbResult<CheckoutReceipt> {
        validate_unit_ids(&request.unit_ids)?;
        let user_id = validate_user_id(request.user_id.as_deref())?;
        let description = validate_description(request.description.as_deref())?;
        let payments = validate_payments(request.payments.as_deref())?;
        check_quantities(request.meals.iter().map(|l| l.quantity))?;

        let mut tx = begin_write(&self.pool).await?;

        // The row must exist before units can point at it; totals are
        // written once the units are priced.
        let mut order = new_order(user_id, description, &Settlement::default());
        insert_order(&mut tx, &order).await?;

        let sold = ticket::sell_existing(&mut tx, &request.unit_ids, &order.id).await?;

        let meal_ids: Vec<i64> = request.meals.iter().map(|l| l.meal_id).collect();
        let prices = catalog::catalog_prices(&mut tx, &[], &meal_ids).await?;
        let priced = price_sold_units(&sold, &request.meals, &prices)?;
        log_dropped(&priced);

        let settlement = apply_payments(priced.gross_total, payments)?;

        order.gross_total_cents = settlement.gross_total.cents();
        order.discount_cents = settlement.discount.cents();
        order.total_cents = settlement.final_total.cents();
        write_totals(&mut tx, &order).await?;

        insert_meal_lines(&mut tx, &order.id, &priced.meals).await?;
        payment::replace_all(&mut tx, &order.id, payments).await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            tickets = sold.len(),
            meals = priced.meals.len(),
            total = %settlement.final_total,
            "Order created from existing units"
        );

        Ok(CheckoutReceipt { order, settlement })
    }

    // =========================================================================
    // Amendment
    // =========================================================================

    /// Amends an order using the repository's default [`AmendOptions`].
    pub async fn amend(&self, order_id: &str, request: AmendRequest) -> DbResult<AmendReceipt> {
        self.amend_with(order_id, request, self.amend).await
    }

    /// Amends an order.
    ///
    /// Starting from the order's current net total, applies the request's
    /// steps in order and writes the running total back. The gross total
    /// moves by the same amount; the recorded discount is left alone.
    ///
    /// ## Errors
    /// * `NotFound` - unknown order (checked before anything changes),
    ///   unknown or archived ticket type, unknown meal
    /// * `Validation` - `order_id` not a UUID, quantity out of range, meal
    ///   price not positive or above the cap, a total that no longer fits
    ///   in an `i64`
    /// * `AmountMismatch` - only with [`PaymentCheck::Enforce`]
    pub async fn amend_with(
        &self,
        order_id: &str,
        request: AmendRequest,
        options: AmendOptions,
    ) -> DbResult<AmendReceipt> {
        validate_uuid("order_id", order_id)?;

        let mut tx = begin_write(&self.pool).await?;
        let now = Utc::now();

        let touched = sqlx::query("UPDATE orders SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(CoreError::not_found("Order", order_id).into());
        }

        let mut order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?;

        let mut delta = Money::zero();
        let mut sold_units = Vec::new();
        let mut released_units = Vec::new();

        // 1. Added tickets, at today's catalog price.
        for line in &request.add_tickets {
            validate_quantity(line.quantity)?;
            let price = catalog::ticket_type_price(&mut tx, line.ticket_type_id).await?;
            let ids = ticket::sell_new(&mut tx, order_id, line.ticket_type_id, line.quantity, price).await?;
            delta = shift(delta, line_value(price, line.quantity)?)?;
            sold_units.extend(ids);
        }

        // 2. Removed tickets, credited at the price each was sold for. The
        // quantity is an upper bound, so only its sign is checked.
        for line in &request.remove_tickets {
            if line.quantity < 1 {
                return Err(ValidationError::must_be_positive("quantity").into());
            }
            let released = ticket::remove(&mut tx, order_id, line.ticket_type_id, line.quantity).await?;
            for unit in released {
                delta = shift(delta, -unit.sold_price().round_to_money())?;
                released_units.push(unit.id);
            }
        }

        // 3. Added meals, at the price the caller supplied.
        for line in &request.add_meals {
            validate_quantity(line.quantity)?;
            validate_price(line.price)?;
            ensure_meal_exists(&mut tx, line.meal_id).await?;
            upsert_meal_line(&mut tx, order_id, line.meal_id, line.quantity, line.price).await?;
            delta = shift(delta, line_value(line.price, line.quantity)?)?;
        }

        // 4. Removed meals, credited at the line's stored price.
        for line in &request.remove_meals {
            validate_quantity(line.quantity)?;
            let credit = remove_meal_quantity(&mut tx, order_id, line.meal_id, line.quantity, options.meal_removal).await?;
            delta = shift(delta, -credit)?;
        }

        // 5. Running total.
        order.total_cents = shift(order.total(), delta)?.cents();
        order.gross_total_cents = shift(order.gross_total(), delta)?.cents();
        order.updated_at = now;
        write_totals(&mut tx, &order).await?;

        // 6. Payments.
        if let Some(lines) = request.payments.as_deref() {
            match options.payment_check {
                PaymentCheck::Skip => {}
                PaymentCheck::Enforce => {
                    validate_tender(order.total(), lines)?;
                }
            }
            payment::replace_all(&mut tx, order_id, lines).await?;
        }

        tx.commit().await?;

        info!(
            order_id,
            delta = %delta,
            total = %order.total(),
            sold = sold_units.len(),
            released = released_units.len(),
            "Order amended"
        );

        Ok(AmendReceipt {
            order,
            sold_units,
            released_units,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an order by ID.
    pub async fn get(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    /// The order with its units, meal lines and payments.
    pub async fn details(&self, order_id: &str) -> DbResult<OrderDetails> {
        validate_uuid("order_id", order_id)?;
        let mut conn = self.pool.acquire().await?;

        let order = fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;
        let tickets = ticket::list_for_order(&mut conn, order_id).await?;
        let meals = meal_lines(&mut conn, order_id).await?;
        let payments = payment::list_for(&mut conn, order_id).await?;

        Ok(OrderDetails {
            order,
            tickets,
            meals,
            payments,
        })
    }

    /// Orders created in `[start, end)`, oldest first.
    pub async fn list_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at, id"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        debug!(%start, %end, count = orders.len(), "Listed orders");
        Ok(orders)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn new_order(user_id: String, description: Option<String>, settlement: &Settlement) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4().to_string(),
        user_id,
        description,
        total_cents: settlement.final_total.cents(),
        gross_total_cents: settlement.gross_total.cents(),
        discount_cents: settlement.discount.cents(),
        created_at: now,
        updated_at: now,
    }
}

/// `total + amount`, or a validation error when it leaves the `i64` range.
fn shift(total: Money, amount: Money) -> Result<Money, ValidationError> {
    total
        .checked_add(amount)
        .ok_or_else(|| ValidationError::overflow("order total"))
}

fn check_quantities(quantities: impl Iterator<Item = i64>) -> Result<(), ValidationError> {
    // Non-positive lines are dropped by pricing; only the cap is checked here.
    for qty in quantities.filter(|q| *q > 0) {
        validate_quantity(qty)?;
    }
    Ok(())
}

fn ensure_sellable(priced: &PricedBasket) -> Result<(), ValidationError> {
    log_dropped(priced);
    if priced.is_empty() {
        return Err(ValidationError::Empty {
            what: "tickets or meals".to_string(),
            action: "sell".to_string(),
        });
    }
    Ok(())
}

fn log_dropped(priced: &PricedBasket) {
    for line in &priced.dropped {
        warn!(kind = ?line.kind, id = line.id, quantity = line.quantity, reason = ?line.reason, "Basket line dropped");
    }
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, user_id, description,
            total_cents, gross_total_cents, discount_cents,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&order.id)
    .bind(&order.user_id)
    .bind(&order.description)
    .bind(order.total_cents)
    .bind(order.gross_total_cents)
    .bind(order.discount_cents)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn write_totals(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET total_cents = ?1, gross_total_cents = ?2, discount_cents = ?3, updated_at = ?4
        WHERE id = ?5
        "#,
    )
    .bind(order.total_cents)
    .bind(order.gross_total_cents)
    .bind(order.discount_cents)
    .bind(order.updated_at)
    .bind(&order.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_meal_lines(conn: &mut SqliteConnection, order_id: &str, lines: &[PricedMealLine]) -> DbResult<()> {
    for line in lines {
        upsert_meal_line(conn, order_id, line.meal_id, line.quantity, line.unit_price).await?;
    }
    Ok(())
}

/// Adds `quantity` to the order's line for a meal, creating it at `price`
/// when missing. An existing line keeps its stored price.
async fn upsert_meal_line(
    conn: &mut SqliteConnection,
    order_id: &str,
    meal_id: i64,
    quantity: i64,
    price: UnitPrice,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_meals (order_id, meal_id, quantity, price_at_order_e4)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (order_id, meal_id) DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(order_id)
    .bind(meal_id)
    .bind(quantity)
    .bind(price.e4())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Takes `quantity` off a meal line and returns the amount to credit.
///
/// The line is deleted once nothing is left on it. With
/// [`MealRemoval::Unclamped`] the credit covers the full requested quantity
/// even when the line held fewer.
async fn remove_meal_quantity(
    conn: &mut SqliteConnection,
    order_id: &str,
    meal_id: i64,
    quantity: i64,
    mode: MealRemoval,
) -> DbResult<Money> {
    let line: Option<(i64, i64)> =
        sqlx::query_as("SELECT quantity, price_at_order_e4 FROM order_meals WHERE order_id = ?1 AND meal_id = ?2")
            .bind(order_id)
            .bind(meal_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((held, price_e4)) = line else {
        debug!(order_id, meal_id, "No meal line to remove from");
        return Ok(Money::zero());
    };

    let remaining = held - quantity;
    if remaining <= 0 {
        sqlx::query("DELETE FROM order_meals WHERE order_id = ?1 AND meal_id = ?2")
            .bind(order_id)
            .bind(meal_id)
            .execute(&mut *conn)
            .await?;
    } else {
        sqlx::query("UPDATE order_meals SET quantity = ?1 WHERE order_id = ?2 AND meal_id = ?3")
            .bind(remaining)
            .bind(order_id)
            .bind(meal_id)
            .execute(&mut *conn)
            .await?;
    }

    let credited = match mode {
        MealRemoval::Unclamped => quantity,
        MealRemoval::Clamped => quantity.min(held),
    };
    if credited != quantity.min(held) {
        warn!(order_id, meal_id, held, requested = quantity, "Meal removal credited past the line quantity");
    }

    Ok(line_value(UnitPrice::from_e4(price_e4), credited)?)
}

async fn ensure_meal_exists(conn: &mut SqliteConnection, meal_id: i64) -> DbResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM meals WHERE id = ?1")
        .bind(meal_id)
        .fetch_optional(&mut *conn)
        .await?;
    match exists {
        Some(_) => Ok(()),
        None => Err(CoreError::not_found("Meal", meal_id).into()),
    }
}

async fn meal_lines(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderMealLine>> {
    let lines = sqlx::query_as::<_, OrderMealLine>(
        r#"
        SELECT order_id, meal_id, quantity, price_at_order_e4
        FROM order_meals
        WHERE order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(lines)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{meal, memory_db, ticket_type};
    use crate::Database;
    use turnstile_core::{AmendMealLine, Basket, MealLine, PaymentLine, PaymentMethod, TicketLine, TicketStatus};

    fn cash(cents: i64) -> PaymentLine {
        PaymentLine::new(PaymentMethod::Cash, Money::from_cents(cents))
    }

    fn tickets(ticket_type_id: i64, quantity: i64) -> Basket {
        Basket {
            tickets: vec![TicketLine {
                ticket_type_id,
                quantity,
            }],
            meals: vec![],
        }
    }

    fn checkout(basket: Basket, payments: Vec<PaymentLine>) -> CheckoutNewRequest {
        CheckoutNewRequest {
            user_id: Some("buyer-1".to_string()),
            description: Some("Saturday visit".to_string()),
            basket,
            payments: Some(payments),
        }
    }

    async fn order_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn units_of(db: &Database, order_id: &str) -> Vec<turnstile_core::TicketUnit> {
        db.tickets().list_for_order(order_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_checkout_new_two_tickets_cash() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let receipt = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), vec![cash(10_000)]))
            .await
            .unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(10_000));
        assert_eq!(receipt.order.gross_total(), Money::from_cents(10_000));
        assert_eq!(receipt.order.description.as_deref(), Some("Saturday visit"));

        let units = units_of(&db, &receipt.order.id).await;
        assert_eq!(units.len(), 2);
        for unit in &units {
            assert_eq!(unit.status, TicketStatus::Sold);
            assert_eq!(unit.sold_price(), Some(UnitPrice::from_cents(5000)));
            assert!(unit.sold_at.is_some());
        }

        let stored = db.orders().get(&receipt.order.id).await.unwrap().unwrap();
        assert_eq!(stored, receipt.order);
    }

    #[tokio::test]
    async fn test_checkout_from_json_request() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let request: CheckoutNewRequest = serde_json::from_value(serde_json::json!({
            "user_id": "kiosk-2",
            "basket": { "tickets": [{ "ticket_type_id": t1.id, "quantity": 1 }] },
            "payments": [{ "method": "card", "amount": 5000 }]
        }))
        .unwrap();

        let receipt = db.orders().checkout_new(request).await.unwrap();
        assert_eq!(receipt.order.user_id, "kiosk-2");
        assert!(receipt.order.description.is_none());

        let stored = db.payments().list_for(&receipt.order.id).await.unwrap();
        assert_eq!(stored[0].method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_checkout_new_with_discount() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let payments = vec![
            cash(8_000),
            PaymentLine::new(PaymentMethod::Discount, Money::from_cents(2_000)),
        ];
        let receipt = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), payments.clone()))
            .await
            .unwrap();

        assert_eq!(receipt.settlement.gross_total, Money::from_cents(10_000));
        assert_eq!(receipt.settlement.discount, Money::from_cents(2_000));
        assert_eq!(receipt.settlement.final_total, Money::from_cents(8_000));
        assert_eq!(receipt.order.total(), Money::from_cents(8_000));
        assert_eq!(receipt.order.discount(), Money::from_cents(2_000));

        let stored: Vec<PaymentLine> = db
            .payments()
            .list_for(&receipt.order.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.as_line())
            .collect();
        assert_eq!(stored, payments);
    }

    #[tokio::test]
    async fn test_checkout_new_rejects_postponed_combination() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let payments = vec![
            PaymentLine::new(PaymentMethod::Postponed, Money::from_cents(10_000)),
            cash(0),
        ];
        let err = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), payments))
            .await
            .unwrap_err();

        assert!(matches!(err.as_domain(), Some(CoreError::InvalidPaymentCombination)));
        assert_eq!(order_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_checkout_new_mismatch_leaves_nothing_behind() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let err = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), vec![cash(9_999)]))
            .await
            .unwrap_err();

        match err.as_domain() {
            Some(CoreError::AmountMismatch { tendered, expected }) => {
                assert_eq!(*tendered, Money::from_cents(9_999));
                assert_eq!(*expected, Money::from_cents(10_000));
            }
            other => panic!("expected AmountMismatch, got {other:?}"),
        }
        assert_eq!(order_count(&db).await, 0);
        assert_eq!(db.tickets().count(t1.id, TicketStatus::Sold).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checkout_new_two_stage_rounding() {
        let db = memory_db().await;
        let t1 = db
            .catalog()
            .add_ticket_type("T1", "standard", None, UnitPrice::from_e4(100_050))
            .await
            .unwrap();
        let soup = db
            .catalog()
            .add_meal("Soup", None, UnitPrice::from_e4(40_040))
            .await
            .unwrap();

        let basket = Basket {
            tickets: vec![TicketLine {
                ticket_type_id: t1.id,
                quantity: 1,
            }],
            meals: vec![MealLine {
                meal_id: soup.id,
                quantity: 1,
            }],
        };
        let receipt = db
            .orders()
            .checkout_new(checkout(basket, vec![cash(1_401)]))
            .await
            .unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(1_401));
        let details = db.orders().details(&receipt.order.id).await.unwrap();
        assert_eq!(details.meals.len(), 1);
        assert_eq!(details.meals[0].price_at_order(), UnitPrice::from_e4(40_040));
    }

    #[tokio::test]
    async fn test_checkout_new_validation() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let orders = db.orders();

        let mut no_buyer = checkout(tickets(t1.id, 1), vec![cash(5_000)]);
        no_buyer.user_id = Some("   ".to_string());
        let mut no_payments = checkout(tickets(t1.id, 1), vec![]);
        no_payments.payments = None;
        let nothing_sellable = checkout(tickets(404, 1), vec![cash(5_000)]);
        let all_empty = checkout(Basket::default(), vec![]);

        for request in [no_buyer, no_payments, nothing_sellable, all_empty] {
            let err = orders.checkout_new(request).await.unwrap_err();
            assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))), "{err}");
        }
        assert_eq!(order_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_checkout_new_drops_unsellable_lines() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let old = ticket_type(&db, "Old", 1000).await;
        db.catalog().archive_ticket_type(old.id).await.unwrap();

        let basket = Basket {
            tickets: vec![
                TicketLine {
                    ticket_type_id: t1.id,
                    quantity: 1,
                },
                TicketLine {
                    ticket_type_id: old.id,
                    quantity: 3,
                },
                TicketLine {
                    ticket_type_id: t1.id,
                    quantity: 0,
                },
            ],
            meals: vec![],
        };
        let receipt = db
            .orders()
            .checkout_new(checkout(basket, vec![cash(5_000)]))
            .await
            .unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(5_000));
        assert_eq!(units_of(&db, &receipt.order.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_existing() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let coffee = meal(&db, "Coffee", 250).await;
        let ids = db.tickets().generate(t1.id, 2).await.unwrap();

        let receipt = db
            .orders()
            .checkout_existing(CheckoutExistingRequest {
                unit_ids: ids.clone(),
                user_id: Some("buyer-2".to_string()),
                description: None,
                meals: vec![MealLine {
                    meal_id: coffee,
                    quantity: 2,
                }],
                payments: Some(vec![cash(10_500)]),
            })
            .await
            .unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(10_500));
        let stored = db.orders().get(&receipt.order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 10_500);

        let units = units_of(&db, &receipt.order.id).await;
        assert_eq!(units.iter().map(|u| u.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn test_checkout_existing_conflict_rejects_whole_batch() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let ids = db.tickets().generate(t1.id, 2).await.unwrap();

        let request = |unit_ids: Vec<i64>, cents: i64| CheckoutExistingRequest {
            unit_ids,
            user_id: Some("buyer".to_string()),
            payments: Some(vec![cash(cents)]),
            ..Default::default()
        };

        db.orders().checkout_existing(request(vec![ids[1]], 5_000)).await.unwrap();

        let err = db
            .orders()
            .checkout_existing(request(ids.clone(), 10_000))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(order_count(&db).await, 1);

        let first = db.tickets().get(ids[0]).await.unwrap().unwrap();
        assert!(first.is_sellable());

        // A payment mismatch rolls the sale back too.
        let err = db
            .orders()
            .checkout_existing(request(vec![ids[0]], 1))
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::AmountMismatch { .. })));
        assert!(db.tickets().get(ids[0]).await.unwrap().unwrap().is_sellable());
    }

    #[tokio::test]
    async fn test_amend_add_then_remove_ticket() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), vec![cash(10_000)]))
            .await
            .unwrap()
            .order;

        let added = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    add_tickets: vec![TicketLine {
                        ticket_type_id: t1.id,
                        quantity: 1,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(added.order.total(), Money::from_cents(15_000));
        assert_eq!(added.order.gross_total(), Money::from_cents(15_000));
        assert_eq!(added.sold_units.len(), 1);
        assert_eq!(units_of(&db, &order.id).await.len(), 3);

        let removed = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    remove_tickets: vec![TicketLine {
                        ticket_type_id: t1.id,
                        quantity: 1,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(removed.order.total(), Money::from_cents(10_000));
        assert_eq!(removed.released_units.len(), 1);
        assert_eq!(units_of(&db, &order.id).await.len(), 2);

        let released = db.tickets().get(removed.released_units[0]).await.unwrap().unwrap();
        assert_eq!(released.status, TicketStatus::Available);
        assert!(released.order_id.is_none());

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total(), Money::from_cents(10_000));
    }

    #[tokio::test]
    async fn test_amend_unknown_order() {
        let db = memory_db().await;
        let err = db
            .orders()
            .amend(&Uuid::new_v4().to_string(), AmendRequest::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_order_id() {
        let db = memory_db().await;

        let err = db
            .orders()
            .amend("order-17", AmendRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));

        let err = db.orders().details("").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_amend_failure_rolls_back_earlier_steps() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;

        let err = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    add_tickets: vec![
                        TicketLine {
                            ticket_type_id: t1.id,
                            quantity: 2,
                        },
                        TicketLine {
                            ticket_type_id: 404,
                            quantity: 1,
                        },
                    ],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(units_of(&db, &order.id).await.len(), 1);
        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total(), Money::from_cents(5_000));
    }

    #[tokio::test]
    async fn test_checkout_new_rejects_oversized_payment_line() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;

        let payments = vec![cash(i64::MAX), PaymentLine::new(PaymentMethod::Card, Money::from_cents(1))];
        let err = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), payments))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert_eq!(order_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_amend_rejects_meal_price_above_cap() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let soup = meal(&db, "Soup", 400).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;

        let err = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    add_meals: vec![AmendMealLine {
                        meal_id: soup,
                        quantity: 3,
                        price: UnitPrice::from_e4(i64::MAX / 2),
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
        let details = db.orders().details(&order.id).await.unwrap();
        assert!(details.meals.is_empty());
        assert_eq!(details.order.total(), Money::from_cents(5_000));
    }

    #[tokio::test]
    async fn test_amend_remove_tickets_beyond_line_cap() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), vec![cash(10_000)]))
            .await
            .unwrap()
            .order;

        let receipt = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    remove_tickets: vec![TicketLine {
                        ticket_type_id: t1.id,
                        quantity: turnstile_core::MAX_LINE_QUANTITY * 5,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.released_units.len(), 2);
        assert!(receipt.order.total().is_zero());
        assert!(units_of(&db, &order.id).await.is_empty());

        let err = db
            .orders()
            .amend(
                &order.id,
                AmendRequest {
                    remove_tickets: vec![TicketLine {
                        ticket_type_id: t1.id,
                        quantity: 0,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_amend_meal_lines_increment() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let soup = meal(&db, "Soup", 400).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;

        for price_cents in [350, 500] {
            db.orders()
                .amend(
                    &order.id,
                    AmendRequest {
                        add_meals: vec![AmendMealLine {
                            meal_id: soup,
                            quantity: 2,
                            price: UnitPrice::from_cents(price_cents),
                        }],
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let details = db.orders().details(&order.id).await.unwrap();
        assert_eq!(details.meals.len(), 1);
        assert_eq!(details.meals[0].quantity, 4);
        // The first addition fixed the line price.
        assert_eq!(details.meals[0].price_at_order(), UnitPrice::from_cents(350));
        // Each addition is credited at its own request price.
        assert_eq!(details.order.total(), Money::from_cents(5_000 + 700 + 1_000));
    }

    async fn order_with_one_soup(db: &Database) -> (String, i64) {
        let t1 = ticket_type(db, "T1", 5000).await;
        let soup = meal(db, "Soup", 500).await;
        let basket = Basket {
            tickets: vec![TicketLine {
                ticket_type_id: t1.id,
                quantity: 1,
            }],
            meals: vec![MealLine {
                meal_id: soup,
                quantity: 1,
            }],
        };
        let order = db
            .orders()
            .checkout_new(checkout(basket, vec![cash(5_500)]))
            .await
            .unwrap()
            .order;
        (order.id, soup)
    }

    fn remove_soup(soup: i64, quantity: i64) -> AmendRequest {
        AmendRequest {
            remove_meals: vec![MealLine { meal_id: soup, quantity }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_amend_meal_removal_unclamped() {
        let db = memory_db().await;
        let (order_id, soup) = order_with_one_soup(&db).await;

        let receipt = db.orders().amend(&order_id, remove_soup(soup, 3)).await.unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(5_500 - 1_500));
        assert!(db.orders().details(&order_id).await.unwrap().meals.is_empty());
    }

    #[tokio::test]
    async fn test_amend_meal_removal_clamped() {
        let db = memory_db().await;
        let (order_id, soup) = order_with_one_soup(&db).await;
        let options = AmendOptions {
            meal_removal: MealRemoval::Clamped,
            ..Default::default()
        };

        let receipt = db
            .orders()
            .amend_with(&order_id, remove_soup(soup, 3), options)
            .await
            .unwrap();

        assert_eq!(receipt.order.total(), Money::from_cents(5_000));
        assert!(db.orders().details(&order_id).await.unwrap().meals.is_empty());
    }

    #[tokio::test]
    async fn test_amend_payments_skip_and_enforce() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;

        let add_one = |payments: Vec<PaymentLine>| AmendRequest {
            add_tickets: vec![TicketLine {
                ticket_type_id: t1.id,
                quantity: 1,
            }],
            payments: Some(payments),
            ..Default::default()
        };

        // Default options store payments verbatim.
        db.orders().amend(&order.id, add_one(vec![cash(1)])).await.unwrap();
        let stored = db.payments().list_for(&order.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount(), Money::from_cents(1));

        let enforcing = db.orders().with_amend_defaults(AmendOptions {
            payment_check: PaymentCheck::Enforce,
            ..Default::default()
        });

        let err = enforcing.amend(&order.id, add_one(vec![cash(1)])).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::AmountMismatch { .. })));
        let unchanged = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(unchanged.total(), Money::from_cents(10_000));

        let receipt = enforcing
            .amend(&order.id, add_one(vec![cash(10_000), cash(5_000)]))
            .await
            .unwrap();
        assert_eq!(receipt.order.total(), Money::from_cents(15_000));
        assert_eq!(db.payments().list_for(&order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refund_credits_order_total() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let order = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 2), vec![cash(10_000)]))
            .await
            .unwrap()
            .order;
        let units = units_of(&db, &order.id).await;

        let outcome = db.tickets().refund(&[units[0].id]).await.unwrap();
        assert_eq!(outcome.refunded, vec![units[0].id]);

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total(), Money::from_cents(5_000));
        assert_eq!(stored.gross_total(), Money::from_cents(5_000));
        assert_eq!(units_of(&db, &order.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_between() {
        let db = memory_db().await;
        let t1 = ticket_type(&db, "T1", 5000).await;
        let before = Utc::now();

        let first = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;
        let second = db
            .orders()
            .checkout_new(checkout(tickets(t1.id, 1), vec![cash(5_000)]))
            .await
            .unwrap()
            .order;

        let after = Utc::now() + chrono::Duration::seconds(1);
        let listed = db.orders().list_between(before, after).await.unwrap();
        assert_eq!(listed.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(), [first.id.as_str(), second.id.as_str()]);

        let empty = db
            .orders()
            .list_between(after, after + chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
