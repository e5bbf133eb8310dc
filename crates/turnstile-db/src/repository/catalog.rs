//! # Catalog Repository
//!
//! Ticket types and meals: the shared, read-mostly reference data the
//! settlement engine prices against.
//!
//! ## Price Lookups
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ticket_type_price(id)      → UnitPrice | NotFound                     │
//! │  meal_price(id)             → UnitPrice | NotFound                     │
//! │  ticket_type_prices(ids)    → { id → UnitPrice }  (missing ids absent) │
//! │  meal_prices(ids)           → { id → UnitPrice }                       │
//! │                                                                         │
//! │  Archived entries are invisible to every lookup: they cannot be sold.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Prices are not versioned. Repricing never touches sold units or stored
//! meal lines; those keep their snapshots.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use turnstile_core::validation::{validate_name, validate_price};
use turnstile_core::{CatalogPrices, CoreError, MealType, TicketType, UnitPrice};

use crate::error::{DbError, DbResult};

// =============================================================================
// Lookups (inside a caller's transaction)
// =============================================================================

/// Current price of a sellable ticket type.
pub async fn ticket_type_price(conn: &mut SqliteConnection, id: i64) -> DbResult<UnitPrice> {
    let price: Option<i64> = sqlx::query_scalar("SELECT price_e4 FROM ticket_types WHERE id = ? AND archived = 0")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    price
        .map(UnitPrice::from_e4)
        .ok_or_else(|| CoreError::not_found("TicketType", id).into())
}

/// Current price of a sellable meal.
pub async fn meal_price(conn: &mut SqliteConnection, id: i64) -> DbResult<UnitPrice> {
    let price: Option<i64> = sqlx::query_scalar("SELECT price_e4 FROM meals WHERE id = ? AND archived = 0")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    price
        .map(UnitPrice::from_e4)
        .ok_or_else(|| CoreError::not_found("Meal", id).into())
}

/// Batched ticket type prices. Unknown and archived ids are left out.
pub async fn ticket_type_prices(conn: &mut SqliteConnection, ids: &[i64]) -> DbResult<HashMap<i64, UnitPrice>> {
    prices_in(conn, "ticket_types", ids).await
}

/// Batched meal prices. Unknown and archived ids are left out.
pub async fn meal_prices(conn: &mut SqliteConnection, ids: &[i64]) -> DbResult<HashMap<i64, UnitPrice>> {
    prices_in(conn, "meals", ids).await
}

/// Prices for every ticket type and meal a basket references.
pub async fn catalog_prices(
    conn: &mut SqliteConnection,
    ticket_type_ids: &[i64],
    meal_ids: &[i64],
) -> DbResult<CatalogPrices> {
    Ok(CatalogPrices {
        tickets: ticket_type_prices(conn, ticket_type_ids).await?,
        meals: meal_prices(conn, meal_ids).await?,
    })
}

async fn prices_in(conn: &mut SqliteConnection, table: &'static str, ids: &[i64]) -> DbResult<HashMap<i64, UnitPrice>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, price_e4 FROM ");
    qb.push(table).push(" WHERE archived = 0 AND id IN (");
    let mut ids_sep = qb.separated(", ");
    for id in ids {
        ids_sep.push_bind(*id);
    }
    ids_sep.push_unseparated(")");

    let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;

    debug!(table, requested = ids.len(), found = rows.len(), "Batched price lookup");

    Ok(rows
        .into_iter()
        .map(|(id, e4)| (id, UnitPrice::from_e4(e4)))
        .collect())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog operations.
///
/// ## Usage
/// ```rust,ignore
/// let adult = db.catalog()
///     .add_ticket_type("Adult", "Day pass", None, "50.00".parse()?)
///     .await?;
/// let price = db.catalog().ticket_type_price(adult.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    pub async fn ticket_type_price(&self, id: i64) -> DbResult<UnitPrice> {
        let mut conn = self.pool.acquire().await?;
        ticket_type_price(&mut conn, id).await
    }

    pub async fn meal_price(&self, id: i64) -> DbResult<UnitPrice> {
        let mut conn = self.pool.acquire().await?;
        meal_price(&mut conn, id).await
    }

    pub async fn ticket_type_prices(&self, ids: &[i64]) -> DbResult<HashMap<i64, UnitPrice>> {
        let mut conn = self.pool.acquire().await?;
        ticket_type_prices(&mut conn, ids).await
    }

    pub async fn meal_prices(&self, ids: &[i64]) -> DbResult<HashMap<i64, UnitPrice>> {
        let mut conn = self.pool.acquire().await?;
        meal_prices(&mut conn, ids).await
    }

    // =========================================================================
    // Ticket Types
    // =========================================================================

    /// Adds a ticket type. `(category, subcategory)` must be unique.
    pub async fn add_ticket_type(
        &self,
        category: &str,
        subcategory: &str,
        description: Option<&str>,
        price: UnitPrice,
    ) -> DbResult<TicketType> {
        validate_name("category", category)?;
        validate_name("subcategory", subcategory)?;
        validate_price(price)?;

        let now = Utc::now();
        let category = category.trim();
        let subcategory = subcategory.trim();

        let result = sqlx::query(
            r#"
            INSERT INTO ticket_types (category, subcategory, description, price_e4, archived, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(category)
        .bind(subcategory)
        .bind(description)
        .bind(price.e4())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: format!("{category}/{subcategory}"),
            },
            other => other,
        })?;

        let id = result.last_insert_rowid();
        info!(id, category, subcategory, price = %price, "Ticket type added");

        Ok(TicketType {
            id,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            description: description.map(str::to_string),
            price_e4: price.e4(),
            archived: false,
            created_at: now,
        })
    }

    /// Gets a ticket type by ID, archived or not.
    pub async fn get_ticket_type(&self, id: i64) -> DbResult<Option<TicketType>> {
        let row = sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, category, subcategory, description, price_e4, archived, created_at
            FROM ticket_types
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists ticket types by category and subcategory.
    pub async fn list_ticket_types(&self, include_archived: bool) -> DbResult<Vec<TicketType>> {
        let rows = sqlx::query_as::<_, TicketType>(
            r#"
            SELECT id, category, subcategory, description, price_e4, archived, created_at
            FROM ticket_types
            WHERE archived = 0 OR ?1
            ORDER BY category, subcategory
            "#,
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Changes the current price. Sold units keep their snapshot.
    pub async fn reprice_ticket_type(&self, id: i64, price: UnitPrice) -> DbResult<()> {
        validate_price(price)?;
        self.update_one("ticket_types", "TicketType", id, Some(price), None).await
    }

    /// Withdraws a ticket type from sale.
    pub async fn archive_ticket_type(&self, id: i64) -> DbResult<()> {
        self.update_one("ticket_types", "TicketType", id, None, Some(true)).await
    }

    // =========================================================================
    // Meals
    // =========================================================================

    /// Adds a meal. Names are unique.
    pub async fn add_meal(&self, name: &str, description: Option<&str>, price: UnitPrice) -> DbResult<MealType> {
        validate_name("name", name)?;
        validate_price(price)?;

        let now = Utc::now();
        let name = name.trim();

        let result = sqlx::query(
            r#"
            INSERT INTO meals (name, description, price_e4, archived, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(price.e4())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, name, price = %price, "Meal added");

        Ok(MealType {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            price_e4: price.e4(),
            archived: false,
            created_at: now,
        })
    }

    pub async fn get_meal(&self, id: i64) -> DbResult<Option<MealType>> {
        let row = sqlx::query_as::<_, MealType>(
            "SELECT id, name, description, price_e4, archived, created_at FROM meals WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_meals(&self, include_archived: bool) -> DbResult<Vec<MealType>> {
        let rows = sqlx::query_as::<_, MealType>(
            r#"
            SELECT id, name, description, price_e4, archived, created_at
            FROM meals
            WHERE archived = 0 OR ?1
            ORDER BY name
            "#,
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Changes the current meal price. Stored order lines keep theirs.
    pub async fn reprice_meal(&self, id: i64, price: UnitPrice) -> DbResult<()> {
        validate_price(price)?;
        self.update_one("meals", "Meal", id, Some(price), None).await
    }

    pub async fn archive_meal(&self, id: i64) -> DbResult<()> {
        self.update_one("meals", "Meal", id, None, Some(true)).await
    }

    async fn update_one(
        &self,
        table: &'static str,
        entity: &'static str,
        id: i64,
        price: Option<UnitPrice>,
        archived: Option<bool>,
    ) -> DbResult<()> {
        let sql = format!(
            "UPDATE {table} SET price_e4 = COALESCE(?1, price_e4), archived = COALESCE(?2, archived) WHERE id = ?3"
        );

        let result = sqlx::query(&sql)
            .bind(price.map(|p| p.e4()))
            .bind(archived)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(entity, id));
        }

        debug!(table, id, ?price, ?archived, "Catalog entry updated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{meal, memory_db, ticket_type};

    #[tokio::test]
    async fn test_price_lookups() {
        let db = memory_db().await;
        let adult = ticket_type(&db, "Adult", 5000).await;
        let soup = meal(&db, "Soup", 450).await;

        let catalog = db.catalog();
        assert_eq!(catalog.ticket_type_price(adult.id).await.unwrap(), UnitPrice::from_cents(5000));
        assert_eq!(catalog.meal_price(soup).await.unwrap(), UnitPrice::from_cents(450));

        let err = catalog.ticket_type_price(999).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_archived_entries_are_not_priced() {
        let db = memory_db().await;
        let adult = ticket_type(&db, "Adult", 5000).await;
        let child = ticket_type(&db, "Child", 2500).await;
        db.catalog().archive_ticket_type(child.id).await.unwrap();

        let prices = db
            .catalog()
            .ticket_type_prices(&[adult.id, child.id, 404])
            .await
            .unwrap();
        assert_eq!(prices.len(), 1);
        assert!(prices.contains_key(&adult.id));

        assert!(db.catalog().ticket_type_price(child.id).await.unwrap_err().is_not_found());
        assert!(db.catalog().get_ticket_type(child.id).await.unwrap().unwrap().archived);
        assert_eq!(db.catalog().list_ticket_types(false).await.unwrap().len(), 1);
        assert_eq!(db.catalog().list_ticket_types(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sub_cent_prices_are_stored_exactly() {
        let db = memory_db().await;
        let price: UnitPrice = "10.005".parse().unwrap();
        let t = db
            .catalog()
            .add_ticket_type("Senior", "Evening", Some("after 18:00"), price)
            .await
            .unwrap();

        assert_eq!(db.catalog().ticket_type_price(t.id).await.unwrap().e4(), 100_050);
    }

    #[tokio::test]
    async fn test_duplicate_ticket_type_rejected() {
        let db = memory_db().await;
        ticket_type(&db, "Adult", 5000).await;

        let err = db
            .catalog()
            .add_ticket_type("Adult", "standard", None, UnitPrice::from_cents(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_reprice_and_validation() {
        let db = memory_db().await;
        let soup = meal(&db, "Soup", 450).await;

        db.catalog().reprice_meal(soup, UnitPrice::from_cents(500)).await.unwrap();
        assert_eq!(db.catalog().meal_price(soup).await.unwrap(), UnitPrice::from_cents(500));

        assert!(db.catalog().reprice_meal(soup, UnitPrice::from_e4(0)).await.is_err());
        assert!(db.catalog().reprice_meal(404, UnitPrice::from_cents(1)).await.unwrap_err().is_not_found());
        assert!(db.catalog().add_meal("  ", None, UnitPrice::from_cents(1)).await.is_err());
    }
}
