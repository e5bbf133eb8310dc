//! # Seed Data Generator
//!
//! Populates a development database with a venue catalog and ticket
//! inventory.
//!
//! ## Usage
//! ```bash
//! # Seed the database from turnstile.toml / TURNSTILE_DB_PATH
//! cargo run -p turnstile-db --bin seed
//!
//! # 500 pre-generated units per ticket type
//! cargo run -p turnstile-db --bin seed -- --units 500
//!
//! # Specify database path
//! cargo run -p turnstile-db --bin seed -- --db ./data/turnstile.db
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info,turnstile=debug,sqlx=warn`).

use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turnstile_core::{TicketStatus, UnitPrice};
use turnstile_db::{Database, Settings};

/// (category, subcategory, price in 1/10000)
const TICKET_TYPES: &[(&str, &str, i64)] = &[
    ("Adult", "Day pass", 500_000),
    ("Adult", "Evening", 350_000),
    ("Child", "Day pass", 250_000),
    ("Child", "Evening", 175_000),
    ("Senior", "Day pass", 300_000),
    ("Student", "Day pass", 325_000),
    ("Family", "2+2", 1_350_000),
    ("Group", "Per person", 420_050),
];

/// (name, price in 1/10000)
const MEALS: &[(&str, i64)] = &[
    ("Coffee", 25_000),
    ("Tea", 20_000),
    ("Soup of the day", 40_040),
    ("Sandwich", 65_000),
    ("Kids menu", 79_900),
    ("Ice cream", 35_000),
    ("Water", 15_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,turnstile=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut units: i64 = 200;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--units" | "-u" => {
                if i + 1 < args.len() {
                    units = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Turnstile Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -u, --units <N>    Units to generate per ticket type (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: from settings)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut settings = Settings::load_or_default(None);
    if let Some(path) = db_path {
        settings.database.path = path.into();
    }

    info!(path = %settings.database.path.display(), units, "Seeding database");

    let db = Database::new(settings.db_config()).await?;
    let catalog = db.catalog();

    if !catalog.list_ticket_types(true).await?.is_empty() {
        warn!("Catalog already has ticket types, skipping seed. Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    for (category, subcategory, price_e4) in TICKET_TYPES {
        let ticket_type = catalog
            .add_ticket_type(category, subcategory, None, UnitPrice::from_e4(*price_e4))
            .await?;

        // generate() caps a single call, so inventory is created in batches.
        let mut remaining = units;
        while remaining > 0 {
            let batch = remaining.min(turnstile_core::MAX_LINE_QUANTITY);
            db.tickets().generate(ticket_type.id, batch).await?;
            remaining -= batch;
        }

        let available = db.tickets().count(ticket_type.id, TicketStatus::Available).await?;
        info!(
            id = ticket_type.id,
            category,
            subcategory,
            price = %ticket_type.price(),
            available,
            "Ticket type seeded"
        );
    }

    for (name, price_e4) in MEALS {
        let meal = catalog.add_meal(name, None, UnitPrice::from_e4(*price_e4)).await?;
        info!(id = meal.id, name, price = %meal.price(), "Meal seeded");
    }

    info!(
        ticket_types = TICKET_TYPES.len(),
        meals = MEALS.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    db.close().await;
    Ok(())
}
