//! # Seed Catalog
//!
//! Populates a ledger database with a demo dive-shop catalog.
//!
//! ## Usage
//! ```bash
//! # Seed ./nautilus_dev.db with every demo item
//! cargo run -p nautilus-ledger --bin seed
//!
//! # Custom path, first 20 items only
//! cargo run -p nautilus-ledger --bin seed -- --db ./data/shop.db --count 20
//! ```
//!
//! ## Generated Items
//! - Products: masks, fins, computers, logbooks (stock 5 - 40)
//! - Course seats: Open Water, Advanced, Rescue, Nitrox (6 - 8 seats)
//! - Rental units: BCDs, regulators, wetsuits, tanks
//! - Trip slots: boat dives and a liveaboard (10 - 16 spots)
//!
//! Course seats and trip slots are not taxable; everything else is.

use chrono::Utc;
use std::env;
use tracing::{info, warn};

use nautilus_core::{CatalogItem, ItemKind};
use nautilus_db::{Database, DbConfig};

/// (kind, sku prefix, name, price cents, capacity, taxable)
const CATALOG: &[(ItemKind, &str, &str, i64, i64, bool)] = &[
    (ItemKind::Product, "MSK", "Low Volume Mask", 6_999, 24, true),
    (ItemKind::Product, "FIN", "Open Heel Fins", 12_999, 18, true),
    (ItemKind::Product, "SNK", "Dry Snorkel", 3_499, 40, true),
    (ItemKind::Product, "CMP", "Dive Computer", 44_999, 5, true),
    (ItemKind::Product, "LOG", "Logbook", 1_999, 30, true),
    (ItemKind::Product, "DFG", "Defog Gel", 899, 36, true),
    (ItemKind::CourseSeat, "OW", "Open Water Diver", 49_900, 8, false),
    (ItemKind::CourseSeat, "AOW", "Advanced Open Water", 39_900, 8, false),
    (ItemKind::CourseSeat, "RES", "Rescue Diver", 44_900, 6, false),
    (ItemKind::CourseSeat, "NTX", "Enriched Air Nitrox", 19_900, 8, false),
    (ItemKind::RentalUnit, "BCD", "BCD Rental (day)", 2_500, 12, true),
    (ItemKind::RentalUnit, "REG", "Regulator Rental (day)", 3_000, 12, true),
    (ItemKind::RentalUnit, "WET", "5mm Wetsuit Rental (day)", 1_500, 20, true),
    (ItemKind::RentalUnit, "TNK", "Aluminum 80 Tank Fill", 1_000, 30, true),
    (ItemKind::TripSlot, "2TK", "Two Tank Boat Dive", 14_000, 16, false),
    (ItemKind::TripSlot, "NGT", "Night Dive", 9_500, 10, false),
    (ItemKind::TripSlot, "WRK", "Wreck Dive", 16_500, 12, false),
    (ItemKind::TripSlot, "LVB", "Liveaboard Weekend", 89_900, 10, false),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    nautilus_ledger::init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = CATALOG.len();
    let mut db_path = String::from("./nautilus_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(CATALOG.len());
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Nautilus Seed Catalog");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of catalog items (default: {})", CATALOG.len());
                println!("  -d, --db <PATH>    Database file path (default: ./nautilus_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(db = %db_path, "Connected, migrations applied");

    let existing = db.catalog().count().await?;
    if existing > 0 {
        warn!(existing, "Catalog already seeded; delete the database file to regenerate");
        return Ok(());
    }

    let mut seeded = 0;
    for (index, entry) in CATALOG.iter().take(count).enumerate() {
        let item = catalog_item(entry, index);
        if let Err(e) = db.catalog().insert(&item).await {
            warn!(sku = %item.sku, error = %e, "Failed to insert catalog item");
            continue;
        }
        seeded += 1;
    }

    for kind in [
        ItemKind::Product,
        ItemKind::CourseSeat,
        ItemKind::RentalUnit,
        ItemKind::TripSlot,
    ] {
        let items = db.catalog().list_by_kind(kind).await?;
        info!(kind = %kind, count = items.len(), "Seeded");
    }

    info!(seeded, "Seed complete");
    db.close().await;
    Ok(())
}

fn catalog_item(
    &(kind, prefix, name, price_cents, capacity, taxable): &(ItemKind, &str, &str, i64, i64, bool),
    index: usize,
) -> CatalogItem {
    let now = Utc::now();

    CatalogItem {
        kind,
        ref_id: format!("{}-{:03}", kind, index + 1),
        sku: format!("{}-{:03}", prefix, index + 1),
        name: name.to_string(),
        unit_price_cents: price_cents,
        available_quantity: capacity,
        taxable,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
