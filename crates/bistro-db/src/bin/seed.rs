//! # Demo Data Seeder
//!
//! Fills an empty database with a small Sri Lankan restaurant: menu
//! categories, dishes with recipes, ingredients, stock locations, opening
//! stock and the built-in VAT presets.
//!
//! ## Usage
//! ```bash
//! cargo run -p bistro-db --bin seed
//! cargo run -p bistro-db --bin seed -- --db ./data/bistro.db
//! ```
//!
//! Seeding is skipped when the database already has menu categories.

use std::collections::HashMap;
use std::env;

use anyhow::{anyhow, Context, Result};
use bistro_core::stock::{AdjustmentRequest, TransferLine};
use bistro_core::vat::VAT_PRESETS;
use bistro_core::{
    Category, Ingredient, Location, LocationKind, Product, StockIssueKind, StockMovementKind,
    TaxMode, Unit, VatSettings,
};
use bistro_db::{new_id, Database, DbConfig, NewStockIssue};
use chrono::Utc;

const CATEGORIES: &[&str] = &[
    "Rice & Curry",
    "Kottu",
    "Hoppers",
    "Short Eats",
    "Beverages",
    "Desserts",
];

/// (name, unit, reorder level, cost per kg / litre / piece in cents, opening stock)
const INGREDIENTS: &[(&str, Unit, i64, i64, i64)] = &[
    ("Samba Rice", Unit::Gram, 5_000, 320_00, 25_000),
    ("Chicken", Unit::Gram, 4_000, 1_450_00, 15_000),
    ("Dhal", Unit::Gram, 2_000, 480_00, 8_000),
    ("Coconut Milk", Unit::Millilitre, 2_000, 650_00, 10_000),
    ("Godamba Roti", Unit::Piece, 30, 40_00, 120),
    ("Eggs", Unit::Piece, 30, 55_00, 180),
    ("Rice Flour", Unit::Gram, 3_000, 260_00, 12_000),
    ("Vegetable Oil", Unit::Millilitre, 2_000, 900_00, 10_000),
    ("Tea Leaves", Unit::Gram, 500, 2_800_00, 2_000),
    ("Fresh Milk", Unit::Millilitre, 3_000, 520_00, 12_000),
    ("Sugar", Unit::Gram, 2_000, 300_00, 10_000),
    ("Buffalo Curd", Unit::Gram, 1_000, 1_100_00, 4_000),
    ("Kithul Treacle", Unit::Millilitre, 500, 2_400_00, 2_500),
];

/// (sku, name, category, price, cost, recipe)
type Dish = (
    &'static str,
    &'static str,
    &'static str,
    i64,
    i64,
    &'static [(&'static str, i64)],
);

const MENU: &[Dish] = &[
    (
        "RC-CHK",
        "Chicken Rice & Curry",
        "Rice & Curry",
        1_200_00,
        420_00,
        &[("Samba Rice", 250), ("Chicken", 150), ("Dhal", 50), ("Coconut Milk", 100)],
    ),
    (
        "RC-VEG",
        "Vegetable Rice & Curry",
        "Rice & Curry",
        850_00,
        260_00,
        &[("Samba Rice", 250), ("Dhal", 80), ("Coconut Milk", 120)],
    ),
    (
        "KT-CHK",
        "Chicken Kottu",
        "Kottu",
        1_350_00,
        480_00,
        &[("Godamba Roti", 2), ("Chicken", 120), ("Eggs", 1), ("Vegetable Oil", 30)],
    ),
    (
        "KT-EGG",
        "Egg Kottu",
        "Kottu",
        950_00,
        300_00,
        &[("Godamba Roti", 2), ("Eggs", 2), ("Vegetable Oil", 30)],
    ),
    (
        "HP-PLN",
        "Plain Hopper",
        "Hoppers",
        120_00,
        35_00,
        &[("Rice Flour", 40), ("Coconut Milk", 30)],
    ),
    (
        "HP-EGG",
        "Egg Hopper",
        "Hoppers",
        180_00,
        60_00,
        &[("Rice Flour", 40), ("Coconut Milk", 30), ("Eggs", 1)],
    ),
    (
        "SE-RLL",
        "Chicken Roll",
        "Short Eats",
        150_00,
        55_00,
        &[("Chicken", 30), ("Vegetable Oil", 15)],
    ),
    (
        "BV-TEA",
        "Plain Tea",
        "Beverages",
        100_00,
        20_00,
        &[("Tea Leaves", 3), ("Sugar", 10)],
    ),
    (
        "BV-MTE",
        "Milk Tea",
        "Beverages",
        180_00,
        45_00,
        &[("Tea Leaves", 3), ("Fresh Milk", 80), ("Sugar", 10)],
    ),
    (
        "DS-CRD",
        "Curd & Treacle",
        "Desserts",
        450_00,
        170_00,
        &[("Buffalo Curd", 200), ("Kithul Treacle", 40)],
    ),
];

/// Share of opening stock issued from the store to the kitchen, in percent.
const KITCHEN_ISSUE_PCT: i64 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./bistro_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bistro POS demo data seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./bistro_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Bistro POS seeder");
    println!("Database: {}", db_path);

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("opening database")?;

    let existing = db.categories().list(true).await?;
    if !existing.is_empty() {
        println!("Database already has {} categories, skipping.", existing.len());
        return Ok(());
    }

    let now = Utc::now();

    // Categories
    let mut category_ids = HashMap::new();
    for (idx, name) in CATEGORIES.iter().enumerate() {
        let category = Category {
            id: new_id(),
            name: name.to_string(),
            description: None,
            sort_order: idx as i64,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.categories().insert(&category).await?;
        category_ids.insert(*name, category.id);
    }
    println!("  {} categories", category_ids.len());

    // Ingredients
    let mut ingredient_ids = HashMap::new();
    for (name, unit, reorder_level, unit_cost_cents, _) in INGREDIENTS {
        let ingredient = Ingredient {
            id: new_id(),
            name: name.to_string(),
            unit: *unit,
            reorder_level: *reorder_level,
            unit_cost_cents: *unit_cost_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.ingredients().insert(&ingredient).await?;
        ingredient_ids.insert(*name, ingredient.id);
    }
    println!("  {} ingredients", ingredient_ids.len());

    // Menu and recipes
    for (sku, name, category, price_cents, cost_cents, recipe) in MENU {
        let product = Product {
            id: new_id(),
            sku: sku.to_string(),
            name: name.to_string(),
            description: None,
            category_id: category_ids.get(category).cloned(),
            price_cents: *price_cents,
            cost_cents: Some(*cost_cents),
            vat_applicable: true,
            is_available: true,
            track_inventory: true,
            is_active: true,
            created_at: now,
            updated_at: now,
            sync_version: 1,
        };
        db.products().insert(&product).await?;

        let lines = recipe
            .iter()
            .map(|(ingredient, qty)| {
                ingredient_ids
                    .get(ingredient)
                    .map(|id| (id.clone(), *qty))
                    .ok_or_else(|| anyhow!("recipe for {sku} uses unknown ingredient {ingredient}"))
            })
            .collect::<Result<Vec<_>>>()?;
        db.products().set_recipe(&product.id, &lines).await?;
    }
    println!("  {} menu items with recipes", MENU.len());

    // Locations
    let store = location("Main Store", LocationKind::Store);
    let kitchen = location("Hot Kitchen", LocationKind::Kitchen);
    let bar = location("Bar", LocationKind::Bar);
    for loc in [&store, &kitchen, &bar] {
        db.locations().insert(loc).await?;
    }
    println!("  3 locations");

    // Opening stock in the store, part of it issued to the kitchen
    let mut issue_lines = Vec::new();
    for (name, _, _, _, opening) in INGREDIENTS {
        let ingredient_id = ingredient_ids
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("missing ingredient {name}"))?;

        db.stock()
            .adjust(
                &AdjustmentRequest {
                    ingredient_id: ingredient_id.clone(),
                    location_id: store.id.clone(),
                    kind: StockMovementKind::Opening,
                    quantity: *opening,
                    notes: Some("Opening balance".to_string()),
                },
                "seed",
            )
            .await?;

        issue_lines.push(TransferLine {
            ingredient_id,
            quantity: opening * KITCHEN_ISSUE_PCT / 100,
        });
    }

    let issue = db
        .stock()
        .transfer(&NewStockIssue {
            kind: StockIssueKind::Issue,
            from_location_id: store.id.clone(),
            to_location_id: kitchen.id.clone(),
            lines: issue_lines,
            issued_by: "seed".to_string(),
            notes: Some("Opening kitchen stock".to_string()),
        })
        .await?;
    println!("  opening stock, kitchen issue {}", issue.issue.issue_number);

    // VAT presets; the first inserted (standard) becomes active
    for preset in VAT_PRESETS.iter() {
        let settings = VatSettings {
            id: new_id(),
            name: preset.name.to_string(),
            preset: Some(preset.code.to_string()),
            rate_bps: i64::from(preset.rate_bps),
            mode: TaxMode::Exclusive,
            service_charge_bps: 1000,
            vat_on_service_charge: true,
            registration_number: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        db.vat().insert(&settings).await?;
    }
    println!("  {} VAT presets", VAT_PRESETS.len());

    db.close().await;
    println!("Seed complete.");
    Ok(())
}

fn location(name: &str, kind: LocationKind) -> Location {
    Location {
        id: new_id(),
        name: name.to_string(),
        kind,
        is_active: true,
        created_at: Utc::now(),
    }
}
