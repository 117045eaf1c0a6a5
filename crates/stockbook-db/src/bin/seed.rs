//! # Seed Data Generator
//!
//! Populates a store with demo categories, tags, products and a short
//! ledger history.
//!
//! ## Usage
//! ```bash
//! # Seed ./stockbook_dev.db with 40 products (default)
//! cargo run -p stockbook-db --bin seed
//!
//! # Custom amount and file
//! cargo run -p stockbook-db --bin seed -- --count 200 --db ./data/stockbook.db
//!
//! # Use a config file and write a backup afterwards
//! cargo run -p stockbook-db --bin seed -- --config ./stockbook.toml --backup
//! ```
//!
//! ## Generated Data
//! - Categories: Paint, Tools, Hardware, Electrical
//! - Tags: `A-`, `B-` and `C-` shelf labels (drive the prefix filter)
//! - Per product: one opening stock figure, one purchase invoice line,
//!   and every third product gets a sale and a recount

use std::env;
use std::path::PathBuf;

use stockbook_core::{Actor, Invoice, InvoiceLine, InvoiceType};
use stockbook_db::{Database, DefaultAdmin, NewProduct, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CATEGORIES: &[&str] = &["Paint", "Tools", "Hardware", "Electrical"];

const TAGS: &[&str] = &["A-Front", "A-Back", "B-Upper", "B-Lower", "C-Yard"];

const ITEMS: &[&str] = &[
    "Primer", "Roller", "Brush", "Tape", "Hammer", "Wrench", "Pliers", "Screws", "Bolts", "Nails",
    "Cable", "Switch", "Socket", "Fuse", "Bulb",
];

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockbook=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut write_backup = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--backup" | "-b" => write_backup = true,
            "--help" | "-h" => {
                println!("Stockbook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>       Number of products to generate (default: 40)");
                println!("  -d, --db <PATH>       Database file path (default: ./stockbook_dev.db)");
                println!("      --config <PATH>   Store config file (TOML)");
                println!("  -b, --backup          Write a backup file when done");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => StoreConfig::load(Some(path))?,
        None => StoreConfig {
            database_path: PathBuf::from("./stockbook_dev.db"),
            ..StoreConfig::default()
        },
    };
    if let Some(path) = db_path {
        config.database_path = path;
    }
    if config.default_admin.is_none() {
        config.default_admin = Some(DefaultAdmin {
            username: "admin".into(),
            password: "admin".into(),
            previous_usernames: vec![],
        });
    }

    info!(path = %config.database_path.display(), count, "Seeding store");
    let db = Database::open(&config).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Store already has products, skipping seed");
        return Ok(());
    }

    let actor = match &config.default_admin {
        Some(admin) => match db.users().get_by_username(&admin.username).await? {
            Some(user) => user.actor(),
            None => Actor::system(),
        },
        None => Actor::system(),
    };

    let start = std::time::Instant::now();

    let mut category_ids = Vec::new();
    for name in CATEGORIES {
        category_ids.push(db.catalog().create_category(name, &actor).await?.id);
    }
    let mut tag_ids = Vec::new();
    for name in TAGS {
        tag_ids.push(db.catalog().create_tag(name, &actor).await?.id);
    }

    let mut product_ids = Vec::with_capacity(count);
    for n in 0..count {
        let item = ITEMS[n % ITEMS.len()];
        let input = NewProduct {
            name: format!("{} #{:03}", item, n + 1),
            initial_quantity: ((n * 37) % 120) as i64,
            tag_ids: [tag_ids[n % tag_ids.len()].clone()].into(),
            category_ids: [category_ids[n % category_ids.len()].clone()].into(),
        };
        product_ids.push(db.catalog().create_product(input, &actor).await?.id);
    }

    for (chunk_no, chunk) in product_ids.chunks(10).enumerate() {
        let purchase = Invoice {
            kind: InvoiceType::Purchase,
            invoice_number: format!("P-{:04}", chunk_no + 1),
            lines: chunk
                .iter()
                .enumerate()
                .map(|(k, id)| InvoiceLine {
                    product_id: id.clone(),
                    quantity: 10 + (k as i64 * 7) % 50,
                })
                .collect(),
        };
        db.ledger().post_invoice(&purchase, &actor).await?;
    }

    for (n, id) in product_ids.iter().enumerate().filter(|(n, _)| n % 3 == 0) {
        let sale = Invoice {
            kind: InvoiceType::Sale,
            invoice_number: format!("S-{:04}", n + 1),
            lines: vec![InvoiceLine {
                product_id: id.clone(),
                quantity: 5,
            }],
        };
        db.ledger().post_invoice(&sale, &actor).await?;

        if let Some(product) = db.products().get(id).await? {
            db.ledger()
                .recount(id, product.quantity.saturating_sub(2).max(0), "seed shelf count", &actor)
                .await?;
        }
    }

    info!(
        products = product_ids.len(),
        elapsed = ?start.elapsed(),
        "Seed data generated"
    );

    let drifts = db.ledger().verify_all().await?;
    if drifts.is_empty() {
        info!("Ledger verified");
    } else {
        warn!(count = drifts.len(), "Ledger drift after seeding");
    }

    if write_backup {
        let dir = config
            .backup_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./backups"));
        let path = db.backup().write_to_dir(&dir, &actor).await?;
        info!(path = %path.display(), "Backup written");
    }

    db.checkpoint().await?;
    db.close().await;
    Ok(())
}
