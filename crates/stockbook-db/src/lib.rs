//! # stockbook-db: Storage Layer for Stockbook
//!
//! The SQLite entity store and every operation that writes to it. Domain
//! rules come from `stockbook-core`; this crate makes them durable and
//! atomic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Data Flow                              │
//! │                                                                         │
//! │  Caller (UI, CLI, seed binary) with a logged-in User                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐ │   │
//! │  │   │  Services    │  │ Repositories │  │  Database (pool.rs)  │ │   │
//! │  │   │              │  │              │  │                      │ │   │
//! │  │   │ Ledger       │─►│ product      │─►│ SqlitePool           │ │   │
//! │  │   │ Catalog      │  │ tag/category │  │ migrations           │ │   │
//! │  │   │ Accounts     │  │ transaction  │  │ bootstrap            │ │   │
//! │  │   │ Reports      │  │ user         │  │ checkpoint / close   │ │   │
//! │  │   │ Backup       │  │ log (audit)  │  │                      │ │   │
//! │  │   └──────────────┘  └──────────────┘  └──────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Store handle, pool configuration, lifecycle
//! - [`config`] - `StoreConfig` (defaults, TOML, environment)
//! - [`ledger`] - Invoice, recount, edit, delete, adjust, verify
//! - [`catalog`] - Products, tags, categories
//! - [`accounts`] - Users, credentials, profiles
//! - [`reports`] - Dashboard, lists, cardex, export rows
//! - [`backup`] - Snapshot export and restore
//! - [`bootstrap`] - Default admin seed-or-repair
//! - [`audit`] - Audit row writer
//! - [`repository`] - Per-entity storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_db::{Database, StoreConfig};
//!
//! let db = Database::open(&StoreConfig::load(None)?).await?;
//! let stats = db.reports().dashboard(&user).await?;
//! db.ledger().recount(&product_id, 25, "shelf count", &user.actor()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounts;
pub mod audit;
pub mod backup;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod password;
pub mod pool;
pub mod reports;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use accounts::{Accounts, NewUser, ProfileUpdate, UserUpdate};
pub use backup::{Backup, Snapshot, SCHEMA_VERSION};
pub use bootstrap::{ensure_default_admin, BootstrapOutcome};
pub use catalog::{Catalog, NewProduct, ProductUpdate};
pub use config::{DefaultAdmin, StoreConfig};
pub use error::{DbError, DbResult, ErrorKind};
pub use ledger::Ledger;
pub use pool::{Database, DbConfig};
pub use reports::Reports;

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::log::LogRepository;
pub use repository::product::ProductRepository;
pub use repository::tag::TagRepository;
pub use repository::transaction::TransactionRepository;
pub use repository::user::UserRepository;
