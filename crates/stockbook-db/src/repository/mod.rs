//! # Repository Module
//!
//! Database repository implementations for Stockbook.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  db.products().get(id)                 Ledger / Catalog (one sqlx tx)   │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  ProductRepository                     product::fetch(&mut *tx, id)     │
//! │  ├── get / list / upsert / delete      product::upsert(&mut *tx, ..)    │
//! │  │   (acquire a pooled connection)     (reuse the open transaction)     │
//! │  │                                           │                          │
//! │  └──────────────► module-level fns ◄─────────┘                          │
//! │                     (&mut SqliteConnection)                            │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                   SQLite Database                                      │
//! │                                                                         │
//! │  No business validation lives here. Name uniqueness is checked with    │
//! │  an explicit query before writing so the error names the value.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products and their tag/category links
//! - [`TagRepository`](tag::TagRepository) - Tags
//! - [`CategoryRepository`](category::CategoryRepository) - Categories
//! - [`TransactionRepository`](transaction::TransactionRepository) - Stock movements
//! - [`UserRepository`](user::UserRepository) - Accounts, permissions, allowed sets
//! - [`LogRepository`](log::LogRepository) - Audit rows

pub mod category;
pub mod log;
pub mod product;
pub mod tag;
pub mod transaction;
pub mod user;

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Generates a new entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fails with `UniqueViolation` if another row already uses `value` in
/// `column` (compared case-insensitively).
///
/// ## Arguments
/// * `table` / `column` - Fixed identifiers, never user input
/// * `field` - Label used in the error
/// * `id` - Row being written; a match on itself is not a conflict
pub(crate) async fn ensure_unique(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    field: &str,
    value: &str,
    id: &str,
) -> DbResult<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {table} WHERE {column} = ?1 COLLATE NOCASE AND id <> ?2"
    );
    let taken: i64 = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    if taken > 0 {
        return Err(DbError::duplicate(field, value));
    }

    Ok(())
}
