//! # Product Repository
//!
//! Database operations for products and their tag / category links.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products            product_tags            product_categories        │
//! │  ──────────          ────────────            ──────────────────        │
//! │  id ◄────────────────product_id    ┌─────────product_id                │
//! │  name (NOCASE)       tag_id        │         category_id               │
//! │  quantity            ON DELETE CASCADE       ON DELETE CASCADE          │
//! │  initial_quantity                  │                                   │
//! │  last_updated ◄────────────────────┘                                   │
//! │                                                                         │
//! │  transactions.product_id is NOT linked: history survives deletion.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::ensure_unique;
use crate::error::{DbError, DbResult};
use stockbook_core::Product;

#[derive(Debug, sqlx::FromRow)]
struct ProductRecord {
    id: String,
    name: String,
    quantity: i64,
    initial_quantity: i64,
    last_updated: DateTime<Utc>,
}

impl ProductRecord {
    fn into_product(self, tag_ids: BTreeSet<String>, category_ids: BTreeSet<String>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            quantity: self.quantity,
            initial_quantity: self.initial_quantity,
            tag_ids,
            category_ids,
            last_updated: self.last_updated,
        }
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Loads one product with its links.
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let record: Option<ProductRecord> = sqlx::query_as(
        "SELECT id, name, quantity, initial_quantity, last_updated FROM products WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(record) = record else {
        return Ok(None);
    };

    let tag_ids: Vec<String> =
        sqlx::query_scalar("SELECT tag_id FROM product_tags WHERE product_id = ?1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
    let category_ids: Vec<String> =
        sqlx::query_scalar("SELECT category_id FROM product_categories WHERE product_id = ?1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Some(record.into_product(
        tag_ids.into_iter().collect(),
        category_ids.into_iter().collect(),
    )))
}

/// Loads every product, ordered by name.
pub(crate) async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
    let records: Vec<ProductRecord> = sqlx::query_as(
        "SELECT id, name, quantity, initial_quantity, last_updated FROM products ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut tags = group_links(
        sqlx::query_as("SELECT product_id, tag_id FROM product_tags")
            .fetch_all(&mut *conn)
            .await?,
    );
    let mut categories = group_links(
        sqlx::query_as("SELECT product_id, category_id FROM product_categories")
            .fetch_all(&mut *conn)
            .await?,
    );

    debug!(count = records.len(), "Loaded products");

    Ok(records
        .into_iter()
        .map(|r| {
            let tag_ids = tags.remove(&r.id).unwrap_or_default();
            let category_ids = categories.remove(&r.id).unwrap_or_default();
            r.into_product(tag_ids, category_ids)
        })
        .collect())
}

fn group_links(rows: Vec<(String, String)>) -> HashMap<String, BTreeSet<String>> {
    let mut grouped: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (owner, linked) in rows {
        grouped.entry(owner).or_default().insert(linked);
    }
    grouped
}

/// Inserts or fully replaces a product, including its links.
///
/// ## Errors
/// * `UniqueViolation` - another product already has this name
/// * `ForeignKeyViolation` - a tag or category id does not exist
pub(crate) async fn upsert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Upserting product");

    ensure_unique(conn, "products", "name", "product name", &product.name, &product.id).await?;

    sqlx::query(
        r#"
        INSERT INTO products (id, name, quantity, initial_quantity, last_updated)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            quantity = excluded.quantity,
            initial_quantity = excluded.initial_quantity,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.quantity)
    .bind(product.initial_quantity)
    .bind(product.last_updated)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM product_tags WHERE product_id = ?1")
        .bind(&product.id)
        .execute(&mut *conn)
        .await?;
    for tag_id in &product.tag_ids {
        sqlx::query("INSERT INTO product_tags (product_id, tag_id) VALUES (?1, ?2)")
            .bind(&product.id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM product_categories WHERE product_id = ?1")
        .bind(&product.id)
        .execute(&mut *conn)
        .await?;
    for category_id in &product.category_ids {
        sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES (?1, ?2)")
            .bind(&product.id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Sets the absolute quantity and refreshes `last_updated`.
pub(crate) async fn set_quantity(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    debug!(id = %id, quantity, "Setting product quantity");

    let result = sqlx::query("UPDATE products SET quantity = ?2, last_updated = ?3 WHERE id = ?1")
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

/// Deletes a product and its links. Its transactions are kept.
pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting product");

    let result = sqlx::query("DELETE FROM products WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM products").execute(&mut *conn).await?;
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let bolts = repo.get("uuid-here").await?;
/// let everything = repo.list().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists all products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    /// Inserts or replaces a product in its own transaction.
    pub async fn upsert(&self, product: &Product) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert(&mut tx, product).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Deletes a product. Its transactions become orphaned.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete(&mut conn, id).await
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::{category, new_id};
    use stockbook_core::Category;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip_links() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        category::upsert(
            &mut conn,
            &Category {
                id: "c1".into(),
                name: "Hardware".into(),
            },
        )
        .await
        .unwrap();

        let mut p = Product::new(new_id(), "Bolts", 10, Utc::now());
        p.category_ids.insert("c1".into());
        upsert(&mut conn, &p).await.unwrap();

        let loaded = fetch(&mut conn, &p.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Bolts");
        assert_eq!(loaded.quantity, 10);
        assert_eq!(loaded.initial_quantity, 10);
        assert!(loaded.category_ids.contains("c1"));
    }

    #[tokio::test]
    async fn test_name_unique_case_insensitive() {
        let db = db().await;
        let repo = db.products();
        repo.upsert(&Product::new("a", "Bolts", 0, Utc::now())).await.unwrap();

        let err = repo
            .upsert(&Product::new("b", "BOLTS", 0, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // Renaming itself with a different case is fine
        repo.upsert(&Product::new("a", "bolts", 0, Utc::now())).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = db().await;
        let err = db.products().delete("ghost").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tag_link_is_rejected() {
        let db = db().await;
        let mut p = Product::new("a", "Bolts", 0, Utc::now());
        p.tag_ids.insert("nope".into());

        let err = db.products().upsert(&p).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
        assert!(db.products().get("a").await.unwrap().is_none());
    }
}
