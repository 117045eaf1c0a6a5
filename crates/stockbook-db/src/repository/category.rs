//! # Category Repository
//!
//! Deleting a category removes its `product_categories` and
//! `user_allowed_categories` rows through the cascade.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::ensure_unique;
use crate::error::{DbError, DbResult};
use stockbook_core::Category;

#[derive(Debug, sqlx::FromRow)]
struct CategoryRecord {
    id: String,
    name: String,
}

impl From<CategoryRecord> for Category {
    fn from(r: CategoryRecord) -> Self {
        Category {
            id: r.id,
            name: r.name,
        }
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Category>> {
    let record: Option<CategoryRecord> =
        sqlx::query_as("SELECT id, name FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(record.map(Category::from))
}

pub(crate) async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Category>> {
    let records: Vec<CategoryRecord> =
        sqlx::query_as("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&mut *conn)
            .await?;

    Ok(records.into_iter().map(Category::from).collect())
}

pub(crate) async fn upsert(conn: &mut SqliteConnection, category: &Category) -> DbResult<()> {
    debug!(id = %category.id, name = %category.name, "Upserting category");

    ensure_unique(
        conn,
        "categories",
        "name",
        "category name",
        &category.name,
        &category.id,
    )
    .await?;

    sqlx::query(
        r#"
        INSERT INTO categories (id, name) VALUES (?1, ?2)
        ON CONFLICT (id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(&category.id)
    .bind(&category.name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting category");

    let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Category", id));
    }

    Ok(())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM categories").execute(&mut *conn).await?;
    Ok(())
}

/// Repository for category database operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Category>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    pub async fn upsert(&self, category: &Category) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, category).await
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete(&mut conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product;
    use chrono::Utc;
    use stockbook_core::Product;

    #[tokio::test]
    async fn test_delete_cascades_to_product_links() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.categories();
        repo.upsert(&Category { id: "c1".into(), name: "Paint".into() })
            .await
            .unwrap();

        let mut p = Product::new("p1", "Primer", 3, Utc::now());
        p.category_ids.insert("c1".into());
        db.products().upsert(&p).await.unwrap();

        repo.delete("c1").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let loaded = product::fetch(&mut conn, "p1").await.unwrap().unwrap();
        assert!(loaded.category_ids.is_empty());
        assert_eq!(loaded.quantity, 3);
    }

    #[tokio::test]
    async fn test_duplicate_category_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.categories();
        repo.upsert(&Category { id: "c1".into(), name: "Paint".into() })
            .await
            .unwrap();

        let err = repo
            .upsert(&Category { id: "c2".into(), name: "paint".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
