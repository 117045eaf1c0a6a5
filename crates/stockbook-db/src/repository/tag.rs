//! # Tag Repository
//!
//! Deleting a tag removes its `product_tags` rows through the cascade.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::ensure_unique;
use crate::error::{DbError, DbResult};
use stockbook_core::Tag;

#[derive(Debug, sqlx::FromRow)]
struct TagRecord {
    id: String,
    name: String,
    color: String,
}

impl From<TagRecord> for Tag {
    fn from(r: TagRecord) -> Self {
        Tag {
            id: r.id,
            name: r.name,
            color: r.color,
        }
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Tag>> {
    let record: Option<TagRecord> = sqlx::query_as("SELECT id, name, color FROM tags WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record.map(Tag::from))
}

pub(crate) async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Tag>> {
    let records: Vec<TagRecord> = sqlx::query_as("SELECT id, name, color FROM tags ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;

    Ok(records.into_iter().map(Tag::from).collect())
}

pub(crate) async fn upsert(conn: &mut SqliteConnection, tag: &Tag) -> DbResult<()> {
    debug!(id = %tag.id, name = %tag.name, "Upserting tag");

    ensure_unique(conn, "tags", "name", "tag name", &tag.name, &tag.id).await?;

    sqlx::query(
        r#"
        INSERT INTO tags (id, name, color) VALUES (?1, ?2, ?3)
        ON CONFLICT (id) DO UPDATE SET name = excluded.name, color = excluded.color
        "#,
    )
    .bind(&tag.id)
    .bind(&tag.name)
    .bind(&tag.color)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting tag");

    let result = sqlx::query("DELETE FROM tags WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Tag", id));
    }

    Ok(())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM tags").execute(&mut *conn).await?;
    Ok(())
}

/// Repository for tag database operations.
#[derive(Debug, Clone)]
pub struct TagRepository {
    pool: SqlitePool,
}

impl TagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TagRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Tag>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list(&self) -> DbResult<Vec<Tag>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    pub async fn upsert(&self, tag: &Tag) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, tag).await
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete(&mut conn, id).await
    }
}
