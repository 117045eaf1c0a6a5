//! # User Repository
//!
//! Accounts with their permission set and access-filter sets.
//!
//! ## Storage Layout
//! ```text
//! users ──┬── permissions               (user_id, permission)
//!         ├── user_allowed_categories   (user_id, category_id)
//!         └── user_allowed_tag_prefixes (user_id, prefix)
//!
//! all child tables: ON DELETE CASCADE
//! ```

use std::collections::{BTreeSet, HashMap};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::ensure_unique;
use crate::error::{DbError, DbResult};
use stockbook_core::{Permission, User};

#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: String,
    username: String,
    password_hash: String,
    profile_picture: Option<String>,
}

impl UserRecord {
    fn into_user(
        self,
        permissions: BTreeSet<Permission>,
        allowed_category_ids: BTreeSet<String>,
        allowed_tag_prefixes: BTreeSet<String>,
    ) -> User {
        User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            permissions,
            allowed_category_ids,
            allowed_tag_prefixes,
            profile_picture: self.profile_picture,
        }
    }
}

const COLUMNS: &str = "id, username, password_hash, profile_picture";

async fn load_sets(conn: &mut SqliteConnection, record: UserRecord) -> DbResult<User> {
    let permissions: Vec<Permission> =
        sqlx::query_scalar("SELECT permission FROM permissions WHERE user_id = ?1")
            .bind(&record.id)
            .fetch_all(&mut *conn)
            .await?;
    let categories: Vec<String> =
        sqlx::query_scalar("SELECT category_id FROM user_allowed_categories WHERE user_id = ?1")
            .bind(&record.id)
            .fetch_all(&mut *conn)
            .await?;
    let prefixes: Vec<String> =
        sqlx::query_scalar("SELECT prefix FROM user_allowed_tag_prefixes WHERE user_id = ?1")
            .bind(&record.id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(record.into_user(
        permissions.into_iter().collect(),
        categories.into_iter().collect(),
        prefixes.into_iter().collect(),
    ))
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<User>> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = ?1");
    let record: Option<UserRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match record {
        Some(record) => Ok(Some(load_sets(conn, record).await?)),
        None => Ok(None),
    }
}

/// Looks a user up by name, ignoring case.
pub(crate) async fn fetch_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> DbResult<Option<User>> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE username = ?1 COLLATE NOCASE");
    let record: Option<UserRecord> = sqlx::query_as(&sql)
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    match record {
        Some(record) => Ok(Some(load_sets(conn, record).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<User>> {
    let sql = format!("SELECT {COLUMNS} FROM users ORDER BY username");
    let records: Vec<UserRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    let mut permissions: HashMap<String, BTreeSet<Permission>> = HashMap::new();
    let rows: Vec<(String, Permission)> =
        sqlx::query_as("SELECT user_id, permission FROM permissions")
            .fetch_all(&mut *conn)
            .await?;
    for (user_id, permission) in rows {
        permissions.entry(user_id).or_default().insert(permission);
    }

    let mut categories = group(
        sqlx::query_as("SELECT user_id, category_id FROM user_allowed_categories")
            .fetch_all(&mut *conn)
            .await?,
    );
    let mut prefixes = group(
        sqlx::query_as("SELECT user_id, prefix FROM user_allowed_tag_prefixes")
            .fetch_all(&mut *conn)
            .await?,
    );

    Ok(records
        .into_iter()
        .map(|r| {
            let p = permissions.remove(&r.id).unwrap_or_default();
            let c = categories.remove(&r.id).unwrap_or_default();
            let t = prefixes.remove(&r.id).unwrap_or_default();
            r.into_user(p, c, t)
        })
        .collect())
}

/// Usernames whose allowed categories include `category_id`.
pub(crate) async fn restricted_to_category(
    conn: &mut SqliteConnection,
    category_id: &str,
) -> DbResult<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT u.username FROM users u
        JOIN user_allowed_categories a ON a.user_id = u.id
        WHERE a.category_id = ?1
        ORDER BY u.username
        "#,
    )
    .bind(category_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(names)
}

fn group(rows: Vec<(String, String)>) -> HashMap<String, BTreeSet<String>> {
    let mut grouped: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (user_id, value) in rows {
        grouped.entry(user_id).or_default().insert(value);
    }
    grouped
}

/// Inserts or fully replaces a user and its sets.
///
/// ## Errors
/// * `UniqueViolation` - username taken by another account (any case)
/// * `ForeignKeyViolation` - an allowed category does not exist
pub(crate) async fn upsert(conn: &mut SqliteConnection, user: &User) -> DbResult<()> {
    debug!(id = %user.id, username = %user.username, "Upserting user");

    ensure_unique(conn, "users", "username", "username", &user.username, &user.id).await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, username, password_hash, profile_picture)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (id) DO UPDATE SET
            username = excluded.username,
            password_hash = excluded.password_hash,
            profile_picture = excluded.profile_picture
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.profile_picture)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM permissions WHERE user_id = ?1")
        .bind(&user.id)
        .execute(&mut *conn)
        .await?;
    for permission in &user.permissions {
        sqlx::query("INSERT INTO permissions (user_id, permission) VALUES (?1, ?2)")
            .bind(&user.id)
            .bind(*permission)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM user_allowed_categories WHERE user_id = ?1")
        .bind(&user.id)
        .execute(&mut *conn)
        .await?;
    for category_id in &user.allowed_category_ids {
        sqlx::query("INSERT INTO user_allowed_categories (user_id, category_id) VALUES (?1, ?2)")
            .bind(&user.id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM user_allowed_tag_prefixes WHERE user_id = ?1")
        .bind(&user.id)
        .execute(&mut *conn)
        .await?;
    for prefix in &user.allowed_tag_prefixes {
        sqlx::query("INSERT INTO user_allowed_tag_prefixes (user_id, prefix) VALUES (?1, ?2)")
            .bind(&user.id)
            .bind(prefix)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting user");

    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("User", id));
    }

    Ok(())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM users").execute(&mut *conn).await?;
    Ok(())
}

/// Repository for user accounts.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Case-insensitive lookup.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_username(&mut conn, username).await
    }

    pub async fn list(&self) -> DbResult<Vec<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    pub async fn upsert(&self, user: &User) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
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

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.into(),
            username: name.into(),
            password_hash: "hash".into(),
            permissions: [Permission::CanViewLogs, Permission::CanExportData].into(),
            allowed_category_ids: BTreeSet::new(),
            allowed_tag_prefixes: ["A".to_string()].into(),
            profile_picture: None,
        }
    }

    #[tokio::test]
    async fn test_sets_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().upsert(&user("u1", "Clerk")).await.unwrap();

        let loaded = db.users().get_by_username("CLERK").await.unwrap().unwrap();
        assert_eq!(loaded.id, "u1");
        assert!(loaded.has_permission(Permission::CanViewLogs));
        assert!(!loaded.has_permission(Permission::CanManageUsers));
        assert!(loaded.allowed_tag_prefixes.contains("A"));

        let all = db.users().list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].permissions.len(), 2);
    }

    #[tokio::test]
    async fn test_permission_stored_as_screaming_snake() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().upsert(&user("u1", "clerk")).await.unwrap();

        let stored: Vec<String> =
            sqlx::query_scalar("SELECT permission FROM permissions ORDER BY permission")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(stored, ["CAN_EXPORT_DATA", "CAN_VIEW_LOGS"]);
    }

    #[tokio::test]
    async fn test_username_unique_ignoring_case() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().upsert(&user("u1", "clerk")).await.unwrap();

        let err = db.users().upsert(&user("u2", "Clerk")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
