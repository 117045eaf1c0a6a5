//! # Log Repository
//!
//! Append-only audit rows. There is no update and no single-row delete;
//! only a restore replaces the table wholesale.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{LogAction, LogEntry};

#[derive(Debug, sqlx::FromRow)]
struct LogRecord {
    id: String,
    timestamp: DateTime<Utc>,
    user_id: String,
    username: String,
    action: LogAction,
    details: String,
}

impl From<LogRecord> for LogEntry {
    fn from(r: LogRecord) -> Self {
        LogEntry {
            id: r.id,
            timestamp: r.timestamp,
            user_id: r.user_id,
            username: r.username,
            action: r.action,
            details: r.details,
        }
    }
}

pub(crate) async fn insert(conn: &mut SqliteConnection, entry: &LogEntry) -> DbResult<()> {
    debug!(action = ?entry.action, user = %entry.username, "Appending log entry");

    sqlx::query(
        r#"
        INSERT INTO logs (id, timestamp, user_id, username, action, details)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.timestamp)
    .bind(&entry.user_id)
    .bind(&entry.username)
    .bind(entry.action)
    .bind(&entry.details)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Newest first. Rows are appended in time order, so `rowid` order is
/// chronological order.
pub(crate) async fn fetch_recent(
    conn: &mut SqliteConnection,
    limit: Option<u32>,
) -> DbResult<Vec<LogEntry>> {
    // SQLite treats a negative LIMIT as "no limit"
    let limit = limit.map(i64::from).unwrap_or(-1);

    let records: Vec<LogRecord> = sqlx::query_as(
        r#"
        SELECT id, timestamp, user_id, username, action, details
        FROM logs
        ORDER BY rowid DESC
        LIMIT ?1
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    Ok(records.into_iter().map(LogEntry::from).collect())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM logs").execute(&mut *conn).await?;
    Ok(())
}

/// Read access to the audit log. Writes go through [`crate::audit`].
#[derive(Debug, Clone)]
pub struct LogRepository {
    pool: SqlitePool,
}

impl LogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LogRepository { pool }
    }

    /// Lists audit rows newest first, at most `limit` of them.
    pub async fn list(&self, limit: Option<u32>) -> DbResult<Vec<LogEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_recent(&mut conn, limit).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
