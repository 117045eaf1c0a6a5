//! # Audit Logger
//!
//! Appends one log row per mutating action.
//!
//! ## Atomicity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut tx = pool.begin().await?;                                      │
//! │       │                                                                 │
//! │       ├── mutation statements (&mut *tx)                               │
//! │       ├── audit::record(&mut tx, actor, action, details) ← THIS MODULE │
//! │       │                                                                 │
//! │       └── tx.commit()                                                   │
//! │                                                                         │
//! │  The log row exists iff the mutation committed.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::repository::{log, new_id};
use stockbook_core::{Actor, LogAction, LogEntry};

/// Appends an audit row stamped with the current time.
///
/// ## Arguments
/// * `conn` - The connection of the transaction being audited
/// * `actor` - Who performed the action
/// * `action` - What kind of action it was
/// * `details` - Free-form human-readable summary
pub async fn record(
    conn: &mut SqliteConnection,
    actor: &Actor,
    action: LogAction,
    details: impl Into<String>,
) -> DbResult<LogEntry> {
    let entry = LogEntry {
        id: new_id(),
        timestamp: Utc::now(),
        user_id: actor.user_id.clone(),
        username: actor.username.clone(),
        action,
        details: details.into(),
    };

    log::insert(conn, &entry).await?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_rolled_back_mutation_leaves_no_log() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::new("u1", "alice");

        {
            let mut tx = db.pool().begin().await.unwrap();
            record(&mut tx, &actor, LogAction::CreateTag, "tag 'A1'")
                .await
                .unwrap();
            // dropped without commit
        }
        assert_eq!(db.logs().count().await.unwrap(), 0);

        let mut tx = db.pool().begin().await.unwrap();
        record(&mut tx, &actor, LogAction::CreateTag, "tag 'A1'")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let logs = db.logs().list(None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::CreateTag);
        assert_eq!(logs[0].username, "alice");
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();

        let mut conn = db.pool().acquire().await.unwrap();
        for action in [LogAction::DbBackup, LogAction::CreateTag, LogAction::DeleteTag] {
            record(&mut conn, &actor, action, "").await.unwrap();
        }
        drop(conn);

        let logs = db.logs().list(Some(2)).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, LogAction::DeleteTag);
        assert_eq!(logs[1].action, LogAction::CreateTag);
    }
}
