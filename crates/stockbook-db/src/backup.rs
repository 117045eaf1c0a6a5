//! # Backup & Restore
//!
//! Whole-store snapshots as versioned JSON.
//!
//! ## Restore Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  bytes                                                                  │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  probe schemaVersion ──── missing ──► 1                                │
//! │    │                                                                    │
//! │    ├── 1 ──► LegacySnapshot ──► upgrade() ──┐                          │
//! │    ├── 2 ──► Snapshot ──────────────────────┤                          │
//! │    └── ? ──► CorruptBlob                    │                          │
//! │                                             ▼                          │
//! │                                  check_integrity() ── Err ──► CorruptBlob
//! │                                             │                          │
//! │                                             ▼                          │
//! │  BEGIN ── clear tables ── insert rows ── DB_RESTORE row ── COMMIT      │
//! │                                                                         │
//! │  Nothing touches the live store until the blob has fully parsed.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Versions
//! * **1** - products carry a single optional `tagId` / `categoryId` and no
//!   `initialQuantity`; logs may be absent.
//! * **2** - current shape.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::audit;
use crate::error::{DbError, DbResult};
use crate::repository::{category, log, product, tag, transaction, user};
use stockbook_core::ledger::derive_initial;
use stockbook_core::{
    Actor, Category, LogAction, LogEntry, Permission, Product, Tag, Transaction, User,
};

/// Version written by [`Backup::export_all`].
pub const SCHEMA_VERSION: u32 = 2;

// =============================================================================
// Snapshot Schema
// =============================================================================

/// A user as stored in a snapshot. Unlike [`User`], the hash is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub allowed_category_ids: BTreeSet<String>,
    #[serde(default)]
    pub allowed_tag_prefixes: BTreeSet<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl From<User> for SnapshotUser {
    fn from(u: User) -> Self {
        SnapshotUser {
            id: u.id,
            username: u.username,
            password_hash: u.password_hash,
            permissions: u.permissions,
            allowed_category_ids: u.allowed_category_ids,
            allowed_tag_prefixes: u.allowed_tag_prefixes,
            profile_picture: u.profile_picture,
        }
    }
}

impl From<SnapshotUser> for User {
    fn from(s: SnapshotUser) -> Self {
        User {
            id: s.id,
            username: s.username,
            password_hash: s.password_hash,
            permissions: s.permissions,
            allowed_category_ids: s.allowed_category_ids,
            allowed_tag_prefixes: s.allowed_tag_prefixes,
            profile_picture: s.profile_picture,
        }
    }
}

/// The current snapshot shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub products: Vec<Product>,
    pub tags: Vec<Tag>,
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    pub users: Vec<SnapshotUser>,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    #[serde(default = "legacy_version")]
    schema_version: u32,
}

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyProduct {
    id: String,
    name: String,
    quantity: i64,
    #[serde(default)]
    tag_id: Option<String>,
    #[serde(default)]
    category_id: Option<String>,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySnapshot {
    #[serde(default = "Utc::now")]
    exported_at: DateTime<Utc>,
    products: Vec<LegacyProduct>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(default)]
    users: Vec<SnapshotUser>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}

impl LegacySnapshot {
    /// Moves single tag / category ids into sets and recovers each
    /// product's initial quantity from its history.
    fn upgrade(self) -> Snapshot {
        let mut sums: HashMap<&str, i64> = HashMap::new();
        for t in &self.transactions {
            *sums.entry(t.product_id.as_str()).or_default() += t.quantity_change;
        }

        let products = self
            .products
            .into_iter()
            .map(|p| {
                let sum = sums.get(p.id.as_str()).copied().unwrap_or(0);
                Product {
                    initial_quantity: derive_initial(p.quantity, sum),
                    tag_ids: p.tag_id.into_iter().filter(|id| !id.is_empty()).collect(),
                    category_ids: p
                        .category_id
                        .into_iter()
                        .filter(|id| !id.is_empty())
                        .collect(),
                    id: p.id,
                    name: p.name,
                    quantity: p.quantity,
                    last_updated: p.last_updated,
                }
            })
            .collect();

        Snapshot {
            schema_version: SCHEMA_VERSION,
            exported_at: self.exported_at,
            products,
            tags: self.tags,
            categories: self.categories,
            transactions: self.transactions,
            users: self.users,
            logs: self.logs,
        }
    }
}

/// Parses a blob of any supported version into the current shape.
///
/// ## Errors
/// * `CorruptBlob` - not JSON, unknown version, wrong shape or
///   inconsistent contents
pub fn parse_snapshot(bytes: &[u8]) -> DbResult<Snapshot> {
    let corrupt = |e: serde_json::Error| DbError::CorruptBlob(e.to_string());

    let probe: VersionProbe = serde_json::from_slice(bytes).map_err(corrupt)?;
    let snapshot = match probe.schema_version {
        1 => serde_json::from_slice::<LegacySnapshot>(bytes)
            .map_err(corrupt)?
            .upgrade(),
        SCHEMA_VERSION => serde_json::from_slice::<Snapshot>(bytes).map_err(corrupt)?,
        other => {
            return Err(DbError::CorruptBlob(format!(
                "unsupported schema version {}",
                other
            )))
        }
    };

    check_integrity(&snapshot).map_err(DbError::CorruptBlob)?;
    Ok(snapshot)
}

fn unique_ids<'a>(table: &str, ids: impl Iterator<Item = &'a str>) -> Result<HashSet<&'a str>, String> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(format!("duplicate id '{}' in {}", id, table));
        }
    }
    Ok(seen)
}

fn check_integrity(s: &Snapshot) -> Result<(), String> {
    let tag_ids = unique_ids("tags", s.tags.iter().map(|t| t.id.as_str()))?;
    let category_ids = unique_ids("categories", s.categories.iter().map(|c| c.id.as_str()))?;
    unique_ids("products", s.products.iter().map(|p| p.id.as_str()))?;
    unique_ids("transactions", s.transactions.iter().map(|t| t.id.as_str()))?;
    unique_ids("users", s.users.iter().map(|u| u.id.as_str()))?;
    unique_ids("logs", s.logs.iter().map(|l| l.id.as_str()))?;

    for p in &s.products {
        if p.quantity < 0 {
            return Err(format!("product '{}' has negative quantity", p.id));
        }
        if let Some(missing) = p.tag_ids.iter().find(|id| !tag_ids.contains(id.as_str())) {
            return Err(format!("product '{}' references unknown tag '{}'", p.id, missing));
        }
        if let Some(missing) = p
            .category_ids
            .iter()
            .find(|id| !category_ids.contains(id.as_str()))
        {
            return Err(format!(
                "product '{}' references unknown category '{}'",
                p.id, missing
            ));
        }
    }

    for u in &s.users {
        if let Some(missing) = u
            .allowed_category_ids
            .iter()
            .find(|id| !category_ids.contains(id.as_str()))
        {
            return Err(format!(
                "user '{}' references unknown category '{}'",
                u.username, missing
            ));
        }
    }

    Ok(())
}

// =============================================================================
// Backup Service
// =============================================================================

async fn read_snapshot(conn: &mut SqliteConnection) -> DbResult<Snapshot> {
    let mut transactions = transaction::fetch_all(conn).await?;
    transaction::sort_chronological(&mut transactions);

    let mut logs = log::fetch_recent(conn, None).await?;
    logs.reverse();

    Ok(Snapshot {
        schema_version: SCHEMA_VERSION,
        exported_at: Utc::now(),
        products: product::fetch_all(conn).await?,
        tags: tag::fetch_all(conn).await?,
        categories: category::fetch_all(conn).await?,
        transactions,
        users: user::fetch_all(conn)
            .await?
            .into_iter()
            .map(SnapshotUser::from)
            .collect(),
        logs,
    })
}

async fn replace_all(conn: &mut SqliteConnection, snapshot: &Snapshot) -> DbResult<()> {
    transaction::delete_all(conn).await?;
    log::delete_all(conn).await?;
    product::delete_all(conn).await?;
    user::delete_all(conn).await?;
    tag::delete_all(conn).await?;
    category::delete_all(conn).await?;

    for c in &snapshot.categories {
        category::upsert(conn, c).await?;
    }
    for t in &snapshot.tags {
        tag::upsert(conn, t).await?;
    }
    for p in &snapshot.products {
        product::upsert(conn, p).await?;
    }
    for u in &snapshot.users {
        user::upsert(conn, &User::from(u.clone())).await?;
    }
    for t in &snapshot.transactions {
        transaction::insert(conn, t).await?;
    }
    for l in &snapshot.logs {
        log::insert(conn, l).await?;
    }

    Ok(())
}

/// Appends the `DB_BACKUP` row and serializes the store, without committing.
async fn export_blob(conn: &mut SqliteConnection, actor: &Actor) -> DbResult<Vec<u8>> {
    audit::record(conn, actor, LogAction::DbBackup, "Exported full backup").await?;
    let snapshot = read_snapshot(conn).await?;

    let bytes = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| DbError::Internal(format!("Failed to serialize snapshot: {}", e)))?;

    info!(
        products = snapshot.products.len(),
        transactions = snapshot.transactions.len(),
        bytes = bytes.len(),
        "Backup exported"
    );
    Ok(bytes)
}

/// Export / import of the whole store.
#[derive(Debug, Clone)]
pub struct Backup {
    pool: SqlitePool,
}

impl Backup {
    pub fn new(pool: SqlitePool) -> Self {
        Backup { pool }
    }

    /// Serializes every table into a snapshot blob.
    ///
    /// The `DB_BACKUP` row is written first, so the blob contains it.
    pub async fn export_all(&self, actor: &Actor) -> DbResult<Vec<u8>> {
        let mut tx = self.pool.begin().await?;
        let bytes = export_blob(&mut tx, actor).await?;
        tx.commit().await?;
        Ok(bytes)
    }

    /// Replaces the whole store with the contents of `bytes`.
    ///
    /// ## Errors
    /// * `CorruptBlob` - the blob is unreadable or inconsistent; the store
    ///   is left exactly as it was
    pub async fn import_all(&self, bytes: &[u8], actor: &Actor) -> DbResult<Snapshot> {
        let snapshot = parse_snapshot(bytes).map_err(|e| {
            warn!(error = %e, "Restore rejected");
            e
        })?;

        let mut tx = self.pool.begin().await?;
        replace_all(&mut tx, &snapshot).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } => {
                warn!(error = %e, "Restore rejected");
                DbError::CorruptBlob(e.to_string())
            }
            other => other,
        })?;
        audit::record(
            &mut tx,
            actor,
            LogAction::DbRestore,
            format!(
                "Restored backup from {} ({} products, {} transactions)",
                snapshot.exported_at.to_rfc3339(),
                snapshot.products.len(),
                snapshot.transactions.len()
            ),
        )
        .await?;
        tx.commit().await?;

        info!(
            products = snapshot.products.len(),
            transactions = snapshot.transactions.len(),
            "Backup restored"
        );
        Ok(snapshot)
    }

    /// Exports into `dir` as `stockbook-backup-<UTC timestamp>.json`.
    ///
    /// The `DB_BACKUP` row commits only once the file is on disk.
    ///
    /// ## Returns
    /// The path written.
    ///
    /// ## Errors
    /// * `Internal` - the directory or file could not be written; no audit
    ///   row is kept
    pub async fn write_to_dir(&self, dir: &Path, actor: &Actor) -> DbResult<PathBuf> {
        let mut tx = self.pool.begin().await?;
        let bytes = export_blob(&mut tx, actor).await?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DbError::Internal(format!("Failed to create {}: {}", dir.display(), e)))?;

        let path = dir.join(format!(
            "stockbook-backup-{}.json",
            Utc::now().format("%Y%m%d-%H%M%S%.3f")
        ));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DbError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;

        tx.commit().await?;

        info!(path = %path.display(), "Backup file written");
        Ok(path)
    }

    pub async fn restore_from_file(&self, path: &Path, actor: &Actor) -> DbResult<Snapshot> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DbError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        self.import_all(&bytes, actor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewProduct;
    use crate::error::ErrorKind;
    use crate::pool::{Database, DbConfig};
    use stockbook_core::{Invoice, InvoiceLine, InvoiceType};

    fn actor() -> Actor {
        Actor::new("u1", "alice")
    }

    async fn populated() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cat = db.catalog().create_category("Paint", &actor()).await.unwrap();
        let tag = db.catalog().create_tag("A1", &actor()).await.unwrap();
        let p = db
            .catalog()
            .create_product(
                NewProduct {
                    name: "Primer".into(),
                    initial_quantity: 5,
                    tag_ids: [tag.id].into(),
                    category_ids: [cat.id].into(),
                },
                &actor(),
            )
            .await
            .unwrap();
        db.ledger()
            .post_invoice(
                &Invoice {
                    kind: InvoiceType::Purchase,
                    invoice_number: "P-9".into(),
                    lines: vec![InvoiceLine {
                        product_id: p.id.clone(),
                        quantity: 10,
                    }],
                },
                &actor(),
            )
            .await
            .unwrap();
        (db, p)
    }

    #[tokio::test]
    async fn test_export_then_restore_replaces_store() {
        let (db, p) = populated().await;
        let blob = db.backup().export_all(&actor()).await.unwrap();

        db.ledger().adjust_stock(&p.id, -3, "spill", &actor()).await.unwrap();
        db.catalog().create_category("Extra", &actor()).await.unwrap();

        let restored = db.backup().import_all(&blob, &actor()).await.unwrap();
        assert_eq!(restored.schema_version, SCHEMA_VERSION);

        let stored = db.products().get(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 15);
        assert_eq!(stored.initial_quantity, 5);
        assert_eq!(stored.tag_ids.len(), 1);
        assert_eq!(db.categories().list().await.unwrap().len(), 1);
        assert_eq!(db.transactions().list().await.unwrap().len(), 1);
        assert!(db.ledger().verify_all().await.unwrap().is_empty());

        let logs = db.logs().list(Some(2)).await.unwrap();
        assert_eq!(logs[0].action, LogAction::DbRestore);
        assert_eq!(logs[1].action, LogAction::DbBackup);
    }

    #[tokio::test]
    async fn test_garbage_leaves_store_untouched() {
        let (db, p) = populated().await;
        let before = db.logs().count().await.unwrap();

        let err = db.backup().import_all(b"not json", &actor()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptBlob);

        let err = db
            .backup()
            .import_all(br#"{"schemaVersion": 9}"#, &actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptBlob);

        assert_eq!(db.products().get(&p.id).await.unwrap().unwrap().quantity, 15);
        assert_eq!(db.logs().count().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_case_colliding_names_rejected_as_corrupt() {
        let (db, _) = populated().await;
        let blob = db.backup().export_all(&actor()).await.unwrap();
        let mut snapshot: Snapshot = serde_json::from_slice(&blob).unwrap();
        snapshot.categories.push(Category {
            id: "dup".into(),
            name: "PAINT".into(),
        });
        let bytes = serde_json::to_vec(&snapshot).unwrap();

        let err = db.backup().import_all(&bytes, &actor()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptBlob);
        assert_eq!(db.categories().list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_negative_quantity_is_corrupt() {
        let blob = serde_json::json!({
            "schemaVersion": 2,
            "exportedAt": "2024-01-01T00:00:00Z",
            "products": [{
                "id": "p1", "name": "X", "quantity": -1, "initialQuantity": 0,
                "tagIds": [], "categoryIds": [], "lastUpdated": "2024-01-01T00:00:00Z"
            }],
            "tags": [], "categories": [], "transactions": [], "users": [], "logs": []
        });
        let err = parse_snapshot(blob.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, DbError::CorruptBlob(_)));
    }

    #[test]
    fn test_legacy_blob_upgrades() {
        let blob = serde_json::json!({
            "products": [{
                "id": "p1", "name": "Glue", "quantity": 8,
                "tagId": "t1", "categoryId": "c1",
                "lastUpdated": "2024-01-01T00:00:00Z"
            }],
            "tags": [{"id": "t1", "name": "A1", "color": "hsl(3, 70%, 55%)"}],
            "categories": [{"id": "c1", "name": "Misc"}],
            "transactions": [{
                "id": "x1", "type": "purchase", "invoiceNumber": "P-1",
                "productId": "p1", "quantityChange": 6,
                "timestamp": "2024-01-01T00:00:00Z"
            }],
            "users": []
        });

        let snapshot = parse_snapshot(blob.to_string().as_bytes()).unwrap();

        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        let p = &snapshot.products[0];
        assert_eq!(p.initial_quantity, 2);
        assert!(p.tag_ids.contains("t1"));
        assert!(p.category_ids.contains("c1"));
        assert!(snapshot.logs.is_empty());
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let (db, p) = populated().await;
        let dir = std::env::temp_dir().join(format!("stockbook-test-{}", crate::repository::new_id()));

        let path = db.backup().write_to_dir(&dir, &actor()).await.unwrap();
        db.catalog().delete_product(&p.id, &actor()).await.unwrap();
        db.backup().restore_from_file(&path, &actor()).await.unwrap();

        assert!(db.products().get(&p.id).await.unwrap().is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_file_write_leaves_no_backup_row() {
        let (db, _) = populated().await;
        let blocker =
            std::env::temp_dir().join(format!("stockbook-blocker-{}", crate::repository::new_id()));
        std::fs::write(&blocker, b"not a directory").unwrap();
        let before = db.logs().count().await.unwrap();

        let err = db
            .backup()
            .write_to_dir(&blocker.join("sub"), &actor())
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Internal(_)));
        assert_eq!(db.logs().count().await.unwrap(), before);
        let actions: Vec<LogAction> = db
            .logs()
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert!(!actions.contains(&LogAction::DbBackup));
        let _ = std::fs::remove_file(&blocker);
    }
}
