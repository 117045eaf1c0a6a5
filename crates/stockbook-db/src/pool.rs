//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] store handle.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Store Lifecycle                                 │
//! │                                                                         │
//! │  StoreConfig::load(None)?                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::open(&config).await?                                        │
//! │       │                                                                 │
//! │       ├── DbConfig → SqlitePool (WAL, foreign keys)                    │
//! │       ├── migrations                                                   │
//! │       └── ensure_default_admin (if configured)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── db.ledger()    post_invoice / recount / edit / delete        │
//! │       ├── db.catalog()   products, tags, categories                    │
//! │       ├── db.accounts()  users, login, profile                         │
//! │       ├── db.reports()   dashboard, cardex, exports                    │
//! │       └── db.backup()    export_all / import_all                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.checkpoint().await? ; db.close().await                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled, so readers never see
//! a half-committed ledger operation and never block the writer.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::accounts::Accounts;
use crate::backup::Backup;
use crate::bootstrap::ensure_default_admin;
use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};
use crate::ledger::Ledger;
use crate::migrations;
use crate::reports::Reports;
use crate::repository::category::CategoryRepository;
use crate::repository::log::LogRepository;
use crate::repository::product::ProductRepository;
use crate::repository::tag::TagRepository;
use crate::repository::transaction::TransactionRepository;
use crate::repository::user::UserRepository;
use stockbook_core::LOW_STOCK_THRESHOLD;

// =============================================================================
// Configuration
// =============================================================================

/// Pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/srv/stockbook/stockbook.db")
///     .max_connections(4)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for the file at `path`, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// An isolated in-memory store (tests, demos).
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// is pinned to one connection. Code holding an open transaction must
    /// not go back to the pool.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// The store handle. Cheap to clone; every clone shares the pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::open(&StoreConfig::load(None)?).await?;
/// let user = db.accounts().verify_credentials("admin", pw).await?
///     .ok_or(CoreError::InvalidCredentials)?;
/// user.require(Permission::CanPerformTransactions)?;
/// db.ledger().post_invoice(&invoice, &user.actor()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    low_stock_threshold: i64,
}

impl Database {
    /// Opens the pool and runs migrations (if enabled).
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL journal
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled (tag / category cascades depend on it)
    /// 3. Creates the connection pool
    /// 4. Runs migrations
    ///
    /// Uses the default low-stock threshold and does no admin bootstrap;
    /// see [`Database::open`] for the configured path.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            low_stock_threshold: LOW_STOCK_THRESHOLD,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Opens the store described by `config` and bootstraps the default
    /// admin if one is configured.
    pub async fn open(config: &StoreConfig) -> DbResult<Self> {
        config.validate()?;

        let mut db = Self::new(config.db_config()).await?;
        db.low_stock_threshold = config.low_stock_threshold;

        if let Some(admin) = &config.default_admin {
            ensure_default_admin(&db.pool, admin).await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For ad-hoc queries; every mutation should go through the services.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn tags(&self) -> TagRepository {
        TagRepository::new(self.pool.clone())
    }

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone())
    }

    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn logs(&self) -> LogRepository {
        LogRepository::new(self.pool.clone())
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.pool.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.pool.clone())
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::new(self.pool.clone())
    }

    pub fn reports(&self) -> Reports {
        Reports::new(self.pool.clone(), self.low_stock_threshold)
    }

    pub fn backup(&self) -> Backup {
        Backup::new(self.pool.clone())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Folds the WAL back into the main database file.
    pub async fn checkpoint(&self) -> DbResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Closes the pool. Every later operation fails with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// `true` if the store answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultAdmin;
    use stockbook_core::Permission;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(db.low_stock_threshold(), LOW_STOCK_THRESHOLD);
        db.checkpoint().await.unwrap();
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/stockbook.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn test_open_applies_store_config() {
        let config = StoreConfig {
            low_stock_threshold: 7,
            default_admin: Some(DefaultAdmin {
                username: "admin".into(),
                password: "pw".into(),
                previous_usernames: vec![],
            }),
            ..StoreConfig::in_memory()
        };

        let db = Database::open(&config).await.unwrap();

        assert_eq!(db.low_stock_threshold(), 7);
        let admin = db.users().get_by_username("ADMIN").await.unwrap().unwrap();
        assert!(admin.has_permission(Permission::CanBackupRestore));
    }

    #[tokio::test]
    async fn test_closed_pool_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
        assert!(db.products().list().await.is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let config = StoreConfig {
            low_stock_threshold: 0,
            ..StoreConfig::in_memory()
        };
        let err = Database::open(&config).await.unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
