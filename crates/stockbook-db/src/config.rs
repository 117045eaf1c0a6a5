//! # Store Configuration
//!
//! Where the store lives and how it is bootstrapped.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKBOOK_DB_PATH=/srv/stockbook.db                                │
//! │     STOCKBOOK_LOW_STOCK_THRESHOLD=25                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockbook/stockbook.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockbook.stockbook/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     threshold 100, platform data dir, no default admin                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockbook.toml
//! database_path = "/srv/stockbook/stockbook.db"
//! low_stock_threshold = 100
//! backup_dir = "/srv/stockbook/backups"
//!
//! [default_admin]
//! username = "admin"
//! password = "change-me"
//! previous_usernames = ["root"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use stockbook_core::LOW_STOCK_THRESHOLD;

// =============================================================================
// Default Admin
// =============================================================================

/// The administrator account guaranteed to exist after the store opens.
///
/// See [`crate::bootstrap::ensure_default_admin`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAdmin {
    pub username: String,

    /// Only used when the account has to be created.
    pub password: String,

    /// Older names of the admin account. The first one found is renamed to
    /// `username` instead of creating a second admin.
    #[serde(default)]
    pub previous_usernames: Vec<String>,
}

impl std::fmt::Debug for DefaultAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("previous_usernames", &self.previous_usernames)
            .finish()
    }
}

// =============================================================================
// Store Config
// =============================================================================

/// Top-level store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `:memory:` for a throwaway store.
    pub database_path: PathBuf,

    /// Products with `0 < quantity < threshold` are low stock.
    pub low_stock_threshold: i64,

    /// Directory handed to [`crate::backup::Backup::write_to_dir`].
    pub backup_dir: Option<PathBuf>,

    /// Seed-or-repair target for the admin account.
    pub default_admin: Option<DefaultAdmin>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database_path: Self::default_database_path(),
            low_stock_threshold: LOW_STOCK_THRESHOLD,
            backup_dir: None,
            default_admin: None,
        }
    }
}

impl StoreConfig {
    /// Config for a throwaway in-memory store.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockbook.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load store config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(DbError::Config("database_path must not be empty".into()));
        }

        if self.low_stock_threshold <= 0 {
            return Err(DbError::Config(
                "low_stock_threshold must be greater than 0".into(),
            ));
        }

        if let Some(admin) = &self.default_admin {
            if admin.username.trim().is_empty() || admin.password.is_empty() {
                return Err(DbError::Config(
                    "default_admin needs a username and a password".into(),
                ));
            }
        }

        Ok(())
    }

    /// Builds the pool configuration for this store.
    pub fn db_config(&self) -> DbConfig {
        if self.database_path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database_path)
        }
    }

    /// Applies `STOCKBOOK_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("STOCKBOOK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }

        if let Some(threshold) = var("STOCKBOOK_LOW_STOCK_THRESHOLD") {
            match threshold.parse::<i64>() {
                Ok(t) => self.low_stock_threshold = t,
                Err(_) => warn!(value = %threshold, "Ignoring invalid low stock threshold"),
            }
        }

        if let Some(dir) = var("STOCKBOOK_BACKUP_DIR") {
            self.backup_dir = Some(PathBuf::from(dir));
        }

        // Both must be present to declare an admin from the environment
        if let (Some(username), Some(password)) = (
            var("STOCKBOOK_ADMIN_USERNAME"),
            var("STOCKBOOK_ADMIN_PASSWORD"),
        ) {
            debug!(username = %username, "Overriding default admin from environment");
            let previous_usernames = self
                .default_admin
                .take()
                .map(|a| a.previous_usernames)
                .unwrap_or_default();
            self.default_admin = Some(DefaultAdmin {
                username,
                password,
                previous_usernames,
            });
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "stockbook", "stockbook")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("stockbook.toml"))
    }

    fn default_database_path() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("stockbook.db"))
            .unwrap_or_else(|| PathBuf::from("./stockbook.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.low_stock_threshold, 100);
        assert!(config.default_admin.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = StoreConfig::from_toml(
            r#"
            database_path = "/tmp/shop.db"
            low_stock_threshold = 20

            [default_admin]
            username = "admin"
            password = "admin"
            previous_usernames = ["root"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.low_stock_threshold, 20);
        let admin = config.default_admin.unwrap();
        assert_eq!(admin.previous_usernames, vec!["root".to_string()]);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = StoreConfig::from_toml("low_stock_threshold = \"lots\"").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("STOCKBOOK_DB_PATH", "/data/x.db"),
            ("STOCKBOOK_LOW_STOCK_THRESHOLD", "7"),
            ("STOCKBOOK_ADMIN_USERNAME", "boss"),
            ("STOCKBOOK_ADMIN_PASSWORD", "pw"),
        ]);
        let mut config = StoreConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/data/x.db"));
        assert_eq!(config.low_stock_threshold, 7);
        assert_eq!(config.default_admin.unwrap().username, "boss");
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = StoreConfig {
            low_stock_threshold: 0,
            ..StoreConfig::in_memory()
        };
        assert!(matches!(config.validate(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let admin = DefaultAdmin {
            username: "admin".into(),
            password: "hunter2".into(),
            previous_usernames: vec![],
        };
        assert!(!format!("{:?}", admin).contains("hunter2"));
    }
}
