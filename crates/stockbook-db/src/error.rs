//! # Database Error Types
//!
//! Error types for storage operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (ledger rules)          │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::kind() → ErrorKind ← Stable taxonomy for callers             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller displays user-friendly message                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockbook_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and domain errors and provide additional
/// context for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `get` returned no row for an id an operation requires
    /// - Delete of an id that doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Product, tag, category or user name already taken (case-insensitive)
    /// - Any UNIQUE index violation
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Product referencing a tag/category id that doesn't exist
    /// - User allowed-category referencing a missing category
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Backup blob could not be decoded or failed integrity checks.
    #[error("Corrupt backup: {0}")]
    CorruptBlob(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Invalid or unreadable store configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),

    /// Business rule violation raised by stockbook-core.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Coarse classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConstraintViolation,
    InsufficientStock,
    NotFound,
    CorruptBlob,
    AuthorizationDenied,
    Validation,
    Storage,
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Classifies the error.
    ///
    /// ## Mapping
    /// ```text
    /// UniqueViolation, ForeignKeyViolation   → ConstraintViolation
    /// Core(InsufficientStock)                → InsufficientStock
    /// NotFound, Core(*NotFound)              → NotFound
    /// CorruptBlob                            → CorruptBlob
    /// Core(AuthorizationDenied)              → AuthorizationDenied
    /// Core(Validation | SelfDeletion |
    ///      InvalidCredentials)               → Validation
    /// everything else                        → Storage
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } => {
                ErrorKind::ConstraintViolation
            }
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::CorruptBlob(_) => ErrorKind::CorruptBlob,
            DbError::Core(core) => match core {
                CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                CoreError::ProductNotFound(_)
                | CoreError::TransactionNotFound(_)
                | CoreError::UserNotFound(_) => ErrorKind::NotFound,
                CoreError::AuthorizationDenied { .. } => ErrorKind::AuthorizationDenied,
                CoreError::SelfDeletion
                | CoreError::InvalidCredentials
                | CoreError::Validation(_) => ErrorKind::Validation,
            },
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::PoolExhausted
            | DbError::Config(_)
            | DbError::Internal(_) => ErrorKind::Storage,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DbError::duplicate("name", "Bolts").kind(), ErrorKind::ConstraintViolation);
        assert_eq!(DbError::not_found("Product", "p1").kind(), ErrorKind::NotFound);
        assert_eq!(DbError::CorruptBlob("eof".into()).kind(), ErrorKind::CorruptBlob);
        assert_eq!(DbError::PoolExhausted.kind(), ErrorKind::Storage);

        let short: DbError = CoreError::InsufficientStock {
            product_id: "p1".into(),
            requested: 5,
            available: 1,
        }
        .into();
        assert_eq!(short.kind(), ErrorKind::InsufficientStock);

        let missing: DbError = CoreError::TransactionNotFound("t9".into()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let invalid: DbError = ValidationError::Required { field: "notes".into() }.into();
        assert_eq!(invalid.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_core_errors_display_transparently() {
        let err: DbError = CoreError::SelfDeletion.into();
        assert_eq!(err.to_string(), "A user cannot delete their own account");
    }
}
