//! # Error Types
//!
//! Domain-specific error types for stockbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbook-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger / access / account rule violations      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockbook-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product ID, requested amount, etc.)
//! 3. Errors are enum variants, never String
//! 4. A failed operation never leaves a partial write behind

use thiserror::Error;

use crate::types::Permission;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. Every ledger operation
/// that returns one of these has written nothing to the store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A stock movement would take more than the product holds.
    ///
    /// ## When This Occurs
    /// - A sale invoice line asks for more than the current quantity
    /// - Editing or deleting a transaction would push the product below zero
    ///
    /// ## User Workflow
    /// ```text
    /// Sale invoice: line (P1, qty 100)
    ///      │
    ///      ▼
    /// Pre-flight: P1 holds 30
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "P1", requested: 100, available: 30 }
    ///      │
    ///      ▼
    /// Whole invoice rejected, nothing posted
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Transaction id does not resolve.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// User id does not resolve.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The caller lacks a permission it needs.
    ///
    /// The ledger never raises this itself; callers use
    /// [`User::require`](crate::types::User::require) before invoking it.
    #[error("Permission denied: {permission} required")]
    AuthorizationDenied { permission: Permission },

    /// A user tried to delete their own account.
    #[error("A user cannot delete their own account")]
    SelfDeletion,

    /// Username/password pair (or current password) did not match.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any statement runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value inside one request (e.g. the same product twice on an invoice).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// Value is still referenced and cannot be removed.
    #[error("{field} '{value}' is still referenced by: {used_by:?}")]
    InUse {
        field: String,
        value: String,
        used_by: Vec<String>,
    },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub(crate) fn must_be_positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            requested: 100,
            available: 30,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-1: available 30, requested 100"
        );
    }

    #[test]
    fn test_authorization_message_names_permission() {
        let err = CoreError::AuthorizationDenied {
            permission: Permission::CanRecountStock,
        };
        assert_eq!(err.to_string(), "Permission denied: CAN_RECOUNT_STOCK required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("notes").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: notes is required");
    }
}
