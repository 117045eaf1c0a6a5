//! # Validation Module
//!
//! Input validation utilities for Stockbook.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (UI / CLI)                                            │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: stockbook-db operations                                      │
//! │  └── THIS MODULE: shape rules checked before any statement runs        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger pre-flight (stockbook-db, inside the transaction)     │
//! │  ├── Product existence                                                 │
//! │  └── Stock sufficiency                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (case-insensitive) names                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::validation::{validate_product_name, validate_line_quantity};
//!
//! validate_product_name("Bolts M6").unwrap();
//! validate_line_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::Invoice;
use crate::{MAX_NAME_LENGTH, MAX_NOTES_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, tag, category).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_NAME_LENGTH` characters
///
/// ## Returns
/// The trimmed name.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(name.to_string())
}

/// Validates a product name.
///
/// ## Example
/// ```rust
/// use stockbook_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Hex bolt M6").is_ok());
/// assert!(validate_product_name("   ").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    validate_name("product name", name)
}

pub fn validate_tag_name(name: &str) -> ValidationResult<String> {
    validate_name("tag name", name)
}

pub fn validate_category_name(name: &str) -> ValidationResult<String> {
    validate_name("category name", name)
}

/// Validates a username.
///
/// ## Rules
/// - Must not be empty after trimming
/// - No whitespace inside
pub fn validate_username(username: &str) -> ValidationResult<String> {
    let username = validate_name("username", username)?;

    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }

    Ok(username)
}

/// Validates a new password. Passwords are not trimmed.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::required("password"));
    }

    Ok(())
}

/// Validates an allowed tag prefix for a restricted user.
///
/// ## Returns
/// The trimmed prefix.
pub fn validate_tag_prefix(prefix: &str) -> ValidationResult<String> {
    let prefix = prefix.trim();

    if prefix.is_empty() {
        return Err(ValidationError::required("tag prefix"));
    }

    if prefix.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "tag prefix".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(prefix.to_string())
}

/// Validates free-text notes (recount notes, adjustment reasons).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_NOTES_LENGTH` characters
pub fn validate_notes(field: &str, notes: &str) -> ValidationResult<String> {
    let notes = notes.trim();

    if notes.is_empty() {
        return Err(ValidationError::required(field));
    }

    if notes.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTES_LENGTH,
        });
    }

    Ok(notes.to_string())
}

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (matches everything)
/// - Maximum `MAX_NAME_LENGTH` characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an invoice line quantity.
///
/// ## Rules
/// - Must be positive (> 0); the invoice type supplies the sign
pub fn validate_line_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    Ok(())
}

/// Validates an absolute stock figure (recount target, initial stock).
///
/// ## Rules
/// - Must be zero or more
pub fn validate_stock_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates an incremental adjustment. Zero is meaningless and rejected.
pub fn validate_adjustment(change: i64) -> ValidationResult<()> {
    if change == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "adjustment".to_string(),
            reason: "must not be zero".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Invoice Validator
// =============================================================================

/// Validates the shape of an invoice before the ledger looks at stock.
///
/// ## Rules
/// - Invoice number must not be empty
/// - At least one line
/// - Every line quantity > 0
/// - A product appears on at most one line
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Post Invoice                                                           │
/// │                                                                         │
/// │  validate_invoice(&invoice) ← THIS FUNCTION                            │
/// │       │                                                                 │
/// │       ├── no lines?        → Required("invoice lines")                 │
/// │       ├── qty <= 0?        → MustBePositive("quantity")                │
/// │       ├── product twice?   → Duplicate("product", id)                  │
/// │       │                                                                 │
/// │       └── OK → ledger pre-flight (existence, stock)                    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_invoice(invoice: &Invoice) -> ValidationResult<()> {
    if invoice.invoice_number.trim().is_empty() {
        return Err(ValidationError::required("invoice number"));
    }

    if invoice.lines.is_empty() {
        return Err(ValidationError::required("invoice lines"));
    }

    let mut seen = HashSet::with_capacity(invoice.lines.len());
    for line in &invoice.lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::required("product"));
        }

        validate_line_quantity(line.quantity)?;

        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product".to_string(),
                value: line.product_id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvoiceLine, InvoiceType};

    fn invoice(lines: &[(&str, i64)]) -> Invoice {
        Invoice {
            kind: InvoiceType::Sale,
            invoice_number: "INV-1".to_string(),
            lines: lines
                .iter()
                .map(|(id, qty)| InvoiceLine {
                    product_id: id.to_string(),
                    quantity: *qty,
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_names() {
        assert_eq!(validate_product_name("  Bolts ").unwrap(), "Bolts");
        assert!(validate_product_name("").is_err());
        assert!(validate_tag_name(&"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
        assert!(validate_category_name("Hardware").is_ok());
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username(" admin ").unwrap(), "admin");
        assert!(validate_username("").is_err());
        assert!(validate_username("john doe").is_err());
    }

    #[test]
    fn test_validate_notes() {
        assert!(validate_notes("notes", "count").is_ok());
        assert!(matches!(
            validate_notes("notes", "  "),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_quantities() {
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_line_quantity(0).is_err());
        assert!(validate_line_quantity(-3).is_err());

        assert!(validate_stock_quantity("new quantity", 0).is_ok());
        assert!(validate_stock_quantity("new quantity", -1).is_err());

        assert!(validate_adjustment(-2).is_ok());
        assert!(validate_adjustment(0).is_err());
    }

    #[test]
    fn test_validate_invoice() {
        assert!(validate_invoice(&invoice(&[("p1", 2), ("p2", 1)])).is_ok());
        assert!(validate_invoice(&invoice(&[])).is_err());
        assert!(validate_invoice(&invoice(&[("p1", 0)])).is_err());
    }

    #[test]
    fn test_validate_invoice_rejects_repeated_product() {
        let err = validate_invoice(&invoice(&[("p1", 2), ("p1", 3)])).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { ref value, .. } if value == "p1"));
    }

    #[test]
    fn test_validate_invoice_number_required() {
        let mut inv = invoice(&[("p1", 1)]);
        inv.invoice_number = " ".to_string();
        assert!(validate_invoice(&inv).is_err());
    }
}
