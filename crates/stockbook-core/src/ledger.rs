//! # Ledger Math
//!
//! Pure stock arithmetic behind every ledger operation.
//!
//! ## Where This Fits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stockbook-db::Ledger::post_invoice                                    │
//! │       │                                                                 │
//! │       ├── load current quantities (inside the sqlx transaction)        │
//! │       ├── plan_invoice(...)        ← THIS MODULE, may reject           │
//! │       ├── write one row per Posting                                    │
//! │       └── commit                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here touches storage. A plan is either fully valid or an error,
//! so the caller never has to undo half an invoice.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Invoice, Product};
use crate::validation::validate_invoice;

// =============================================================================
// Posting
// =============================================================================

/// One planned quantity movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub product_id: String,
    /// Signed change to record on the transaction.
    pub change: i64,
    /// Product quantity after the change.
    pub new_quantity: i64,
}

// =============================================================================
// Guards
// =============================================================================

/// Applies `delta` to `current`, refusing to go below zero.
///
/// ## Returns
/// The new quantity.
///
/// ## Errors
/// - `InsufficientStock` with `requested = -delta` when the result is negative
/// - `Validation(OutOfRange)` on arithmetic overflow
pub fn apply_delta(product_id: &str, current: i64, delta: i64) -> CoreResult<i64> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        })?;

    if next < 0 {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            requested: delta.saturating_neg(),
            available: current,
        });
    }

    Ok(next)
}

/// Change recorded by a recount: `new - current`.
pub fn recount_change(current: i64, new_quantity: i64) -> i64 {
    new_quantity - current
}

/// Quantity shift caused by editing a transaction from `old` to `new`.
pub fn edit_delta(old_change: i64, new_change: i64) -> i64 {
    new_change - old_change
}

/// Quantity shift caused by deleting a transaction.
pub fn reversal(change: i64) -> i64 {
    -change
}

// =============================================================================
// Invoice Planning
// =============================================================================

/// Validates an invoice and computes its postings.
///
/// `current` looks up the present quantity of a product, `None` if the
/// product does not exist.
///
/// ## Errors
/// - `Validation` for shape problems (see [`validate_invoice`])
/// - `ProductNotFound` for the first line whose product is missing
/// - `InsufficientStock` for the first sale line exceeding stock
///
/// ## Example
/// ```rust
/// use stockbook_core::ledger::plan_invoice;
/// use stockbook_core::{Invoice, InvoiceLine, InvoiceType};
///
/// let invoice = Invoice {
///     kind: InvoiceType::Purchase,
///     invoice_number: "PO-7".into(),
///     lines: vec![InvoiceLine { product_id: "p1".into(), quantity: 50 }],
/// };
/// let plan = plan_invoice(&invoice, |_| Some(0)).unwrap();
/// assert_eq!(plan[0].new_quantity, 50);
/// ```
pub fn plan_invoice<F>(invoice: &Invoice, current: F) -> CoreResult<Vec<Posting>>
where
    F: Fn(&str) -> Option<i64>,
{
    validate_invoice(invoice)?;

    invoice
        .lines
        .iter()
        .map(|line| {
            let available = current(&line.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            let change = invoice.kind.signed(line.quantity);
            let new_quantity = apply_delta(&line.product_id, available, change)?;

            Ok(Posting {
                product_id: line.product_id.clone(),
                change,
                new_quantity,
            })
        })
        .collect()
}

// =============================================================================
// Drift Detection
// =============================================================================

/// A product whose stored quantity disagrees with its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDrift {
    pub product_id: String,
    pub product_name: String,
    pub stored_quantity: i64,
    /// `initial_quantity + Σ quantity_change`.
    pub expected_quantity: i64,
}

/// Starting balance implied by the current quantity and the history.
pub fn derive_initial(quantity: i64, change_sum: i64) -> i64 {
    quantity - change_sum
}

/// Compares a product against the sum of its transaction changes.
pub fn check_drift(product: &Product, change_sum: i64) -> Option<LedgerDrift> {
    let expected = product.initial_quantity + change_sum;

    (expected != product.quantity).then(|| LedgerDrift {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        stored_quantity: product.quantity,
        expected_quantity: expected,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvoiceLine, InvoiceType};
    use chrono::Utc;
    use std::collections::HashMap;

    fn invoice(kind: InvoiceType, lines: &[(&str, i64)]) -> Invoice {
        Invoice {
            kind,
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
    fn test_apply_delta() {
        assert_eq!(apply_delta("p", 30, 20).unwrap(), 50);
        assert_eq!(apply_delta("p", 30, -30).unwrap(), 0);

        match apply_delta("p", 30, -100) {
            Err(CoreError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 100);
                assert_eq!(available, 30);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_delta_overflow() {
        assert!(matches!(
            apply_delta("p", i64::MAX, 1),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_purchase() {
        let stock = HashMap::from([("p1".to_string(), 0), ("p2".to_string(), 5)]);
        let plan = plan_invoice(
            &invoice(InvoiceType::Purchase, &[("p1", 50), ("p2", 1)]),
            |id| stock.get(id).copied(),
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].change, 50);
        assert_eq!(plan[0].new_quantity, 50);
        assert_eq!(plan[1].new_quantity, 6);
    }

    #[test]
    fn test_plan_sale_short_line_rejects_everything() {
        let stock = HashMap::from([("p1".to_string(), 50), ("p2".to_string(), 3)]);
        let result = plan_invoice(
            &invoice(InvoiceType::Sale, &[("p1", 10), ("p2", 4)]),
            |id| stock.get(id).copied(),
        );

        assert!(matches!(
            result,
            Err(CoreError::InsufficientStock { ref product_id, requested: 4, available: 3 })
                if product_id == "p2"
        ));
    }

    #[test]
    fn test_plan_unknown_product() {
        let result = plan_invoice(&invoice(InvoiceType::Purchase, &[("ghost", 1)]), |_| None);
        assert!(matches!(result, Err(CoreError::ProductNotFound(ref id)) if id == "ghost"));
    }

    #[test]
    fn test_edit_and_reversal_math() {
        assert_eq!(recount_change(30, 25), -5);
        assert_eq!(edit_delta(-20, -15), 5);
        assert_eq!(reversal(-5), 5);
    }

    #[test]
    fn test_check_drift() {
        let mut product = Product::new("p1", "Bolts", 10, Utc::now());
        product.quantity = 40;

        assert!(check_drift(&product, 30).is_none());

        let drift = check_drift(&product, 25).unwrap();
        assert_eq!(drift.stored_quantity, 40);
        assert_eq!(drift.expected_quantity, 35);
        assert_eq!(derive_initial(40, 30), 10);
    }
}
