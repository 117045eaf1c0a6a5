//! # Cardex
//!
//! Reconstructs the running stock balance of one product from its
//! transaction history.
//!
//! ## Reconstruction
//! ```text
//! initial = product.quantity - Σ change
//!
//!   t1 +50   before 0    after 50
//!   t2 -20   before 50   after 30
//!   t3  -5   before 30   after 25   ← after == product.quantity
//!
//! returned newest-first: [t3, t2, t1]
//! ```
//!
//! Ordering is chronological by timestamp. Transactions sharing a timestamp
//! (lines of one invoice) keep the order they were given in.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ledger::derive_initial;
use crate::types::{Product, Transaction};

/// One row of the cardex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CardexEntry {
    pub transaction: Transaction,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Full history of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cardex {
    pub product_id: String,
    pub product_name: String,
    /// Balance before the oldest transaction.
    pub opening_balance: i64,
    pub current_quantity: i64,
    /// Newest first.
    pub entries: Vec<CardexEntry>,
}

impl Cardex {
    /// Builds the cardex for `product`.
    ///
    /// ## Arguments
    /// * `product` - The product whose history is shown
    /// * `transactions` - Its transactions in insertion order; entries for
    ///   other products are ignored
    pub fn build(product: &Product, transactions: Vec<Transaction>) -> Self {
        let mut history: Vec<Transaction> = transactions
            .into_iter()
            .filter(|t| t.product_id == product.id)
            .collect();
        // sort_by_key is stable, so equal timestamps keep insertion order
        history.sort_by_key(|t| t.timestamp);

        let sum: i64 = history.iter().map(|t| t.quantity_change).sum();
        let opening_balance = derive_initial(product.quantity, sum);

        let mut balance = opening_balance;
        let mut entries: Vec<CardexEntry> = history
            .into_iter()
            .map(|transaction| {
                let balance_before = balance;
                balance += transaction.quantity_change;
                CardexEntry {
                    transaction,
                    balance_before,
                    balance_after: balance,
                }
            })
            .collect();
        entries.reverse();

        Cardex {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            opening_balance,
            current_quantity: product.quantity,
            entries,
        }
    }

    /// Balance after the newest transaction, or the opening balance if none.
    pub fn closing_balance(&self) -> i64 {
        self.entries
            .first()
            .map(|e| e.balance_after)
            .unwrap_or(self.opening_balance)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use chrono::{Duration, TimeZone, Utc};

    fn txn(id: &str, change: i64, minutes: i64) -> Transaction {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Transaction {
            id: id.to_string(),
            kind: if change >= 0 {
                TransactionType::Purchase
            } else {
                TransactionType::Sale
            },
            invoice_number: format!("INV-{}", id),
            product_id: "p1".to_string(),
            quantity_change: change,
            timestamp: base + Duration::minutes(minutes),
        }
    }

    fn product(quantity: i64) -> Product {
        let mut p = Product::new("p1", "Bolts", 0, Utc::now());
        p.quantity = quantity;
        p
    }

    #[test]
    fn test_cardex_walks_forward_and_returns_newest_first() {
        let cardex = Cardex::build(
            &product(25),
            vec![txn("a", 50, 0), txn("b", -20, 1), txn("c", -5, 2)],
        );

        assert_eq!(cardex.opening_balance, 0);
        let ids: Vec<_> = cardex.entries.iter().map(|e| e.transaction.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(cardex.entries[2].balance_before, 0);
        assert_eq!(cardex.entries[2].balance_after, 50);
        assert_eq!(cardex.entries[0].balance_before, 30);
        assert_eq!(cardex.closing_balance(), 25);
    }

    #[test]
    fn test_cardex_sorts_out_of_order_input() {
        let cardex = Cardex::build(&product(30), vec![txn("late", -20, 5), txn("early", 50, 0)]);
        assert_eq!(cardex.entries[0].transaction.id, "late");
        assert_eq!(cardex.entries[0].balance_after, 30);
    }

    #[test]
    fn test_cardex_ties_keep_insertion_order() {
        let cardex = Cardex::build(&product(3), vec![txn("x", 1, 0), txn("y", 2, 0)]);
        // oldest-first walk was x then y
        assert_eq!(cardex.entries[1].transaction.id, "x");
        assert_eq!(cardex.entries[1].balance_after, 1);
        assert_eq!(cardex.entries[0].balance_after, 3);
    }

    #[test]
    fn test_cardex_opening_balance_from_initial_stock() {
        let cardex = Cardex::build(&product(15), vec![txn("a", 5, 0)]);
        assert_eq!(cardex.opening_balance, 10);
        assert_eq!(cardex.closing_balance(), 15);
    }

    #[test]
    fn test_empty_history() {
        let cardex = Cardex::build(&product(7), vec![]);
        assert!(cardex.entries.is_empty());
        assert_eq!(cardex.closing_balance(), 7);
    }
}
