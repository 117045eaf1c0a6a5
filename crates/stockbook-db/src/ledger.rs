//! # Ledger Engine
//!
//! The only code path that changes `products.quantity` after creation.
//!
//! ## Atomic Unit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Every Ledger Operation                               │
//! │                                                                         │
//! │  validate input (stockbook-core, no I/O)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │       │                                                                 │
//! │       ├── read product(s) / transaction                                │
//! │       ├── plan + guard (stockbook-core::ledger) ── Err ──► ROLLBACK    │
//! │       ├── write transaction row(s)                                     │
//! │       ├── write product quantity                                       │
//! │       ├── append audit row                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any `?` before COMMIT drops the sqlx::Transaction, which rolls back.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariant
//! `quantity == initial_quantity + Σ quantity_change` for every product,
//! and `quantity >= 0`. [`Ledger::verify_all`] reports violations.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::audit;
use crate::error::{DbError, DbResult};
use crate::repository::{new_id, product, transaction};
use stockbook_core::ledger::{
    apply_delta, check_drift, edit_delta, plan_invoice, recount_change, reversal, LedgerDrift,
};
use stockbook_core::validation::{validate_adjustment, validate_notes, validate_stock_quantity};
use stockbook_core::{Actor, CoreError, Invoice, LogAction, Transaction, TransactionType};

/// Stock-changing operations.
///
/// ## Usage
/// ```rust,ignore
/// let posted = db.ledger().post_invoice(&invoice, &user.actor()).await?;
/// db.ledger().recount(&product_id, 25, "shelf count", &user.actor()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Ledger { pool }
    }

    // =========================================================================
    // Post Invoice
    // =========================================================================

    /// Posts a purchase or sale invoice.
    ///
    /// ## What This Does
    /// 1. Checks every line (positive quantity, no repeated product)
    /// 2. Checks every product exists and, for a sale, holds enough stock
    /// 3. Writes one transaction per line, all sharing one timestamp
    /// 4. Moves each product's quantity and `last_updated`
    /// 5. Appends one `CREATE_INVOICE_*` audit row
    ///
    /// ## Returns
    /// The written transactions, in line order.
    ///
    /// ## Errors
    /// * `Core(Validation)` - empty invoice, bad quantity, repeated product
    /// * `Core(ProductNotFound)` - a line names a missing product
    /// * `Core(InsufficientStock)` - a sale line exceeds stock
    ///
    /// On any error nothing is written.
    pub async fn post_invoice(&self, invoice: &Invoice, actor: &Actor) -> DbResult<Vec<Transaction>> {
        let mut tx = self.pool.begin().await?;

        let mut stock = HashMap::with_capacity(invoice.lines.len());
        for line in &invoice.lines {
            if let Some(p) = product::fetch(&mut tx, &line.product_id).await? {
                stock.insert(p.id, p.quantity);
            }
        }

        let plan = plan_invoice(invoice, |id| stock.get(id).copied()).map_err(|e| {
            warn!(
                invoice = %invoice.invoice_number,
                kind = ?invoice.kind,
                error = %e,
                "Invoice rejected"
            );
            e
        })?;

        let now = Utc::now();
        let kind = invoice.kind.transaction_type();
        let invoice_number = invoice.invoice_number.trim().to_string();
        let mut written = Vec::with_capacity(plan.len());

        for posting in plan {
            let txn = Transaction {
                id: new_id(),
                kind,
                invoice_number: invoice_number.clone(),
                product_id: posting.product_id.clone(),
                quantity_change: posting.change,
                timestamp: now,
            };
            transaction::insert(&mut tx, &txn).await?;
            product::set_quantity(&mut tx, &posting.product_id, posting.new_quantity, now).await?;
            written.push(txn);
        }

        audit::record(
            &mut tx,
            actor,
            invoice.kind.log_action(),
            format!(
                "{} invoice '{}' with {} item(s)",
                kind,
                invoice_number,
                written.len()
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            invoice = %invoice_number,
            kind = %kind,
            lines = written.len(),
            "Invoice posted"
        );
        Ok(written)
    }

    // =========================================================================
    // Recount
    // =========================================================================

    /// Sets a product's stock to a counted figure.
    ///
    /// Records one `recount` transaction with `change = new - current` and
    /// the notes as its invoice number, then sets the quantity absolutely.
    ///
    /// ## Errors
    /// * `Core(Validation)` - negative quantity or empty notes
    /// * `Core(ProductNotFound)` - unknown product
    pub async fn recount(
        &self,
        product_id: &str,
        new_quantity: i64,
        notes: &str,
        actor: &Actor,
    ) -> DbResult<Transaction> {
        validate_stock_quantity("new quantity", new_quantity)?;
        let notes = validate_notes("notes", notes)?;

        let mut tx = self.pool.begin().await?;

        let current = product::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let now = Utc::now();
        let txn = Transaction {
            id: new_id(),
            kind: TransactionType::Recount,
            invoice_number: notes,
            product_id: current.id.clone(),
            quantity_change: recount_change(current.quantity, new_quantity),
            timestamp: now,
        };
        transaction::insert(&mut tx, &txn).await?;
        product::set_quantity(&mut tx, &current.id, new_quantity, now).await?;

        audit::record(
            &mut tx,
            actor,
            LogAction::RecountStock,
            format!(
                "Recounted '{}': {} -> {} ({})",
                current.name, current.quantity, new_quantity, txn.invoice_number
            ),
        )
        .await?;

        tx.commit().await?;

        info!(
            product_id = %current.id,
            from = current.quantity,
            to = new_quantity,
            "Stock recounted"
        );
        Ok(txn)
    }

    // =========================================================================
    // Adjust
    // =========================================================================

    /// Applies an incremental correction as an `adjustment` transaction.
    ///
    /// ## Errors
    /// * `Core(Validation)` - zero change or empty reason
    /// * `Core(ProductNotFound)` - unknown product
    /// * `Core(InsufficientStock)` - the result would be negative
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        change: i64,
        reason: &str,
        actor: &Actor,
    ) -> DbResult<Transaction> {
        validate_adjustment(change)?;
        let reason = validate_notes("reason", reason)?;

        let mut tx = self.pool.begin().await?;

        let current = product::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        let new_quantity = apply_delta(&current.id, current.quantity, change)?;

        let now = Utc::now();
        let txn = Transaction {
            id: new_id(),
            kind: TransactionType::Adjustment,
            invoice_number: reason,
            product_id: current.id.clone(),
            quantity_change: change,
            timestamp: now,
        };
        transaction::insert(&mut tx, &txn).await?;
        product::set_quantity(&mut tx, &current.id, new_quantity, now).await?;

        audit::record(
            &mut tx,
            actor,
            LogAction::AdjustStock,
            format!(
                "Adjusted '{}' by {:+} ({})",
                current.name, change, txn.invoice_number
            ),
        )
        .await?;

        tx.commit().await?;

        info!(product_id = %current.id, change, "Stock adjusted");
        Ok(txn)
    }

    // =========================================================================
    // Edit Transaction
    // =========================================================================

    /// Rewrites a transaction's change and invoice number.
    ///
    /// The product moves by `new - old`. If the product has been deleted,
    /// only the row is edited. The timestamp is refreshed to now.
    ///
    /// ## Errors
    /// * `Core(TransactionNotFound)` - unknown transaction
    /// * `Core(InsufficientStock)` - the product would go negative
    pub async fn edit_transaction(
        &self,
        transaction_id: &str,
        new_change: i64,
        new_invoice_number: &str,
        actor: &Actor,
    ) -> DbResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let old = transaction::fetch(&mut tx, transaction_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;
        let now = Utc::now();
        let delta = edit_delta(old.quantity_change, new_change);

        let label = match product::fetch(&mut tx, &old.product_id).await? {
            Some(p) => {
                let new_quantity = apply_delta(&p.id, p.quantity, delta).map_err(|e| {
                    warn!(transaction_id = %old.id, error = %e, "Edit rejected");
                    e
                })?;
                product::set_quantity(&mut tx, &p.id, new_quantity, now).await?;
                format!("'{}'", p.name)
            }
            None => format!("deleted product {}", old.product_id),
        };

        let invoice_number = new_invoice_number.trim().to_string();
        transaction::update_change(&mut tx, &old.id, new_change, &invoice_number, now).await?;

        audit::record(
            &mut tx,
            actor,
            LogAction::UpdateTransaction,
            format!(
                "Edited {} transaction for {}: {} -> {} (invoice '{}' -> '{}')",
                old.kind, label, old.quantity_change, new_change, old.invoice_number, invoice_number
            ),
        )
        .await?;

        tx.commit().await?;

        info!(transaction_id = %old.id, delta, "Transaction edited");
        Ok(Transaction {
            quantity_change: new_change,
            invoice_number,
            timestamp: now,
            ..old
        })
    }

    // =========================================================================
    // Delete Transaction
    // =========================================================================

    /// Removes a transaction and reverses its effect on the product.
    ///
    /// Stock never goes negative, so a purchase cannot be deleted once the
    /// stock it brought in has been sold. Post a correcting sale or recount
    /// instead.
    ///
    /// ## Returns
    /// The deleted row.
    ///
    /// ## Errors
    /// * `Core(TransactionNotFound)` - unknown transaction
    /// * `Core(InsufficientStock)` - reversing would make the product negative
    pub async fn delete_transaction(&self, transaction_id: &str, actor: &Actor) -> DbResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let old = transaction::fetch(&mut tx, transaction_id)
            .await?
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        let label = match product::fetch(&mut tx, &old.product_id).await? {
            Some(p) => {
                let new_quantity = apply_delta(&p.id, p.quantity, reversal(old.quantity_change))
                    .map_err(|e| {
                        warn!(transaction_id = %old.id, error = %e, "Delete rejected");
                        e
                    })?;
                product::set_quantity(&mut tx, &p.id, new_quantity, Utc::now()).await?;
                format!("'{}'", p.name)
            }
            None => format!("deleted product {}", old.product_id),
        };

        transaction::delete(&mut tx, &old.id).await?;

        audit::record(
            &mut tx,
            actor,
            LogAction::DeleteTransaction,
            format!(
                "Deleted {} transaction '{}' for {} ({:+})",
                old.kind, old.invoice_number, label, old.quantity_change
            ),
        )
        .await?;

        tx.commit().await?;

        info!(transaction_id = %old.id, "Transaction deleted");
        Ok(old)
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Checks one product against its history.
    ///
    /// ## Returns
    /// * `Ok(None)` - consistent
    /// * `Ok(Some(drift))` - stored quantity disagrees with the ledger
    pub async fn verify_product(&self, product_id: &str) -> DbResult<Option<LedgerDrift>> {
        let mut conn = self.pool.acquire().await?;

        let p = product::fetch(&mut conn, product_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::ProductNotFound(product_id.to_string())))?;
        let sum = transaction::sum_for_product(&mut conn, product_id).await?;

        let drift = check_drift(&p, sum);
        if let Some(d) = &drift {
            warn!(
                product_id = %d.product_id,
                stored = d.stored_quantity,
                expected = d.expected_quantity,
                "Ledger drift detected"
            );
        }
        Ok(drift)
    }

    /// Checks every product against its history.
    pub async fn verify_all(&self) -> DbResult<Vec<LedgerDrift>> {
        let mut conn = self.pool.acquire().await?;

        let products = product::fetch_all(&mut conn).await?;
        let sums = transaction::sums_by_product(&mut conn).await?;

        let drifts: Vec<LedgerDrift> = products
            .iter()
            .filter_map(|p| check_drift(p, sums.get(&p.id).copied().unwrap_or(0)))
            .collect();

        if drifts.is_empty() {
            info!(products = products.len(), "Ledger verified");
        } else {
            warn!(count = drifts.len(), "Ledger drift detected");
        }
        Ok(drifts)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pool::{Database, DbConfig};
    use stockbook_core::{InvoiceLine, InvoiceType, Product};

    fn actor() -> Actor {
        Actor::new("u1", "alice")
    }

    async fn setup(stock: &[(&str, i64)]) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for (id, qty) in stock {
            db.products()
                .upsert(&Product::new(*id, format!("Product {}", id), *qty, Utc::now()))
                .await
                .unwrap();
        }
        db
    }

    fn invoice(kind: InvoiceType, lines: &[(&str, i64)]) -> Invoice {
        Invoice {
            kind,
            invoice_number: "INV-1".into(),
            lines: lines
                .iter()
                .map(|(id, q)| InvoiceLine {
                    product_id: id.to_string(),
                    quantity: *q,
                })
                .collect(),
        }
    }

    async fn quantity(db: &Database, id: &str) -> i64 {
        db.products().get(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn test_purchase_posts_lines_and_audit() {
        let db = setup(&[("p1", 0), ("p2", 5)]).await;

        let posted = db
            .ledger()
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 50), ("p2", 3)]), &actor())
            .await
            .unwrap();

        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].timestamp, posted[1].timestamp);
        assert_eq!(quantity(&db, "p1").await, 50);
        assert_eq!(quantity(&db, "p2").await, 8);

        let logs = db.logs().list(None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::CreateInvoicePurchase);
    }

    #[tokio::test]
    async fn test_short_sale_writes_nothing() {
        let db = setup(&[("p1", 50), ("p2", 3)]).await;

        let err = db
            .ledger()
            .post_invoice(&invoice(InvoiceType::Sale, &[("p1", 10), ("p2", 4)]), &actor())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, "p1").await, 50);
        assert_eq!(quantity(&db, "p2").await, 3);
        assert!(db.transactions().list().await.unwrap().is_empty());
        assert_eq!(db.logs().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invoice_with_missing_product() {
        let db = setup(&[("p1", 1)]).await;
        let err = db
            .ledger()
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 1), ("ghost", 1)]), &actor())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(quantity(&db, "p1").await, 1);
    }

    #[tokio::test]
    async fn test_invoice_shape_errors() {
        let db = setup(&[("p1", 10)]).await;
        let ledger = db.ledger();

        let empty = ledger
            .post_invoice(&invoice(InvoiceType::Purchase, &[]), &actor())
            .await
            .unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::Validation);

        let repeated = ledger
            .post_invoice(&invoice(InvoiceType::Sale, &[("p1", 1), ("p1", 1)]), &actor())
            .await
            .unwrap_err();
        assert_eq!(repeated.kind(), ErrorKind::Validation);
        assert_eq!(quantity(&db, "p1").await, 10);
    }

    #[tokio::test]
    async fn test_recount_records_difference() {
        let db = setup(&[("p1", 30)]).await;

        let txn = db.ledger().recount("p1", 25, "count", &actor()).await.unwrap();

        assert_eq!(txn.kind, TransactionType::Recount);
        assert_eq!(txn.quantity_change, -5);
        assert_eq!(txn.invoice_number, "count");
        assert_eq!(quantity(&db, "p1").await, 25);
        assert_eq!(db.logs().list(None).await.unwrap()[0].action, LogAction::RecountStock);
    }

    #[tokio::test]
    async fn test_recount_rejects_bad_input() {
        let db = setup(&[("p1", 30)]).await;
        let ledger = db.ledger();

        assert_eq!(
            ledger.recount("p1", 5, "  ", &actor()).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ledger.recount("p1", -1, "count", &actor()).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ledger.recount("ghost", 1, "count", &actor()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_edit_moves_by_delta_only() {
        let db = setup(&[("p1", 0)]).await;
        let ledger = db.ledger();
        let posted = ledger
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 20)]), &actor())
            .await
            .unwrap();
        let other = ledger.adjust_stock("p1", 5, "found", &actor()).await.unwrap();

        let edited = ledger
            .edit_transaction(&posted[0].id, 12, "INV-1b", &actor())
            .await
            .unwrap();

        assert_eq!(edited.quantity_change, 12);
        assert_eq!(edited.invoice_number, "INV-1b");
        assert_eq!(quantity(&db, "p1").await, 17);

        let untouched = db.transactions().get(&other.id).await.unwrap().unwrap();
        assert_eq!(untouched.quantity_change, 5);
    }

    #[tokio::test]
    async fn test_edit_that_would_go_negative_is_rejected() {
        let db = setup(&[("p1", 0)]).await;
        let ledger = db.ledger();
        let posted = ledger
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 10)]), &actor())
            .await
            .unwrap();
        ledger
            .post_invoice(&invoice(InvoiceType::Sale, &[("p1", 8)]), &actor())
            .await
            .unwrap();

        let err = ledger
            .edit_transaction(&posted[0].id, 5, "INV-1", &actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, "p1").await, 2);
    }

    #[tokio::test]
    async fn test_delete_reverses_change() {
        let db = setup(&[("p1", 10)]).await;
        let ledger = db.ledger();
        let sale = ledger
            .post_invoice(&invoice(InvoiceType::Sale, &[("p1", 4)]), &actor())
            .await
            .unwrap();

        let removed = ledger.delete_transaction(&sale[0].id, &actor()).await.unwrap();

        assert_eq!(removed.quantity_change, -4);
        assert_eq!(quantity(&db, "p1").await, 10);
        assert!(db.transactions().get(&sale[0].id).await.unwrap().is_none());

        let err = ledger.delete_transaction(&sale[0].id, &actor()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_sold_purchase_is_rejected() {
        let db = setup(&[("p1", 0)]).await;
        let ledger = db.ledger();
        let purchase = ledger
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 10)]), &actor())
            .await
            .unwrap();
        ledger
            .post_invoice(&invoice(InvoiceType::Sale, &[("p1", 6)]), &actor())
            .await
            .unwrap();
        let logs_before = db.logs().count().await.unwrap();

        let err = ledger.delete_transaction(&purchase[0].id, &actor()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(quantity(&db, "p1").await, 4);
        assert!(db.transactions().get(&purchase[0].id).await.unwrap().is_some());
        assert_eq!(db.logs().count().await.unwrap(), logs_before);
    }

    #[tokio::test]
    async fn test_orphans_edit_and_delete_without_quantity() {
        let db = setup(&[("p1", 0)]).await;
        let ledger = db.ledger();
        let posted = ledger
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 10)]), &actor())
            .await
            .unwrap();
        db.products().delete("p1").await.unwrap();

        let edited = ledger
            .edit_transaction(&posted[0].id, 3, "INV-1", &actor())
            .await
            .unwrap();
        assert_eq!(edited.quantity_change, 3);

        ledger.delete_transaction(&posted[0].id, &actor()).await.unwrap();
        assert!(db.transactions().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_guard() {
        let db = setup(&[("p1", 2)]).await;
        let err = db
            .ledger()
            .adjust_stock("p1", -3, "breakage", &actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let txn = db.ledger().adjust_stock("p1", -2, "breakage", &actor()).await.unwrap();
        assert_eq!(txn.kind, TransactionType::Adjustment);
        assert_eq!(quantity(&db, "p1").await, 0);
    }

    #[tokio::test]
    async fn test_verify_detects_drift() {
        let db = setup(&[("p1", 5), ("p2", 0)]).await;
        db.ledger()
            .post_invoice(&invoice(InvoiceType::Purchase, &[("p1", 5), ("p2", 1)]), &actor())
            .await
            .unwrap();
        assert!(db.ledger().verify_all().await.unwrap().is_empty());

        sqlx::query("UPDATE products SET quantity = 99 WHERE id = 'p1'")
            .execute(db.pool())
            .await
            .unwrap();

        let drifts = db.ledger().verify_all().await.unwrap();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].product_id, "p1");
        assert_eq!(drifts[0].expected_quantity, 10);

        assert!(db.ledger().verify_product("p2").await.unwrap().is_none());
        assert!(db.ledger().verify_product("p1").await.unwrap().is_some());
    }
}
