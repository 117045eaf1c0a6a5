//! # Transaction Repository
//!
//! Raw storage for stock movements. Quantity bookkeeping lives in
//! [`crate::ledger`]; nothing here touches `products.quantity`.
//!
//! ## Ordering
//! Timestamps are stored as RFC 3339 text whose fractional part varies in
//! width, so SQL `ORDER BY timestamp` is not reliable. Rows are read in
//! insertion (`rowid`) order and sorted on the decoded `DateTime` in Rust
//! with a stable sort.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockbook_core::{Transaction, TransactionType};

#[derive(Debug, sqlx::FromRow)]
struct TransactionRecord {
    id: String,
    kind: TransactionType,
    invoice_number: String,
    product_id: String,
    quantity_change: i64,
    timestamp: DateTime<Utc>,
}

impl From<TransactionRecord> for Transaction {
    fn from(r: TransactionRecord) -> Self {
        Transaction {
            id: r.id,
            kind: r.kind,
            invoice_number: r.invoice_number,
            product_id: r.product_id,
            quantity_change: r.quantity_change,
            timestamp: r.timestamp,
        }
    }
}

const COLUMNS: &str = "id, kind, invoice_number, product_id, quantity_change, timestamp";

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Transaction>> {
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE id = ?1");
    let record: Option<TransactionRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record.map(Transaction::from))
}

/// All transactions in insertion order.
pub(crate) async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Transaction>> {
    let sql = format!("SELECT {COLUMNS} FROM transactions ORDER BY rowid");
    let records: Vec<TransactionRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    Ok(records.into_iter().map(Transaction::from).collect())
}

/// One product's transactions in insertion order.
pub(crate) async fn fetch_for_product(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<Transaction>> {
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE product_id = ?1 ORDER BY rowid");
    let records: Vec<TransactionRecord> = sqlx::query_as(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(records.into_iter().map(Transaction::from).collect())
}

/// Transactions whose product no longer exists, in insertion order.
pub(crate) async fn fetch_orphaned(conn: &mut SqliteConnection) -> DbResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM transactions \
         WHERE product_id NOT IN (SELECT id FROM products) ORDER BY rowid"
    );
    let records: Vec<TransactionRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    Ok(records.into_iter().map(Transaction::from).collect())
}

/// `Σ quantity_change` for one product (0 if it has no history).
pub(crate) async fn sum_for_product(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity_change), 0) FROM transactions WHERE product_id = ?1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sum)
}

/// `Σ quantity_change` per product id, orphans included.
pub(crate) async fn sums_by_product(conn: &mut SqliteConnection) -> DbResult<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT product_id, SUM(quantity_change) FROM transactions GROUP BY product_id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

pub(crate) async fn insert(conn: &mut SqliteConnection, txn: &Transaction) -> DbResult<()> {
    debug!(
        id = %txn.id,
        kind = %txn.kind,
        product_id = %txn.product_id,
        change = txn.quantity_change,
        "Inserting transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO transactions (id, kind, invoice_number, product_id, quantity_change, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&txn.id)
    .bind(txn.kind)
    .bind(&txn.invoice_number)
    .bind(&txn.product_id)
    .bind(txn.quantity_change)
    .bind(txn.timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts or replaces a full transaction row.
pub(crate) async fn upsert(conn: &mut SqliteConnection, txn: &Transaction) -> DbResult<()> {
    debug!(id = %txn.id, "Upserting transaction");

    sqlx::query(
        r#"
        INSERT INTO transactions (id, kind, invoice_number, product_id, quantity_change, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (id) DO UPDATE SET
            kind = excluded.kind,
            invoice_number = excluded.invoice_number,
            product_id = excluded.product_id,
            quantity_change = excluded.quantity_change,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(&txn.id)
    .bind(txn.kind)
    .bind(&txn.invoice_number)
    .bind(&txn.product_id)
    .bind(txn.quantity_change)
    .bind(txn.timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rewrites the mutable fields of a transaction.
pub(crate) async fn update_change(
    conn: &mut SqliteConnection,
    id: &str,
    quantity_change: i64,
    invoice_number: &str,
    timestamp: DateTime<Utc>,
) -> DbResult<()> {
    debug!(id = %id, quantity_change, "Updating transaction");

    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET quantity_change = ?2, invoice_number = ?3, timestamp = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(quantity_change)
    .bind(invoice_number)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Transaction", id));
    }

    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting transaction");

    let result = sqlx::query("DELETE FROM transactions WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Transaction", id));
    }

    Ok(())
}

pub(crate) async fn delete_all(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("DELETE FROM transactions").execute(&mut *conn).await?;
    Ok(())
}

/// Sorts oldest-first by timestamp; ties keep their input order.
pub(crate) fn sort_chronological(txns: &mut [Transaction]) {
    txns.sort_by_key(|t| t.timestamp);
}

/// Repository for raw transaction rows.
///
/// Writing through [`TransactionRepository::upsert`] or
/// [`TransactionRepository::delete`] does not move product quantities; use
/// the [`Ledger`](crate::ledger::Ledger) for stock-changing operations.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists all transactions, newest first.
    pub async fn list(&self) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        let mut txns = fetch_all(&mut conn).await?;
        sort_chronological(&mut txns);
        txns.reverse();
        Ok(txns)
    }

    /// One product's transactions, oldest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        let mut txns = fetch_for_product(&mut conn, product_id).await?;
        sort_chronological(&mut txns);
        Ok(txns)
    }

    pub async fn upsert(&self, txn: &Transaction) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, txn).await
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete(&mut conn, id).await
    }
}
