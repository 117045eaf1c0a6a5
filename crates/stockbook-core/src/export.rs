//! # Export Rows
//!
//! Flattens products and transactions into rows with ids resolved to names,
//! ready for a spreadsheet writer. Formatting is left to the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Category, Product, Tag, Transaction, TransactionType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub quantity: i64,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub invoice_number: String,
    pub product_id: String,
    /// `None` when the product has been deleted.
    pub product_name: Option<String>,
    pub quantity_change: i64,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// Resolves tag and category ids to names. Unknown ids are dropped.
pub fn product_rows(products: &[Product], tags: &[Tag], categories: &[Category]) -> Vec<ProductRow> {
    let tag_names: HashMap<&str, &str> = tags.iter().map(|t| (t.id.as_str(), t.name.as_str())).collect();
    let category_names: HashMap<&str, &str> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let resolve = |ids: &std::collections::BTreeSet<String>, names: &HashMap<&str, &str>| {
        ids.iter()
            .filter_map(|id| names.get(id.as_str()).map(|n| n.to_string()))
            .collect::<Vec<_>>()
    };

    products
        .iter()
        .map(|p| ProductRow {
            id: p.id.clone(),
            name: p.name.clone(),
            quantity: p.quantity,
            tags: resolve(&p.tag_ids, &tag_names),
            categories: resolve(&p.category_ids, &category_names),
            last_updated: p.last_updated,
        })
        .collect()
}

pub fn transaction_rows(transactions: &[Transaction], products: &[Product]) -> Vec<TransactionRow> {
    let names: HashMap<&str, &str> = products.iter().map(|p| (p.id.as_str(), p.name.as_str())).collect();

    transactions
        .iter()
        .map(|t| TransactionRow {
            id: t.id.clone(),
            kind: t.kind,
            invoice_number: t.invoice_number.clone(),
            product_id: t.product_id.clone(),
            product_name: names.get(t.product_id.as_str()).map(|n| n.to_string()),
            quantity_change: t.quantity_change,
            timestamp: t.timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_resolve_names() {
        let mut p = Product::new("p1", "Bolts", 3, Utc::now());
        p.tag_ids.insert("t1".into());
        p.tag_ids.insert("gone".into());
        p.category_ids.insert("c1".into());

        let tags = vec![Tag { id: "t1".into(), name: "A1".into(), color: "x".into() }];
        let cats = vec![Category { id: "c1".into(), name: "Hardware".into() }];

        let rows = product_rows(&[p.clone()], &tags, &cats);
        assert_eq!(rows[0].tags, ["A1"]);
        assert_eq!(rows[0].categories, ["Hardware"]);

        let txns = vec![
            Transaction {
                id: "t".into(),
                kind: TransactionType::Sale,
                invoice_number: "S1".into(),
                product_id: "p1".into(),
                quantity_change: -1,
                timestamp: Utc::now(),
            },
            Transaction {
                id: "o".into(),
                kind: TransactionType::Purchase,
                invoice_number: "P1".into(),
                product_id: "deleted".into(),
                quantity_change: 4,
                timestamp: Utc::now(),
            },
        ];
        let rows = transaction_rows(&txns, &[p]);
        assert_eq!(rows[0].product_name.as_deref(), Some("Bolts"));
        assert_eq!(rows[1].product_name, None);
    }
}
