//! # Dashboard Statistics
//!
//! Aggregates over an (already access-filtered) product set.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Category, Product, StockLevel, Tag};

/// Headline numbers shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub product_count: usize,
    pub total_quantity: i64,
    /// `0 < quantity < threshold`
    pub low_stock_count: usize,
    /// `quantity == 0`
    pub finished_count: usize,
}

impl DashboardStats {
    pub fn compute(products: &[Product], threshold: i64) -> Self {
        products
            .iter()
            .fold(DashboardStats::default(), |mut stats, p| {
                stats.product_count += 1;
                stats.total_quantity += p.quantity;
                match p.stock_level(threshold) {
                    StockLevel::Low => stats.low_stock_count += 1,
                    StockLevel::Finished => stats.finished_count += 1,
                    StockLevel::Healthy => {}
                }
                stats
            })
    }
}

/// Products matching one stock level, order preserved.
pub fn with_level(products: Vec<Product>, threshold: i64, level: StockLevel) -> Vec<Product> {
    products
        .into_iter()
        .filter(|p| p.stock_level(threshold) == level)
        .collect()
}

/// Case-insensitive substring search over product name, tag names and
/// category names. An empty query matches every product.
pub fn search(
    products: Vec<Product>,
    query: &str,
    tags: &[Tag],
    categories: &[Category],
) -> Vec<Product> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return products;
    }

    let hit = |name: &str| name.to_lowercase().contains(&needle);

    products
        .into_iter()
        .filter(|p| {
            hit(&p.name)
                || tags
                    .iter()
                    .any(|t| p.tag_ids.contains(&t.id) && hit(&t.name))
                || categories
                    .iter()
                    .any(|c| p.category_ids.contains(&c.id) && hit(&c.name))
        })
        .collect()
}
