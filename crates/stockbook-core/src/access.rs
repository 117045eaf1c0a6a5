//! # Access Filter
//!
//! Derives what a user may see from their allowed categories and allowed
//! tag prefixes.
//!
//! ## Visibility Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  categories = ∅ AND prefixes = ∅  →  everything visible                │
//! │                                                                         │
//! │  otherwise a product is visible iff                                    │
//! │      (categories = ∅ OR product ∩ categories ≠ ∅)                      │
//! │  AND (prefixes   = ∅ OR some product tag name starts with a prefix)    │
//! │                                     (case-insensitive)                 │
//! │                                                                         │
//! │  transaction → visible iff its product is visible                      │
//! │                orphans: unrestricted only                              │
//! │  tag         → prefix axis only                                        │
//! │  category    → category axis only                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{Category, Product, Tag, Transaction, User};

/// Visibility predicate for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFilter {
    categories: BTreeSet<String>,
    /// Stored lowercased.
    prefixes: Vec<String>,
}

impl AccessFilter {
    /// Filter that hides nothing.
    pub fn unrestricted() -> Self {
        AccessFilter::default()
    }

    pub fn for_user(user: &User) -> Self {
        AccessFilter::new(
            user.allowed_category_ids.iter().cloned(),
            user.allowed_tag_prefixes.iter().map(String::as_str),
        )
    }

    pub fn new<'a>(
        categories: impl IntoIterator<Item = String>,
        prefixes: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        AccessFilter {
            categories: categories.into_iter().collect(),
            prefixes: prefixes.into_iter().map(str::to_lowercase).collect(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        !self.categories.is_empty() || !self.prefixes.is_empty()
    }

    /// Prefix axis check for a single tag name.
    pub fn tag_name_allowed(&self, name: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Decides whether `product` is visible.
    ///
    /// ## Arguments
    /// * `product` - The product to check
    /// * `tags` - Tag lookup by id; tag ids missing from it never match
    pub fn product_visible(&self, product: &Product, tags: &HashMap<&str, &Tag>) -> bool {
        if !self.is_restricted() {
            return true;
        }

        let category_ok = self.categories.is_empty()
            || product
                .category_ids
                .iter()
                .any(|c| self.categories.contains(c));

        let prefix_ok = self.prefixes.is_empty()
            || product
                .tag_ids
                .iter()
                .filter_map(|id| tags.get(id.as_str()))
                .any(|tag| self.tag_name_allowed(&tag.name));

        category_ok && prefix_ok
    }

    pub fn visible_products(&self, products: Vec<Product>, tags: &[Tag]) -> Vec<Product> {
        if !self.is_restricted() {
            return products;
        }
        let index = index_tags(tags);
        products
            .into_iter()
            .filter(|p| self.product_visible(p, &index))
            .collect()
    }

    /// Filters transactions by the visibility of their products.
    ///
    /// Orphaned transactions (product deleted) stay visible only to
    /// unrestricted users.
    pub fn visible_transactions(
        &self,
        transactions: Vec<Transaction>,
        products: &[Product],
        tags: &[Tag],
    ) -> Vec<Transaction> {
        if !self.is_restricted() {
            return transactions;
        }
        let index = index_tags(tags);
        let visible: HashSet<&str> = products
            .iter()
            .filter(|p| self.product_visible(p, &index))
            .map(|p| p.id.as_str())
            .collect();

        transactions
            .into_iter()
            .filter(|t| visible.contains(t.product_id.as_str()))
            .collect()
    }

    pub fn visible_tags(&self, tags: Vec<Tag>) -> Vec<Tag> {
        tags.into_iter()
            .filter(|t| self.tag_name_allowed(&t.name))
            .collect()
    }

    pub fn visible_categories(&self, categories: Vec<Category>) -> Vec<Category> {
        if self.categories.is_empty() {
            return categories;
        }
        categories
            .into_iter()
            .filter(|c| self.categories.contains(&c.id))
            .collect()
    }
}

/// Builds an id → tag lookup for [`AccessFilter::product_visible`].
pub fn index_tags(tags: &[Tag]) -> HashMap<&str, &Tag> {
    tags.iter().map(|t| (t.id.as_str(), t)).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use chrono::Utc;

    fn product(id: &str, categories: &[&str], tags: &[&str]) -> Product {
        let mut p = Product::new(id, id, 10, Utc::now());
        p.category_ids = categories.iter().map(|s| s.to_string()).collect();
        p.tag_ids = tags.iter().map(|s| s.to_string()).collect();
        p
    }

    fn tag(id: &str, name: &str) -> Tag {
        Tag {
            id: id.to_string(),
            name: name.to_string(),
            color: "hsl(0, 70%, 80%)".to_string(),
        }
    }

    fn txn(id: &str, product_id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            kind: TransactionType::Purchase,
            invoice_number: "INV".to_string(),
            product_id: product_id.to_string(),
            quantity_change: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_unrestricted_sees_everything() {
        let filter = AccessFilter::unrestricted();
        let products = vec![product("a", &[], &[]), product("b", &["C2"], &[])];
        assert_eq!(filter.visible_products(products, &[]).len(), 2);
    }

    #[test]
    fn test_category_restriction() {
        let filter = AccessFilter::new(["C1".to_string()], []);
        let products = vec![
            product("both", &["C1", "C2"], &[]),
            product("other", &["C2"], &[]),
        ];
        let tags = vec![tag("t1", "A-shelf"), tag("t2", "B-shelf")];

        let visible = filter.visible_products(products, &tags);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "both");

        // Category-only restriction leaves tags alone
        assert_eq!(filter.visible_tags(tags).len(), 2);
    }

    #[test]
    fn test_prefix_restriction_is_case_insensitive() {
        let filter = AccessFilter::new([], ["a"]);
        let tags = vec![tag("t1", "A-shelf"), tag("t2", "B-shelf")];
        let products = vec![
            product("p1", &["C1"], &["t1"]),
            product("p2", &["C1"], &["t2"]),
            product("p3", &["C1"], &[]),
        ];

        let visible = filter.visible_products(products, &tags);
        assert_eq!(visible.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["p1"]);

        let tags = filter.visible_tags(tags);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "A-shelf");
    }

    #[test]
    fn test_axes_are_anded() {
        let filter = AccessFilter::new(["C1".to_string()], ["B"]);
        let tags = vec![tag("t1", "A1"), tag("t2", "B1")];
        let index = index_tags(&tags);

        assert!(filter.product_visible(&product("x", &["C1"], &["t2"]), &index));
        assert!(!filter.product_visible(&product("x", &["C1"], &["t1"]), &index));
        assert!(!filter.product_visible(&product("x", &["C2"], &["t2"]), &index));
    }

    #[test]
    fn test_orphaned_transactions() {
        let products = vec![product("p1", &["C1"], &[])];
        let txns = vec![txn("t1", "p1"), txn("t2", "deleted")];

        let restricted = AccessFilter::new(["C1".to_string()], []);
        let seen = restricted.visible_transactions(txns.clone(), &products, &[]);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "t1");

        let open = AccessFilter::unrestricted();
        assert_eq!(open.visible_transactions(txns, &products, &[]).len(), 2);
    }

    #[test]
    fn test_visible_categories() {
        let cats = vec![
            Category { id: "C1".into(), name: "Hardware".into() },
            Category { id: "C2".into(), name: "Paint".into() },
        ];
        let filter = AccessFilter::new(["C2".to_string()], []);
        let seen = filter.visible_categories(cats.clone());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "Paint");

        assert_eq!(AccessFilter::unrestricted().visible_categories(cats).len(), 2);
    }
}
