//! # Reports
//!
//! Read-only views for the dashboard, lists, cardex and exports. Every view
//! that takes a `&User` is passed through that user's access filter.
//!
//! ## Data Flow
//! ```text
//! ┌──────────────┐   fetch_all    ┌──────────────┐   AccessFilter   ┌────────────┐
//! │   SQLite     │ ─────────────► │ Vec<Product> │ ───────────────► │ visible    │
//! │ (one conn)   │   tags, cats   │ Vec<Tag> ... │   for_user(u)    │ products   │
//! └──────────────┘                └──────────────┘                  └─────┬──────┘
//!                                                                         │
//!                          DashboardStats / with_level / search / rows ◄──┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{category, product, tag, transaction};
use stockbook_core::export::{product_rows, transaction_rows, ProductRow, TransactionRow};
use stockbook_core::stats::{search, with_level};
use stockbook_core::validation::validate_search_query;
use stockbook_core::{
    AccessFilter, Cardex, Category, CoreError, DashboardStats, Product, StockLevel, Tag,
    Transaction, User,
};

/// Products with the tags and categories needed to filter and label them.
struct CatalogView {
    products: Vec<Product>,
    tags: Vec<Tag>,
    categories: Vec<Category>,
}

async fn load_catalog(conn: &mut SqliteConnection) -> DbResult<CatalogView> {
    Ok(CatalogView {
        products: product::fetch_all(conn).await?,
        tags: tag::fetch_all(conn).await?,
        categories: category::fetch_all(conn).await?,
    })
}

/// Read-only queries.
#[derive(Debug, Clone)]
pub struct Reports {
    pool: SqlitePool,
    low_stock_threshold: i64,
}

impl Reports {
    pub fn new(pool: SqlitePool, low_stock_threshold: i64) -> Self {
        Reports {
            pool,
            low_stock_threshold,
        }
    }

    async fn visible_catalog(&self, user: &User) -> DbResult<CatalogView> {
        let mut conn = self.pool.acquire().await?;
        let mut catalog = load_catalog(&mut conn).await?;

        let filter = AccessFilter::for_user(user);
        catalog.products = filter.visible_products(catalog.products, &catalog.tags);
        debug!(
            user = %user.username,
            visible = catalog.products.len(),
            restricted = filter.is_restricted(),
            "Loaded visible catalog"
        );

        Ok(catalog)
    }

    // =========================================================================
    // Dashboard & Lists
    // =========================================================================

    pub async fn dashboard(&self, user: &User) -> DbResult<DashboardStats> {
        let catalog = self.visible_catalog(user).await?;
        Ok(DashboardStats::compute(&catalog.products, self.low_stock_threshold))
    }

    /// Products the user may see, ordered by name.
    pub async fn products(&self, user: &User) -> DbResult<Vec<Product>> {
        let catalog = self.visible_catalog(user).await?;
        Ok(catalog.products)
    }

    /// `0 < quantity < threshold`
    pub async fn low_stock(&self, user: &User) -> DbResult<Vec<Product>> {
        let catalog = self.visible_catalog(user).await?;
        Ok(with_level(catalog.products, self.low_stock_threshold, StockLevel::Low))
    }

    /// `quantity == 0`
    pub async fn finished(&self, user: &User) -> DbResult<Vec<Product>> {
        let catalog = self.visible_catalog(user).await?;
        Ok(with_level(
            catalog.products,
            self.low_stock_threshold,
            StockLevel::Finished,
        ))
    }

    /// Case-insensitive match on product, tag and category names.
    pub async fn search(&self, user: &User, query: &str) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;
        let catalog = self.visible_catalog(user).await?;
        Ok(search(
            catalog.products,
            &query,
            &catalog.tags,
            &catalog.categories,
        ))
    }

    /// Transactions the user may see, newest first.
    pub async fn transactions(&self, user: &User) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        let catalog = load_catalog(&mut conn).await?;
        let mut all = transaction::fetch_all(&mut conn).await?;
        transaction::sort_chronological(&mut all);
        all.reverse();

        let filter = AccessFilter::for_user(user);
        Ok(filter.visible_transactions(all, &catalog.products, &catalog.tags))
    }

    pub async fn tags(&self, user: &User) -> DbResult<Vec<Tag>> {
        let mut conn = self.pool.acquire().await?;
        let tags = tag::fetch_all(&mut conn).await?;
        Ok(AccessFilter::for_user(user).visible_tags(tags))
    }

    pub async fn categories(&self, user: &User) -> DbResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        let categories = category::fetch_all(&mut conn).await?;
        Ok(AccessFilter::for_user(user).visible_categories(categories))
    }

    // =========================================================================
    // Cardex
    // =========================================================================

    /// Running-balance history of one product, newest entry first.
    ///
    /// ## Errors
    /// * `Core(ProductNotFound)` - unknown product, or one hidden from `user`
    pub async fn cardex(&self, user: &User, product_id: &str) -> DbResult<Cardex> {
        let catalog = self.visible_catalog(user).await?;
        let target = catalog
            .products
            .iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let mut conn = self.pool.acquire().await?;
        let history = transaction::fetch_for_product(&mut conn, product_id).await?;

        Ok(Cardex::build(target, history))
    }

    // =========================================================================
    // Exports
    // =========================================================================

    pub async fn export_products(&self, user: &User) -> DbResult<Vec<ProductRow>> {
        let catalog = self.visible_catalog(user).await?;
        Ok(product_rows(
            &catalog.products,
            &catalog.tags,
            &catalog.categories,
        ))
    }

    /// Same rows as [`Reports::export_products`], low-stock products only.
    pub async fn export_low_stock(&self, user: &User) -> DbResult<Vec<ProductRow>> {
        let catalog = self.visible_catalog(user).await?;
        let low = with_level(catalog.products, self.low_stock_threshold, StockLevel::Low);
        Ok(product_rows(&low, &catalog.tags, &catalog.categories))
    }

    /// Transaction rows with product names; orphans carry `None`.
    pub async fn export_transactions(&self, user: &User) -> DbResult<Vec<TransactionRow>> {
        let mut conn = self.pool.acquire().await?;
        let catalog = load_catalog(&mut conn).await?;
        let mut all = transaction::fetch_all(&mut conn).await?;
        transaction::sort_chronological(&mut all);
        all.reverse();

        let visible = AccessFilter::for_user(user).visible_transactions(
            all,
            &catalog.products,
            &catalog.tags,
        );
        Ok(transaction_rows(&visible, &catalog.products))
    }

    /// Transactions whose product no longer exists, oldest first.
    pub async fn orphaned_transactions(&self) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        let mut orphans = transaction::fetch_orphaned(&mut conn).await?;
        transaction::sort_chronological(&mut orphans);
        Ok(orphans)
    }
}
