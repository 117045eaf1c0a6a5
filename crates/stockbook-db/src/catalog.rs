//! # Catalog
//!
//! Product, tag and category maintenance. Each operation validates its
//! input, writes inside one transaction and appends its audit row there.
//!
//! Stock quantities are not touched here after creation; see
//! [`crate::ledger`].

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::error::{DbError, DbResult};
use crate::repository::{category, new_id, product, tag, user};
use stockbook_core::validation::{
    validate_category_name, validate_product_name, validate_stock_quantity, validate_tag_name,
};
use stockbook_core::{Actor, Category, CoreError, LogAction, Product, Tag, ValidationError};

/// Input for [`Catalog::create_product`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub initial_quantity: i64,
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
    pub category_ids: BTreeSet<String>,
}

/// Input for [`Catalog::update_product`]. Quantity is not editable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: String,
    #[serde(default)]
    pub tag_ids: BTreeSet<String>,
    pub category_ids: BTreeSet<String>,
}

/// Colour derived from the tag id, so it is stable for the tag's lifetime.
pub fn tag_color(id: &Uuid) -> String {
    let bytes = id.as_bytes();
    let hue = u16::from_be_bytes([bytes[0], bytes[1]]) % 360;
    format!("hsl({}, 70%, 55%)", hue)
}

fn require_category(category_ids: &BTreeSet<String>) -> Result<(), ValidationError> {
    if category_ids.is_empty() {
        return Err(ValidationError::Required {
            field: "categories".to_string(),
        });
    }
    Ok(())
}

/// Catalog operations.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Catalog { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product stocked at `initial_quantity`.
    ///
    /// ## Errors
    /// * `Core(Validation)` - bad name, negative stock, no category
    /// * `UniqueViolation` - name already used (any case)
    /// * `ForeignKeyViolation` - unknown tag or category id
    pub async fn create_product(&self, input: NewProduct, actor: &Actor) -> DbResult<Product> {
        let name = validate_product_name(&input.name)?;
        validate_stock_quantity("initial quantity", input.initial_quantity)?;
        require_category(&input.category_ids)?;

        let mut created = Product::new(new_id(), name, input.initial_quantity, Utc::now());
        created.tag_ids = input.tag_ids;
        created.category_ids = input.category_ids;

        let mut tx = self.pool.begin().await?;
        product::upsert(&mut tx, &created).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::CreateProduct,
            format!(
                "Created product '{}' with quantity {}",
                created.name, created.quantity
            ),
        )
        .await?;
        tx.commit().await?;

        info!(product_id = %created.id, name = %created.name, "Product created");
        Ok(created)
    }

    /// Renames a product and replaces its tags and categories.
    pub async fn update_product(
        &self,
        product_id: &str,
        update: ProductUpdate,
        actor: &Actor,
    ) -> DbResult<Product> {
        let name = validate_product_name(&update.name)?;
        require_category(&update.category_ids)?;

        let mut tx = self.pool.begin().await?;

        let existing = product::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let updated = Product {
            name,
            tag_ids: update.tag_ids,
            category_ids: update.category_ids,
            last_updated: Utc::now(),
            ..existing.clone()
        };
        product::upsert(&mut tx, &updated).await?;

        let details = if existing.name == updated.name {
            format!("Updated product '{}'", updated.name)
        } else {
            format!("Updated product '{}' (was '{}')", updated.name, existing.name)
        };
        audit::record(&mut tx, actor, LogAction::UpdateProduct, details).await?;
        tx.commit().await?;

        info!(product_id = %updated.id, "Product updated");
        Ok(updated)
    }

    /// Deletes a product. Its transactions stay in the ledger as orphans.
    pub async fn delete_product(&self, product_id: &str, actor: &Actor) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;

        let existing = product::fetch(&mut tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        product::delete(&mut tx, product_id).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::DeleteProduct,
            format!(
                "Deleted product '{}' (quantity {})",
                existing.name, existing.quantity
            ),
        )
        .await?;
        tx.commit().await?;

        info!(product_id = %existing.id, "Product deleted");
        Ok(existing)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub async fn create_tag(&self, name: &str, actor: &Actor) -> DbResult<Tag> {
        let name = validate_tag_name(name)?;
        let uuid = Uuid::new_v4();
        let created = Tag {
            id: uuid.to_string(),
            name,
            color: tag_color(&uuid),
        };

        let mut tx = self.pool.begin().await?;
        tag::upsert(&mut tx, &created).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::CreateTag,
            format!("Created tag '{}'", created.name),
        )
        .await?;
        tx.commit().await?;

        info!(tag_id = %created.id, name = %created.name, "Tag created");
        Ok(created)
    }

    /// Renames a tag. Prefix-restricted users may gain or lose visibility
    /// of the products carrying it.
    pub async fn rename_tag(&self, tag_id: &str, name: &str, actor: &Actor) -> DbResult<Tag> {
        let name = validate_tag_name(name)?;

        let mut tx = self.pool.begin().await?;
        let existing = tag::fetch(&mut tx, tag_id)
            .await?
            .ok_or_else(|| DbError::not_found("Tag", tag_id))?;
        let renamed = Tag {
            name,
            ..existing.clone()
        };
        tag::upsert(&mut tx, &renamed).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::UpdateTag,
            format!("Renamed tag '{}' to '{}'", existing.name, renamed.name),
        )
        .await?;
        tx.commit().await?;

        info!(tag_id = %renamed.id, "Tag renamed");
        Ok(renamed)
    }

    /// Deletes a tag and detaches it from every product.
    pub async fn delete_tag(&self, tag_id: &str, actor: &Actor) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let existing = tag::fetch(&mut tx, tag_id)
            .await?
            .ok_or_else(|| DbError::not_found("Tag", tag_id))?;
        tag::delete(&mut tx, tag_id).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::DeleteTag,
            format!("Deleted tag '{}'", existing.name),
        )
        .await?;
        tx.commit().await?;

        info!(tag_id = %tag_id, "Tag deleted");
        Ok(())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str, actor: &Actor) -> DbResult<Category> {
        let name = validate_category_name(name)?;
        let created = Category { id: new_id(), name };

        let mut tx = self.pool.begin().await?;
        category::upsert(&mut tx, &created).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::CreateCategory,
            format!("Created category '{}'", created.name),
        )
        .await?;
        tx.commit().await?;

        info!(category_id = %created.id, name = %created.name, "Category created");
        Ok(created)
    }

    pub async fn rename_category(
        &self,
        category_id: &str,
        name: &str,
        actor: &Actor,
    ) -> DbResult<Category> {
        let name = validate_category_name(name)?;

        let mut tx = self.pool.begin().await?;
        let existing = category::fetch(&mut tx, category_id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", category_id))?;
        let renamed = Category {
            name,
            ..existing.clone()
        };
        category::upsert(&mut tx, &renamed).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::UpdateCategory,
            format!("Renamed category '{}' to '{}'", existing.name, renamed.name),
        )
        .await?;
        tx.commit().await?;

        info!(category_id = %renamed.id, "Category renamed");
        Ok(renamed)
    }

    /// Deletes a category. Products referencing it lose the link.
    ///
    /// ## Errors
    /// * `InUse` - a user's allowed categories include it; dropping the
    ///   link could leave that user with no category restriction at all
    pub async fn delete_category(&self, category_id: &str, actor: &Actor) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let existing = category::fetch(&mut tx, category_id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", category_id))?;

        let restricted = user::restricted_to_category(&mut tx, category_id).await?;
        if !restricted.is_empty() {
            warn!(category_id = %category_id, users = ?restricted, "Category delete rejected");
            return Err(ValidationError::InUse {
                field: "category".into(),
                value: existing.name,
                used_by: restricted,
            }
            .into());
        }

        category::delete(&mut tx, category_id).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::DeleteCategory,
            format!("Deleted category '{}'", existing.name),
        )
        .await?;
        tx.commit().await?;

        info!(category_id = %category_id, "Category deleted");
        Ok(())
    }
}
