//! # Domain Types
//!
//! Core domain types used throughout Stockbook.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   Transaction   │   │      User       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name (ci uniq) │◄──│  product_id     │   │  username       │       │
//! │  │  quantity       │   │  kind           │   │  permissions    │       │
//! │  │  tag_ids        │   │  quantity_change│   │  allowed_*      │       │
//! │  │  category_ids   │   │  invoice_number │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Tag / Category │   │ TransactionType │   │    LogEntry     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, name       │   │  Purchase  (+)  │   │  actor          │       │
//! │  │  color (tags)   │   │  Sale      (-)  │   │  action         │       │
//! │  └─────────────────┘   │  Adjustment(±)  │   │  details        │       │
//! │                        │  Recount   (±)  │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ledger Invariant
//! For every product:
//! `quantity == initial_quantity + Σ quantity_change` over its transactions.
//!
//! Transactions reference products by id only. Deleting a product leaves its
//! transactions in place ("orphaned").

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Product
// =============================================================================

/// A stocked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, unique case-insensitively.
    pub name: String,

    /// Current stock on hand. Never negative.
    pub quantity: i64,

    /// Stock recorded when the product was created.
    ///
    /// Together with the transaction history this reproduces `quantity`.
    pub initial_quantity: i64,

    /// Tags attached to this product.
    pub tag_ids: BTreeSet<String>,

    /// Categories this product belongs to.
    pub category_ids: BTreeSet<String>,

    /// When quantity or metadata last changed.
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl Product {
    /// Creates a product with `quantity == initial_quantity`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        initial_quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            quantity: initial_quantity,
            initial_quantity,
            tag_ids: BTreeSet::new(),
            category_ids: BTreeSet::new(),
            last_updated: now,
        }
    }

    /// Classifies current stock against a low-stock threshold.
    pub fn stock_level(&self, threshold: i64) -> StockLevel {
        StockLevel::classify(self.quantity, threshold)
    }
}

/// Stock classification used by the dashboard and the low-stock export.
///
/// `Finished` and `Low` are mutually exclusive: a product at zero is
/// finished, never low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    /// Quantity is exactly zero.
    Finished,
    /// `0 < quantity < threshold`.
    Low,
    /// `quantity >= threshold`.
    Healthy,
}

impl StockLevel {
    pub fn classify(quantity: i64, threshold: i64) -> Self {
        if quantity <= 0 {
            StockLevel::Finished
        } else if quantity < threshold {
            StockLevel::Low
        } else {
            StockLevel::Healthy
        }
    }
}

// =============================================================================
// Tag & Category
// =============================================================================

/// A coloured label. Tag names drive the prefix axis of the access filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tag {
    pub id: String,
    pub name: String,
    /// CSS colour string, e.g. `hsl(210, 70%, 55%)`.
    pub color: String,
}

/// A product grouping. Drives the category axis of the access filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Transaction Type
// =============================================================================

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Stock received from an invoice. Positive change.
    Purchase,
    /// Stock sold on an invoice. Negative change.
    Sale,
    /// Manual incremental correction.
    Adjustment,
    /// Physical count; change is `counted - previous`.
    Recount,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Sale => "sale",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Recount => "recount",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One recorded stock movement.
///
/// `kind` and `product_id` never change after insert. Only an edit may
/// change `quantity_change` and `invoice_number` (and it refreshes
/// `timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: TransactionType,

    /// Invoice reference, or the notes of a recount / adjustment.
    pub invoice_number: String,

    /// Product this movement applies to. May no longer exist.
    pub product_id: String,

    /// Signed stock delta.
    pub quantity_change: i64,

    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Invoice
// =============================================================================

/// The two transaction kinds an invoice can post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    Purchase,
    Sale,
}

impl InvoiceType {
    /// Transaction kind written for each line.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            InvoiceType::Purchase => TransactionType::Purchase,
            InvoiceType::Sale => TransactionType::Sale,
        }
    }

    /// Signed change for a positive line quantity.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            InvoiceType::Purchase => quantity,
            InvoiceType::Sale => -quantity,
        }
    }

    /// Audit action recorded when an invoice of this type is posted.
    pub fn log_action(&self) -> LogAction {
        match self {
            InvoiceType::Purchase => LogAction::CreateInvoicePurchase,
            InvoiceType::Sale => LogAction::CreateInvoiceSale,
        }
    }
}

impl TryFrom<TransactionType> for InvoiceType {
    type Error = CoreError;

    fn try_from(kind: TransactionType) -> Result<Self, Self::Error> {
        match kind {
            TransactionType::Purchase => Ok(InvoiceType::Purchase),
            TransactionType::Sale => Ok(InvoiceType::Sale),
            other => Err(crate::error::ValidationError::NotAllowed {
                field: format!("invoice type '{}'", other),
                allowed: vec!["purchase".to_string(), "sale".to_string()],
            }
            .into()),
        }
    }
}

/// One line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub product_id: String,
    /// Strictly positive; the sign comes from the invoice type.
    pub quantity: i64,
}

/// A multi-line purchase or sale posted atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(rename = "type")]
    pub kind: InvoiceType,
    pub invoice_number: String,
    pub lines: Vec<InvoiceLine>,
}

// =============================================================================
// Permissions
// =============================================================================

/// Closed set of capabilities a user may hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    CanManageUsers,
    CanAddProducts,
    CanEditProducts,
    CanDeleteProducts,
    CanPerformTransactions,
    CanEditTransactions,
    CanDeleteTransactions,
    CanExportData,
    CanBackupRestore,
    CanViewLogs,
    CanRecountStock,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 11] = [
        Permission::CanManageUsers,
        Permission::CanAddProducts,
        Permission::CanEditProducts,
        Permission::CanDeleteProducts,
        Permission::CanPerformTransactions,
        Permission::CanEditTransactions,
        Permission::CanDeleteTransactions,
        Permission::CanExportData,
        Permission::CanBackupRestore,
        Permission::CanViewLogs,
        Permission::CanRecountStock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CanManageUsers => "CAN_MANAGE_USERS",
            Permission::CanAddProducts => "CAN_ADD_PRODUCTS",
            Permission::CanEditProducts => "CAN_EDIT_PRODUCTS",
            Permission::CanDeleteProducts => "CAN_DELETE_PRODUCTS",
            Permission::CanPerformTransactions => "CAN_PERFORM_TRANSACTIONS",
            Permission::CanEditTransactions => "CAN_EDIT_TRANSACTIONS",
            Permission::CanDeleteTransactions => "CAN_DELETE_TRANSACTIONS",
            Permission::CanExportData => "CAN_EXPORT_DATA",
            Permission::CanBackupRestore => "CAN_BACKUP_RESTORE",
            Permission::CanViewLogs => "CAN_VIEW_LOGS",
            Permission::CanRecountStock => "CAN_RECOUNT_STOCK",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        Permission::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// User
// =============================================================================

/// An account that can operate on the store.
///
/// Empty `allowed_category_ids` / `allowed_tag_prefixes` mean the user is
/// unrestricted on that axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,

    /// Argon2 PHC string. Never leaves the store.
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: String,

    pub permissions: BTreeSet<Permission>,
    pub allowed_category_ids: BTreeSet<String>,
    pub allowed_tag_prefixes: BTreeSet<String>,

    /// Data URL or path of the avatar.
    pub profile_picture: Option<String>,
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Fails with `AuthorizationDenied` unless the user holds `permission`.
    ///
    /// ## Example
    /// ```rust
    /// use stockbook_core::{Permission, User};
    ///
    /// let clerk = User {
    ///     id: "u1".into(),
    ///     username: "clerk".into(),
    ///     password_hash: String::new(),
    ///     permissions: [Permission::CanPerformTransactions].into(),
    ///     allowed_category_ids: Default::default(),
    ///     allowed_tag_prefixes: Default::default(),
    ///     profile_picture: None,
    /// };
    /// assert!(clerk.require(Permission::CanPerformTransactions).is_ok());
    /// assert!(clerk.require(Permission::CanManageUsers).is_err());
    /// ```
    pub fn require(&self, permission: Permission) -> CoreResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(CoreError::AuthorizationDenied { permission })
        }
    }

    /// True when either access axis is non-empty.
    pub fn is_restricted(&self) -> bool {
        !self.allowed_category_ids.is_empty() || !self.allowed_tag_prefixes.is_empty()
    }

    /// Identity recorded in audit rows for actions by this user.
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            username: username.into(),
        }
    }

    /// Attribution for maintenance work done without a logged-in user.
    pub fn system() -> Self {
        Actor::new("system", "system")
    }
}

// =============================================================================
// Audit Log
// =============================================================================

/// Mutating actions that leave an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateInvoicePurchase,
    CreateInvoiceSale,
    UpdateTransaction,
    DeleteTransaction,
    CreateUser,
    UpdateUser,
    DeleteUser,
    UpdateProfile,
    DbBackup,
    DbRestore,
    CreateTag,
    UpdateTag,
    DeleteTag,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    RecountStock,
    AdjustStock,
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub username: String,
    pub action: LogAction,
    pub details: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(perms: &[Permission]) -> User {
        User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            permissions: perms.iter().copied().collect(),
            allowed_category_ids: BTreeSet::new(),
            allowed_tag_prefixes: BTreeSet::new(),
            profile_picture: None,
        }
    }

    #[test]
    fn test_stock_level_partitions() {
        assert_eq!(StockLevel::classify(0, 100), StockLevel::Finished);
        assert_eq!(StockLevel::classify(1, 100), StockLevel::Low);
        assert_eq!(StockLevel::classify(99, 100), StockLevel::Low);
        assert_eq!(StockLevel::classify(100, 100), StockLevel::Healthy);
    }

    #[test]
    fn test_invoice_type_signs_lines() {
        assert_eq!(InvoiceType::Purchase.signed(5), 5);
        assert_eq!(InvoiceType::Sale.signed(5), -5);
        assert_eq!(
            InvoiceType::Sale.transaction_type(),
            TransactionType::Sale
        );
    }

    #[test]
    fn test_adjustment_is_not_an_invoice_type() {
        assert!(InvoiceType::try_from(TransactionType::Adjustment).is_err());
        assert!(InvoiceType::try_from(TransactionType::Recount).is_err());
        assert_eq!(
            InvoiceType::try_from(TransactionType::Purchase).ok(),
            Some(InvoiceType::Purchase)
        );
    }

    #[test]
    fn test_permission_string_forms() {
        for p in Permission::ALL {
            assert_eq!(Permission::parse(p.as_str()), Some(p));
        }
        assert_eq!(Permission::parse("CAN_FLY"), None);
        assert_eq!(
            serde_json::to_string(&Permission::CanViewLogs).unwrap(),
            "\"CAN_VIEW_LOGS\""
        );
    }

    #[test]
    fn test_require_permission() {
        let user = user_with(&[Permission::CanRecountStock]);
        assert!(user.require(Permission::CanRecountStock).is_ok());
        assert!(matches!(
            user.require(Permission::CanManageUsers),
            Err(CoreError::AuthorizationDenied {
                permission: Permission::CanManageUsers
            })
        ));
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let json = serde_json::to_string(&user_with(&[])).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("allowedTagPrefixes"));
    }

    #[test]
    fn test_transaction_wire_shape() {
        let tx = Transaction {
            id: "t1".to_string(),
            kind: TransactionType::Recount,
            invoice_number: "count".to_string(),
            product_id: "p1".to_string(),
            quantity_change: -5,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "recount");
        assert_eq!(value["quantityChange"], -5);
        assert_eq!(value["productId"], "p1");
    }
}
