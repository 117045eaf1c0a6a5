//! # stockbook-core: Pure Inventory Logic for Stockbook
//!
//! This crate holds the ledger rules of Stockbook as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Callers (UI, CLI, seed binary)                  │   │
//! │  │   Invoice form ──► Recount ──► Cardex view ──► Backup button    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockbook-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐         │   │
//! │  │   │  types   │ │  ledger  │ │  access  │ │  cardex  │         │   │
//! │  │   │ Product  │ │ postings │ │  filter  │ │ balances │         │   │
//! │  │   │ Txn,User │ │  guards  │ │ by user  │ │ history  │         │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘         │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐                      │   │
//! │  │   │validation│ │  stats   │ │  export  │                      │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘                      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockbook-db (Storage Layer)                    │   │
//! │  │     SQLite, migrations, repositories, atomic ledger engine      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Transaction, User, LogEntry, etc.)
//! - [`error`] - Domain error types
//! - [`validation`] - Input shape rules
//! - [`ledger`] - Posting plans, stock guards, drift detection
//! - [`access`] - Per-user visibility of products, transactions, tags
//! - [`cardex`] - Running-balance history of one product
//! - [`stats`] - Dashboard counts and stock partitions
//! - [`export`] - Rows with ids resolved to names
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: the database crate feeds data in and applies the results
//! 3. **Integer Stock**: quantities are `i64`, changes are signed
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use stockbook_core::ledger::apply_delta;
//!
//! // 30 on hand, selling 100 is refused
//! assert!(apply_delta("p1", 30, -100).is_err());
//! assert_eq!(apply_delta("p1", 30, -5).unwrap(), 25);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod cardex;
pub mod error;
pub mod export;
pub mod ledger;
pub mod stats;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::AccessFilter;
pub use cardex::{Cardex, CardexEntry};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::LedgerDrift;
pub use stats::DashboardStats;
pub use types::*;
pub use validation::ValidationResult;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Products with `0 < quantity < LOW_STOCK_THRESHOLD` count as low stock.
///
/// Overridable per store through `StoreConfig::low_stock_threshold`.
pub const LOW_STOCK_THRESHOLD: i64 = 100;

/// Maximum length of product, tag, category and user names.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length of recount notes and adjustment reasons.
pub const MAX_NOTES_LENGTH: usize = 500;
