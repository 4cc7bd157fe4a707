//! # tienda-core: Pure Business Logic for Tienda
//!
//! This crate holds the rules of the shop as pure functions with zero I/O
//! dependencies. The database layer (`tienda-db`) loads rows, hands them to
//! the functions here, and writes back whatever they decide.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tienda Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Web front end / tienda-admin CLI                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tienda-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   stock   │  │sale_status│  │   │
//! │  │   │  Product  │  │   Money   │  │ expansion │  │  machine  │  │   │
//! │  │   │  Combo    │  │  TaxRate  │  │ shortages │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │ line_item │  │ purchase  │  │validation │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tienda-db (Database Layer)                   │   │
//! │  │        SQLite queries, migrations, repositories, lifecycle      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Combo, Sale, Purchase, ...)
//! - [`money`] - Money and TaxRate with integer arithmetic
//! - [`sale_status`] - Sale status state machine
//! - [`line_item`] - Sale line variants (product, combo, modified combo)
//! - [`stock`] - Stock requirement expansion and shortage detection
//! - [`purchase`] - Purchase pricing and shipping apportionment
//! - [`validation`] - Business rule validation and code generation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tienda_core::stock::{requirements, ComboRecipe};
//! use tienda_core::line_item::LineItem;
//! use tienda_core::Money;
//!
//! let recipe = ComboRecipe::new(7, "Kit mate", vec![(1, 2), (2, 3)]);
//! let line = LineItem::Combo { combo_id: 7, quantity: 4, unit_price: Money::from_cents(1500) };
//!
//! let needed = requirements(&line, Some(&recipe)).unwrap();
//! assert_eq!(needed[0].quantity, 8);
//! assert_eq!(needed[1].quantity, 12);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod line_item;
pub mod money;
pub mod purchase;
pub mod sale_status;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use line_item::{ComboItem, LineItem, SaleLineRequest};
pub use money::{Money, TaxRate};
pub use sale_status::SaleStatus;
pub use stock::{StockRequirement, StockShortage};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Length of generated product/combo codes (numeric, EAN-style).
pub const CODE_LENGTH: usize = 12;

/// How many random codes are tried before code generation gives up.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Maximum quantity of a single sale or purchase line.
///
/// ## Business Reason
/// Catches typos (1000 instead of 10) before they hit stock.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Highest accepted price, shipping cost or cost price, in cents
/// ($100,000,000.00).
///
/// With [`MAX_LINE_QUANTITY`], [`MAX_DOCUMENT_LINES`] and IVA capped at
/// 100%, the total of a sale or purchase stays far below `i64::MAX`.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Maximum number of lines in one sale or purchase.
pub const MAX_DOCUMENT_LINES: usize = 500;

/// Number of sales shown in the dashboard's "recent" list.
pub const DASHBOARD_RECENT_SALES: i64 = 5;

/// Number of products shown in the dashboard's best sellers list.
pub const DASHBOARD_TOP_PRODUCTS: i64 = 5;
