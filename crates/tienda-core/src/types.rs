//! # Domain Types
//!
//! Core domain types for Tienda.
//!
//! ## Entity Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Model                                    │
//! │                                                                         │
//! │  Supplier ──< Product >── ComboComponent >── Combo                      │
//! │     │            │                                                      │
//! │     └──< Purchase ──< PurchaseLine                                      │
//! │                  │                                                      │
//! │  Client ──< Sale ──< SaleLine  (product, combo or modified combo)       │
//! │                                                                         │
//! │  DayClose: daily snapshot of sales and purchases                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row types mirror the tables column by column (amounts as `*_cents: i64`),
//! with `Money` accessors where the amount is used in calculations. Input
//! types (`New*`, `*Update`) are what callers hand to the repositories;
//! `None` in an update means "leave unchanged".

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::line_item::{ComboItem, LineItem};
use crate::money::Money;
use crate::sale_status::SaleStatus;

// =============================================================================
// Product
// =============================================================================

/// A product on the shelf.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Retail price in cents.
    pub price_cents: i64,
    /// Last landed cost in cents (price with IVA plus shipping share).
    pub cost_price_cents: i64,
    /// Wholesale price in cents.
    pub wholesale_price_cents: i64,
    /// Barcode, unique across products and combos.
    pub code: String,
    pub supplier_code: Option<String>,
    /// On-hand units. Can be negative after an oversold sale.
    pub stock: i64,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost_price(&self) -> Money {
        Money::from_cents(self.cost_price_cents)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_price_cents: i64,
    #[serde(default)]
    pub wholesale_price_cents: i64,
    pub code: String,
    pub supplier_code: Option<String>,
    #[serde(default)]
    pub stock: i64,
    pub supplier_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub cost_price_cents: Option<i64>,
    pub wholesale_price_cents: Option<i64>,
    pub code: Option<String>,
    pub supplier_code: Option<String>,
    pub stock: Option<i64>,
    pub supplier_id: Option<i64>,
}

/// Which products count as "low stock".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "mode", rename_all = "snake_case")]
#[ts(export)]
pub enum LowStockFilter {
    /// `stock < limit`
    Below { limit: i64 },
    /// `stock = units`
    Exactly { units: i64 },
    /// `min <= stock < max`
    Between { min: i64, max: i64 },
}

impl Default for LowStockFilter {
    fn default() -> Self {
        LowStockFilter::Below { limit: 5 }
    }
}

// =============================================================================
// Combo
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Combo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub code: String,
}

/// One row of a combo's bill of materials, joined with its product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComboComponent {
    pub product_id: i64,
    pub quantity: i64,
    pub product_name: String,
    pub product_code: Option<String>,
    pub product_price_cents: i64,
    pub product_stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComboWithComponents {
    #[serde(flatten)]
    pub combo: Combo,
    pub components: Vec<ComboComponent>,
    /// Units sellable with current stock.
    pub available: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCombo {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub code: String,
    pub components: Vec<ComboItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComboUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub code: Option<String>,
    /// Replaces the whole bill of materials when present.
    pub components: Option<Vec<ComboItem>>,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dni: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dni: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub dni: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

/// One entry of a client's purchase history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ClientSaleSummary {
    pub id: i64,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub total_cents: i64,
    pub status: SaleStatus,
    pub line_count: i64,
}

// =============================================================================
// Supplier
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Default shipping cost for new purchases, in cents.
    pub shipping_cost_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSupplier {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub shipping_cost_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SupplierUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub shipping_cost_cents: Option<i64>,
}

// =============================================================================
// Purchase
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: i64,
    pub supplier_id: i64,
    pub supplier_name: Option<String>,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub total_cents: i64,
    pub shipping_cost_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseLine {
    pub id: i64,
    pub purchase_id: i64,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity: i64,
    /// Net unit price in cents.
    pub unit_price_cents: i64,
    pub iva_bps: i64,
    pub price_with_iva_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseWithLines {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub lines: Vec<PurchaseLine>,
}

// =============================================================================
// Sale
// =============================================================================

/// Fulfillment details captured while packing and shipping a sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleFulfillment {
    /// Channel the client used (WhatsApp, Instagram, ...).
    pub communication_channel: Option<String>,
    /// Handle or number on that channel.
    pub communication_detail: Option<String>,
    pub email_used: Option<String>,
    pub shipping_payment: Option<String>,
    pub transfer_account: Option<String>,
    pub payment_receipt: Option<String>,
    #[serde(default)]
    pub invoice_required: bool,
    pub invoice_number: Option<String>,
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub pay_on_delivery: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub total_cents: i64,
    pub status: SaleStatus,
    /// Set by the day close.
    pub closed: bool,
    #[serde(flatten)]
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub fulfillment: SaleFulfillment,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A stored sale line, joined with the name and code of what it references.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    /// Product id, or combo id when `is_combo`.
    pub reference_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub is_combo: bool,
    pub wholesale: bool,
    /// Raw `datos_combo_modificado` column.
    pub override_json: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
}

impl SaleLine {
    /// Rebuilds the typed line item from this row.
    pub fn item(&self) -> serde_json::Result<LineItem> {
        LineItem::from_stored(
            self.reference_id,
            self.quantity,
            Money::from_cents(self.unit_price_cents),
            self.is_combo,
            self.wholesale,
            self.override_json.as_deref(),
        )
    }

    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleWithLines {
    #[serde(flatten)]
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub client_id: Option<i64>,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub fulfillment: SaleFulfillment,
}

/// Partial update of a sale's header. Status changes go through the
/// status transition instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleUpdate {
    pub client_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    pub communication_channel: Option<String>,
    pub communication_detail: Option<String>,
    pub email_used: Option<String>,
    pub shipping_payment: Option<String>,
    pub transfer_account: Option<String>,
    pub payment_receipt: Option<String>,
    pub invoice_required: Option<bool>,
    pub invoice_number: Option<String>,
    pub tracking_number: Option<String>,
    pub pay_on_delivery: Option<bool>,
}

/// Override entry of a modified combo, with product details when the
/// product still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModifiedComboEntry {
    pub product_id: i64,
    pub quantity: i64,
    pub name: Option<String>,
    pub code: Option<String>,
}

// =============================================================================
// Day Close
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DayClose {
    pub id: i64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub sales_total_cents: i64,
    pub purchases_total_cents: i64,
    /// Sales minus purchases; negative on heavy restock days.
    pub profit_cents: i64,
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TopProduct {
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardStats {
    pub sales_total_cents: i64,
    pub product_count: i64,
    pub client_count: i64,
    pub recent_sales: Vec<Sale>,
    pub top_products: Vec<TopProduct>,
    pub monthly_sales: Vec<MonthlyTotal>,
}

// =============================================================================
// Unit Tests
// =============================================================================
