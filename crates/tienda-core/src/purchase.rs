//! # Purchase Pricing
//!
//! Prices purchase lines and spreads the shipping cost over the units
//! received.
//!
//! ```text
//! shipping 100, lines: 5 × $20 (IVA 21%), 5 × $10 (IVA 0%)
//!
//!   per unit shipping = 100 / (5 + 5)         = 10
//!   line 1: price with IVA = 2000 + 420       = 2420   landed = 2430
//!   line 2: price with IVA = 1000             = 1000   landed = 1010
//!   total  = 5×2420 + 5×1000 + 100            = 17200
//! ```
//!
//! Shipping is split per unit, not by value, and the per-unit share is
//! truncated to whole cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, TaxRate};

// =============================================================================
// Inputs
// =============================================================================

/// A purchase line as entered by the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLineInput {
    pub product_id: i64,
    pub quantity: i64,
    /// Net unit price in cents.
    pub unit_price_cents: i64,
    /// IVA in basis points (2100 = 21%).
    #[serde(default)]
    pub iva_bps: u32,
    /// Overwrite the product's cost price with this line's landed cost.
    #[serde(default)]
    pub update_cost_price: bool,
}

impl PurchaseLineInput {
    pub fn price_with_iva(&self) -> Money {
        Money::from_cents(self.unit_price_cents).with_tax(TaxRate::from_bps(self.iva_bps))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchase {
    pub supplier_id: i64,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    /// Falls back to the supplier's default shipping cost when absent.
    pub shipping_cost_cents: Option<i64>,
    pub lines: Vec<PurchaseLineInput>,
}

/// Edit of a line already in the purchase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLineEdit {
    pub line_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub iva_bps: u32,
}

impl PurchaseLineEdit {
    pub fn price_with_iva(&self) -> Money {
        Money::from_cents(self.unit_price_cents).with_tax(TaxRate::from_bps(self.iva_bps))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseUpdate {
    pub supplier_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    pub shipping_cost_cents: Option<i64>,
    #[serde(default)]
    pub existing: Vec<PurchaseLineEdit>,
    #[serde(default)]
    pub added: Vec<PurchaseLineInput>,
    /// Ids of lines to drop.
    #[serde(default)]
    pub removed: Vec<i64>,
}

// =============================================================================
// Pricing
// =============================================================================

/// Shipping share of every unit received.
///
/// ```rust
/// use tienda_core::purchase::shipping_per_unit;
/// use tienda_core::Money;
///
/// assert_eq!(shipping_per_unit(Money::from_cents(100), [5, 5]).cents(), 10);
/// ```
pub fn shipping_per_unit(shipping: Money, quantities: impl IntoIterator<Item = i64>) -> Money {
    let units: i64 = quantities.into_iter().sum();
    shipping.per_unit(units)
}

/// Cost written to `Productos.precio_compra`: price with IVA plus the
/// per-unit shipping share.
pub fn landed_cost(price_with_iva: Money, shipping_share: Money) -> Money {
    price_with_iva + shipping_share
}

/// `Σ(quantity × price with IVA) + shipping`.
pub fn purchase_total(
    lines: impl IntoIterator<Item = (i64, Money)>,
    shipping: Money,
) -> Money {
    lines
        .into_iter()
        .map(|(quantity, price_with_iva)| price_with_iva.multiply_quantity(quantity))
        .sum::<Money>()
        + shipping
}

/// A fully priced purchase line, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub iva: TaxRate,
    pub price_with_iva: Money,
    pub landed_cost: Money,
    pub update_cost_price: bool,
}

/// Pricing of a whole new purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasePricing {
    pub lines: Vec<PricedLine>,
    pub shipping_per_unit: Money,
    pub total: Money,
}

/// Prices every line of a new purchase.
pub fn price_purchase(lines: &[PurchaseLineInput], shipping: Money) -> PurchasePricing {
    let per_unit = shipping_per_unit(shipping, lines.iter().map(|l| l.quantity));

    let priced: Vec<PricedLine> = lines
        .iter()
        .map(|line| {
            let price_with_iva = line.price_with_iva();
            PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: Money::from_cents(line.unit_price_cents),
                iva: TaxRate::from_bps(line.iva_bps),
                price_with_iva,
                landed_cost: landed_cost(price_with_iva, per_unit),
                update_cost_price: line.update_cost_price,
            }
        })
        .collect();

    let total = purchase_total(priced.iter().map(|l| (l.quantity, l.price_with_iva)), shipping);

    PurchasePricing {
        lines: priced,
        shipping_per_unit: per_unit,
        total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
