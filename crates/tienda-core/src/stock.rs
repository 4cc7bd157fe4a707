//! # Stock Expansion
//!
//! Turns sale lines into per-product stock requirements and compares them
//! with what is on hand.
//!
//! ## Expansion Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product line   (product 5, qty 3)          →  5: 3                     │
//! │                                                                         │
//! │  Combo line     (combo 7, qty 4)                                        │
//! │    bill of materials [(A, 2), (B, 3)]       →  A: 8, B: 12              │
//! │                                                                         │
//! │  Modified combo (combo 7, qty 4)                                        │
//! │    override [(9, 2)]                        →  9: 8   (bill ignored)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same expansion drives every stock movement: decrement on create,
//! restore on delete, restore-then-decrement on edit, and the re-check
//! before a sale is packed. Requirements are compared one by one against
//! current stock; two lines hitting the same product are not summed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::line_item::{ComboItem, LineItem};

// =============================================================================
// Inputs
// =============================================================================

/// A combo's bill of materials as loaded from `DetalleCombos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboRecipe {
    pub combo_id: i64,
    pub name: String,
    pub components: Vec<ComboItem>,
}

impl ComboRecipe {
    /// Builds a recipe from `(product_id, quantity)` pairs.
    pub fn new(combo_id: i64, name: impl Into<String>, components: Vec<(i64, i64)>) -> Self {
        ComboRecipe {
            combo_id,
            name: name.into(),
            components: components
                .into_iter()
                .map(|(product_id, quantity)| ComboItem::new(product_id, quantity))
                .collect(),
        }
    }
}

/// Current stock of one product, with what the shortage message needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductStock {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub stock: i64,
}

// =============================================================================
// Requirements
// =============================================================================

/// Units of one product needed by one sale line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequirement {
    pub product_id: i64,
    pub quantity: i64,
    /// Parent combo, when the requirement comes from a combo line.
    pub combo_name: Option<String>,
}

/// Which way a stock movement goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// Sale created or re-applied: stock goes down.
    Consume,
    /// Sale deleted or about to be edited: stock comes back.
    Restore,
}

impl StockRequirement {
    /// Signed change to apply to `Productos.stock`.
    pub fn delta(&self, direction: StockDirection) -> i64 {
        match direction {
            StockDirection::Consume => -self.quantity,
            StockDirection::Restore => self.quantity,
        }
    }
}

/// Expands one sale line into per-product requirements.
///
/// `recipe` must be supplied for [`LineItem::Combo`]. For a modified combo it
/// is optional and only used for the combo's name.
///
/// ## Example
/// ```rust
/// use tienda_core::stock::{requirements, ComboRecipe};
/// use tienda_core::{LineItem, Money};
///
/// let line = LineItem::Product { product_id: 5, quantity: 3, unit_price: Money::zero(), wholesale: false };
/// let needed = requirements(&line, None).unwrap();
/// assert_eq!((needed[0].product_id, needed[0].quantity), (5, 3));
/// ```
pub fn requirements(
    line: &LineItem,
    recipe: Option<&ComboRecipe>,
) -> CoreResult<Vec<StockRequirement>> {
    let combo_name = recipe.map(|r| r.name.clone());

    let scaled = |items: &[ComboItem], line_qty: i64| {
        items
            .iter()
            .map(|item| StockRequirement {
                product_id: item.product_id,
                quantity: item.quantity * line_qty,
                combo_name: combo_name.clone(),
            })
            .collect::<Vec<_>>()
    };

    match line {
        LineItem::Product {
            product_id,
            quantity,
            ..
        } => Ok(vec![StockRequirement {
            product_id: *product_id,
            quantity: *quantity,
            combo_name: None,
        }]),
        LineItem::Combo {
            combo_id, quantity, ..
        } => {
            let recipe = recipe
                .filter(|r| r.combo_id == *combo_id)
                .ok_or(CoreError::ComboRecipeMissing(*combo_id))?;
            Ok(scaled(&recipe.components, *quantity))
        }
        LineItem::ModifiedCombo {
            quantity, items, ..
        } => Ok(scaled(items, *quantity)),
    }
}

// =============================================================================
// Shortages
// =============================================================================

/// A requirement that current stock cannot cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockShortage {
    pub product_id: i64,
    pub name: String,
    pub code: Option<String>,
    pub available: i64,
    pub required: i64,
    pub combo_name: Option<String>,
}

/// Result of a read-only stock check over a set of sale lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockCheck {
    pub shortages: Vec<StockShortage>,
}

impl StockCheck {
    pub fn is_sufficient(&self) -> bool {
        self.shortages.is_empty()
    }

    /// Turns a failed check into the blocking error.
    pub fn into_result(self) -> CoreResult<()> {
        if self.is_sufficient() {
            Ok(())
        } else {
            Err(CoreError::InsufficientStock(self.shortages))
        }
    }
}

/// Compares each requirement with current stock.
///
/// A product missing from `stock` counts as zero on hand (it was deleted
/// after the sale was taken).
pub fn find_shortages(
    requirements: &[StockRequirement],
    stock: &HashMap<i64, ProductStock>,
) -> StockCheck {
    let shortages = requirements
        .iter()
        .filter_map(|req| {
            let (name, code, available) = match stock.get(&req.product_id) {
                Some(p) => (p.name.clone(), p.code.clone(), p.stock),
                None => (format!("Product #{}", req.product_id), None, 0),
            };

            (available < req.quantity).then(|| StockShortage {
                product_id: req.product_id,
                name,
                code,
                available,
                required: req.quantity,
                combo_name: req.combo_name.clone(),
            })
        })
        .collect();

    StockCheck { shortages }
}

/// Multi-line message listing every short product.
pub fn format_shortages(shortages: &[StockShortage]) -> String {
    let items: Vec<String> = shortages
        .iter()
        .map(|s| {
            let combo = s
                .combo_name
                .as_ref()
                .map(|c| format!(" from combo \"{}\"", c))
                .unwrap_or_default();
            format!(
                "- {} (Code: {}, ID: {}){}\n  Available: {}, Required: {}",
                s.name,
                s.code.as_deref().unwrap_or("N/A"),
                s.product_id,
                combo,
                s.available,
                s.required
            )
        })
        .collect();

    format!(
        "Insufficient stock for the following products:\n\n{}",
        items.join("\n\n")
    )
}

// =============================================================================
// Combo Availability
// =============================================================================

/// Sellable units of a combo given `(units per combo, product stock)` pairs.
///
/// `min(floor(stock / units))` over the components; no components or a
/// negative stock gives 0.
///
/// ```rust
/// use tienda_core::stock::combo_availability;
///
/// assert_eq!(combo_availability(&[(2, 9), (3, 12)]), 4);
/// assert_eq!(combo_availability(&[]), 0);
/// ```
pub fn combo_availability(components: &[(i64, i64)]) -> i64 {
    components
        .iter()
        .filter(|(per_combo, _)| *per_combo > 0)
        .map(|(per_combo, stock)| (*stock).max(0) / per_combo)
        .min()
        .unwrap_or(0)
}

// =============================================================================
// Unit Tests
// =============================================================================
