//! # Sale Line Items
//!
//! A sale line is one of three shapes:
//!
//! ```text
//! LineItem
//! ├── Product       { product_id, quantity, unit_price, wholesale }
//! ├── Combo         { combo_id, quantity, unit_price }            ← uses the combo's bill
//! └── ModifiedCombo { combo_id, quantity, unit_price, items }     ← ad-hoc contents
//! ```
//!
//! The `DetalleVentas` table keeps the flat layout the front end already
//! knows (`es_combo` flag plus a nullable `datos_combo_modificado` JSON
//! column). Conversion happens here, at the edges; inside the crate a
//! modified combo is never an opaque string.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, ValidationError};
use crate::money::Money;

/// One entry of a modified combo: product and units per combo.
///
/// Serialized as `{"id_producto": 9, "cantidad": 2}`, the format stored in
/// `datos_combo_modificado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComboItem {
    #[serde(rename = "id_producto")]
    pub product_id: i64,
    #[serde(rename = "cantidad")]
    pub quantity: i64,
}

impl ComboItem {
    pub const fn new(product_id: i64, quantity: i64) -> Self {
        ComboItem {
            product_id,
            quantity,
        }
    }
}

/// A sale line with its stock-relevant shape made explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum LineItem {
    Product {
        product_id: i64,
        quantity: i64,
        unit_price: Money,
        wholesale: bool,
    },
    Combo {
        combo_id: i64,
        quantity: i64,
        unit_price: Money,
    },
    ModifiedCombo {
        combo_id: i64,
        quantity: i64,
        unit_price: Money,
        items: Vec<ComboItem>,
    },
}

impl LineItem {
    /// The id stored in `DetalleVentas.id_producto`: a product id for plain
    /// lines, a combo id for combo lines.
    pub fn reference_id(&self) -> i64 {
        match self {
            LineItem::Product { product_id, .. } => *product_id,
            LineItem::Combo { combo_id, .. } | LineItem::ModifiedCombo { combo_id, .. } => {
                *combo_id
            }
        }
    }

    pub fn quantity(&self) -> i64 {
        match self {
            LineItem::Product { quantity, .. }
            | LineItem::Combo { quantity, .. }
            | LineItem::ModifiedCombo { quantity, .. } => *quantity,
        }
    }

    pub fn unit_price(&self) -> Money {
        match self {
            LineItem::Product { unit_price, .. }
            | LineItem::Combo { unit_price, .. }
            | LineItem::ModifiedCombo { unit_price, .. } => *unit_price,
        }
    }

    /// `unit_price × quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity())
    }

    pub fn is_combo(&self) -> bool {
        !matches!(self, LineItem::Product { .. })
    }

    pub fn is_wholesale(&self) -> bool {
        matches!(self, LineItem::Product { wholesale: true, .. })
    }

    /// Override contents of a modified combo.
    pub fn override_items(&self) -> Option<&[ComboItem]> {
        match self {
            LineItem::ModifiedCombo { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Value for the `datos_combo_modificado` column.
    pub fn override_json(&self) -> serde_json::Result<Option<String>> {
        self.override_items()
            .map(serde_json::to_string)
            .transpose()
    }

    /// Rebuilds a line from its stored row.
    ///
    /// A combo row with override JSON becomes a [`LineItem::ModifiedCombo`];
    /// malformed JSON is an error rather than a silent fallback to the
    /// combo's bill of materials.
    pub fn from_stored(
        reference_id: i64,
        quantity: i64,
        unit_price: Money,
        is_combo: bool,
        wholesale: bool,
        override_json: Option<&str>,
    ) -> serde_json::Result<Self> {
        if !is_combo {
            return Ok(LineItem::Product {
                product_id: reference_id,
                quantity,
                unit_price,
                wholesale,
            });
        }

        match override_json.map(str::trim).filter(|s| !s.is_empty()) {
            Some(json) => Ok(LineItem::ModifiedCombo {
                combo_id: reference_id,
                quantity,
                unit_price,
                items: serde_json::from_str(json)?,
            }),
            None => Ok(LineItem::Combo {
                combo_id: reference_id,
                quantity,
                unit_price,
            }),
        }
    }
}

// =============================================================================
// Wire Shape
// =============================================================================

/// Sale line as posted by the front end.
///
/// A modified combo arrives either with `combo_modificado` and `items`, or
/// with a pre-serialized `datos_combo_modificado` string (sale edits echo
/// back what they loaded).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub id_producto: i64,
    pub cantidad: i64,
    /// Unit price in cents.
    pub precio: i64,
    #[serde(default)]
    pub es_combo: bool,
    #[serde(default)]
    pub es_mayorista: bool,
    #[serde(default)]
    pub combo_modificado: bool,
    #[serde(default)]
    pub items: Option<Vec<ComboItem>>,
    #[serde(default)]
    pub datos_combo_modificado: Option<String>,
}

impl TryFrom<SaleLineRequest> for LineItem {
    type Error = CoreError;

    fn try_from(req: SaleLineRequest) -> Result<Self, Self::Error> {
        let unit_price = Money::from_cents(req.precio);

        if !req.es_combo {
            return Ok(LineItem::Product {
                product_id: req.id_producto,
                quantity: req.cantidad,
                unit_price,
                wholesale: req.es_mayorista,
            });
        }

        if req.combo_modificado {
            if let Some(items) = req.items {
                return Ok(LineItem::ModifiedCombo {
                    combo_id: req.id_producto,
                    quantity: req.cantidad,
                    unit_price,
                    items,
                });
            }
        }

        LineItem::from_stored(
            req.id_producto,
            req.cantidad,
            unit_price,
            true,
            false,
            req.datos_combo_modificado.as_deref(),
        )
        .map_err(|e| {
            ValidationError::InvalidFormat {
                field: "datos_combo_modificado".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
