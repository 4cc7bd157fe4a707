//! # Inventory Helpers
//!
//! Stock bookkeeping shared by sales and purchases. Every helper runs on the
//! caller's connection so it takes part in the caller's transaction.
//!
//! ## Sale Line → Stock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product line          → 1 requirement (product, qty)                  │
//! │  Combo line            → recipe from DetalleCombos × qty               │
//! │  Modified combo line   → stored override items × qty                   │
//! │                                                                         │
//! │  requirements ──► load stock snapshot ──► find_shortages (check)       │
//! │               └─► UPDATE Productos SET stock = stock ± qty  (apply)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::debug;

use tienda_core::stock::{
    find_shortages, requirements, ComboRecipe, ProductStock, StockCheck, StockDirection,
};
use tienda_core::{LineItem, StockRequirement};

use crate::error::{DbError, DbResult};

/// What to do when a combo line points at a combo that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCombo {
    /// New lines: reject with NotFound.
    Reject,
    /// Stored lines: the combo contributes nothing.
    Ignore,
}

/// Loads a combo's bill of materials.
///
/// Returns `None` when the combo does not exist.
pub async fn load_recipe(
    conn: &mut SqliteConnection,
    combo_id: i64,
) -> DbResult<Option<ComboRecipe>> {
    let name: Option<String> = sqlx::query_scalar("SELECT nombre FROM Combos WHERE id = ?1")
        .bind(combo_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(name) = name else {
        return Ok(None);
    };

    let components: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT id_producto, cantidad FROM DetalleCombos WHERE id_combo = ?1 ORDER BY id",
    )
    .bind(combo_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ComboRecipe::new(combo_id, name, components)))
}

/// Expands one line into per-product requirements.
pub async fn expand_line(
    conn: &mut SqliteConnection,
    line: &LineItem,
    missing: MissingCombo,
) -> DbResult<Vec<StockRequirement>> {
    match line {
        LineItem::Product { .. } => Ok(requirements(line, None)?),
        LineItem::Combo { combo_id, .. } => match load_recipe(conn, *combo_id).await? {
            Some(recipe) => Ok(requirements(line, Some(&recipe))?),
            None if missing == MissingCombo::Ignore => {
                debug!(combo_id, "Combo no longer exists, nothing to expand");
                Ok(Vec::new())
            }
            None => Err(DbError::not_found("Combo", combo_id)),
        },
        LineItem::ModifiedCombo { combo_id, .. } => {
            // Only the name is taken from the catalog; items come from the line.
            let name: Option<String> =
                sqlx::query_scalar("SELECT nombre FROM Combos WHERE id = ?1")
                    .bind(combo_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            let recipe = match name {
                Some(name) => Some(ComboRecipe::new(*combo_id, name, Vec::new())),
                None if missing == MissingCombo::Ignore => None,
                None => return Err(DbError::not_found("Combo", combo_id)),
            };
            Ok(requirements(line, recipe.as_ref())?)
        }
    }
}

/// Expands every line, concatenating the requirements.
pub async fn expand_lines(
    conn: &mut SqliteConnection,
    lines: &[LineItem],
    missing: MissingCombo,
) -> DbResult<Vec<StockRequirement>> {
    let mut all = Vec::new();
    for line in lines {
        all.extend(expand_line(conn, line, missing).await?);
    }
    Ok(all)
}

/// Current stock of every product the requirements touch.
///
/// Products that do not exist are simply absent from the map.
pub async fn load_stock(
    conn: &mut SqliteConnection,
    needed: &[StockRequirement],
) -> DbResult<HashMap<i64, ProductStock>> {
    let mut snapshot = HashMap::new();

    for req in needed {
        if snapshot.contains_key(&req.product_id) {
            continue;
        }
        let row: Option<ProductStock> = sqlx::query_as(
            "SELECT id, nombre AS name, codigo AS code, stock FROM Productos WHERE id = ?1",
        )
        .bind(req.product_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            snapshot.insert(row.id, row);
        }
    }

    Ok(snapshot)
}

/// Fails with NotFound on the first requirement whose product is missing.
pub fn ensure_products_exist(
    needed: &[StockRequirement],
    snapshot: &HashMap<i64, ProductStock>,
) -> DbResult<()> {
    match needed.iter().find(|r| !snapshot.contains_key(&r.product_id)) {
        Some(missing) => Err(DbError::not_found("Product", missing.product_id)),
        None => Ok(()),
    }
}

/// Compares requirements with the stock currently stored.
pub async fn check(
    conn: &mut SqliteConnection,
    needed: &[StockRequirement],
) -> DbResult<StockCheck> {
    let snapshot = load_stock(conn, needed).await?;
    Ok(find_shortages(needed, &snapshot))
}

/// Moves stock for every requirement.
///
/// Requirements on products that no longer exist are skipped.
pub async fn apply(
    conn: &mut SqliteConnection,
    needed: &[StockRequirement],
    direction: StockDirection,
) -> DbResult<()> {
    for req in needed {
        adjust(conn, req.product_id, req.delta(direction)).await?;
    }
    Ok(())
}

/// `stock = stock + delta`. Returns false when the product does not exist.
pub async fn adjust(conn: &mut SqliteConnection, product_id: i64, delta: i64) -> DbResult<bool> {
    let result = sqlx::query("UPDATE Productos SET stock = stock + ?1 WHERE id = ?2")
        .bind(delta)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}
