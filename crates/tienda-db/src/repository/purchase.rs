//! # Purchase Repository
//!
//! Purchases bring stock in and can refresh product cost prices.
//!
//! ## Shipping Apportionment
//! ```text
//! shipping $10.00, lines: 5 × Yerba ($20.00 + IVA), 5 × Bombilla ($1.00 + IVA)
//!
//!   per unit share = 1000¢ / (5 + 5) = 100¢   (per unit, not by value)
//!   Yerba cost     = price with IVA + 100¢
//!   Bombilla cost  = price with IVA + 100¢
//!   total          = Σ qty × price with IVA + 1000¢
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tienda_core::purchase::{
    landed_cost, price_purchase, purchase_total, shipping_per_unit, NewPurchase, PurchaseUpdate,
};
use tienda_core::validation::{
    validate_iva_bps, validate_line_count, validate_price_cents, validate_purchase_line,
    validate_quantity,
};
use tienda_core::{Money, Purchase, PurchaseLine, PurchaseWithLines, ValidationError};

use crate::error::{DbError, DbResult};
use crate::executor::UnitOfWork;
use crate::repository::{inventory, timestamp};

const PURCHASE_SELECT: &str = r#"
    SELECT
        c.id,
        c.id_proveedor AS supplier_id,
        pr.nombre AS supplier_name,
        c.fecha AS date,
        c.total AS total_cents,
        c.costo_envio AS shipping_cost_cents
    FROM Compras c
    LEFT JOIN Proveedor pr ON pr.id = c.id_proveedor
"#;

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Records a purchase: stock goes up by every line's quantity and,
    /// where requested, the product's cost price becomes the landed cost.
    ///
    /// Shipping defaults to the supplier's configured cost.
    pub async fn create(&self, purchase: &NewPurchase) -> DbResult<PurchaseWithLines> {
        if purchase.lines.is_empty() {
            return Err(ValidationError::required("lines").into());
        }
        validate_line_count(purchase.lines.len())?;
        purchase.lines.iter().try_for_each(validate_purchase_line)?;
        if let Some(shipping) = purchase.shipping_cost_cents {
            validate_price_cents("shipping_cost", shipping)?;
        }

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("purchase.create");
        let result = create_in_tx(&mut tx, purchase).await;
        let (id, total) = unit.finish(tx, result).await?;

        info!(id, total = %total, lines = purchase.lines.len(), "Purchase recorded");
        self.require(id).await
    }

    /// Edits a purchase. Stock follows every quantity change and the total
    /// is recomputed from the resulting lines.
    ///
    /// Returns `None` if the purchase does not exist.
    pub async fn update(&self, id: i64, update: &PurchaseUpdate) -> DbResult<Option<PurchaseWithLines>> {
        if let Some(shipping) = update.shipping_cost_cents {
            validate_price_cents("shipping_cost", shipping)?;
        }
        for edit in &update.existing {
            validate_quantity(edit.quantity)?;
            validate_price_cents("price", edit.unit_price_cents)?;
            validate_iva_bps(edit.iva_bps)?;
        }
        update.added.iter().try_for_each(validate_purchase_line)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("purchase.update");
        let result = update_in_tx(&mut tx, id, update).await;
        let total = unit.finish(tx, result).await?;

        let Some(total) = total else {
            debug!(id, "Purchase to update not found");
            return Ok(None);
        };

        info!(
            id,
            total = %total,
            edited = update.existing.len(),
            added = update.added.len(),
            removed = update.removed.len(),
            "Purchase updated"
        );
        self.get_by_id(id).await
    }

    /// Deletes a purchase and takes its quantities back out of stock.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("purchase.delete");
        let result = delete_in_tx(&mut tx, id).await;
        let deleted = unit.finish(tx, result).await?;

        if deleted {
            info!(id, "Purchase deleted, stock reversed");
        }
        Ok(deleted)
    }

    /// All purchases, newest first.
    pub async fn list(&self) -> DbResult<Vec<Purchase>> {
        let sql = format!("{PURCHASE_SELECT} ORDER BY c.fecha DESC, c.id DESC");
        let purchases = sqlx::query_as::<_, Purchase>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(purchases)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PurchaseWithLines>> {
        let sql = format!("{PURCHASE_SELECT} WHERE c.id = ?1");
        let mut conn = self.pool.acquire().await?;
        let Some(purchase) = sqlx::query_as::<_, Purchase>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, PurchaseLine>(
            r#"
            SELECT
                d.id,
                d.id_compra AS purchase_id,
                d.id_producto AS product_id,
                p.nombre AS product_name,
                d.cantidad AS quantity,
                d.precio AS unit_price_cents,
                d.iva_bps,
                d.precio_con_iva AS price_with_iva_cents
            FROM DetalleCompras d
            LEFT JOIN Productos p ON p.id = d.id_producto
            WHERE d.id_compra = ?1
            ORDER BY d.id
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(PurchaseWithLines { purchase, lines }))
    }

    async fn require(&self, id: i64) -> DbResult<PurchaseWithLines> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Purchase", id))
    }
}

// =============================================================================
// Transaction Bodies
// =============================================================================

async fn supplier_shipping(conn: &mut SqliteConnection, supplier_id: i64) -> DbResult<i64> {
    sqlx::query_scalar("SELECT envio FROM Proveedor WHERE id = ?1")
        .bind(supplier_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Supplier", supplier_id))
}

async fn create_in_tx(conn: &mut SqliteConnection, purchase: &NewPurchase) -> DbResult<(i64, Money)> {
    let default_shipping = supplier_shipping(conn, purchase.supplier_id).await?;
    let shipping = Money::from_cents(purchase.shipping_cost_cents.unwrap_or(default_shipping));
    let pricing = price_purchase(&purchase.lines, shipping);

    let id = sqlx::query(
        "INSERT INTO Compras (id_proveedor, fecha, total, costo_envio) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(purchase.supplier_id)
    .bind(timestamp(purchase.date))
    .bind(pricing.total.cents())
    .bind(shipping.cents())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for line in &pricing.lines {
        if !inventory::adjust(conn, line.product_id, line.quantity).await? {
            return Err(DbError::not_found("Product", line.product_id));
        }

        sqlx::query(
            r#"
            INSERT INTO DetalleCompras (id_compra, id_producto, cantidad, precio, iva_bps, precio_con_iva)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price.cents())
        .bind(line.iva.bps())
        .bind(line.price_with_iva.cents())
        .execute(&mut *conn)
        .await?;

        if line.update_cost_price {
            set_cost_price(conn, line.product_id, line.landed_cost).await?;
        }
    }

    debug!(
        id,
        shipping_per_unit = %pricing.shipping_per_unit,
        "Purchase lines stored"
    );
    Ok((id, pricing.total))
}

/// Returns the new total, or `None` when the purchase does not exist.
async fn update_in_tx(
    conn: &mut SqliteConnection,
    id: i64,
    update: &PurchaseUpdate,
) -> DbResult<Option<Money>> {
    let current: Option<(i64, i64)> =
        sqlx::query_as("SELECT id_proveedor, costo_envio FROM Compras WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((current_supplier, current_shipping)) = current else {
        return Ok(None);
    };

    let supplier_id = update.supplier_id.unwrap_or(current_supplier);
    if update.supplier_id.is_some() {
        supplier_shipping(conn, supplier_id).await?;
    }
    let shipping = Money::from_cents(update.shipping_cost_cents.unwrap_or(current_shipping));

    for line_id in &update.removed {
        let Some((product_id, quantity)) = purchase_line(conn, id, *line_id).await? else {
            continue;
        };
        inventory::adjust(conn, product_id, -quantity).await?;
        sqlx::query("DELETE FROM DetalleCompras WHERE id = ?1")
            .bind(line_id)
            .execute(&mut *conn)
            .await?;
    }

    for edit in &update.existing {
        let (product_id, old_quantity) = purchase_line(conn, id, edit.line_id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseLine", edit.line_id))?;

        sqlx::query(
            "UPDATE DetalleCompras SET cantidad = ?1, precio = ?2, iva_bps = ?3, precio_con_iva = ?4 WHERE id = ?5",
        )
        .bind(edit.quantity)
        .bind(edit.unit_price_cents)
        .bind(edit.iva_bps)
        .bind(edit.price_with_iva().cents())
        .bind(edit.line_id)
        .execute(&mut *conn)
        .await?;

        let delta = edit.quantity - old_quantity;
        if delta != 0 {
            inventory::adjust(conn, product_id, delta).await?;
        }
    }

    for line in &update.added {
        if !inventory::adjust(conn, line.product_id, line.quantity).await? {
            return Err(DbError::not_found("Product", line.product_id));
        }
        sqlx::query(
            r#"
            INSERT INTO DetalleCompras (id_compra, id_producto, cantidad, precio, iva_bps, precio_con_iva)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.iva_bps)
        .bind(line.price_with_iva().cents())
        .execute(&mut *conn)
        .await?;
    }

    let lines: Vec<(i64, i64)> =
        sqlx::query_as("SELECT cantidad, precio_con_iva FROM DetalleCompras WHERE id_compra = ?1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
    validate_line_count(lines.len())?;

    let per_unit = shipping_per_unit(shipping, lines.iter().map(|(qty, _)| *qty));
    let total = purchase_total(
        lines.iter().map(|&(qty, price)| (qty, Money::from_cents(price))),
        shipping,
    );

    for line in update.added.iter().filter(|l| l.update_cost_price) {
        set_cost_price(conn, line.product_id, landed_cost(line.price_with_iva(), per_unit)).await?;
    }

    sqlx::query(
        "UPDATE Compras SET id_proveedor = ?1, fecha = COALESCE(?2, fecha), costo_envio = ?3, total = ?4 WHERE id = ?5",
    )
    .bind(supplier_id)
    .bind(update.date.map(|d| timestamp(Some(d))))
    .bind(shipping.cents())
    .bind(total.cents())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(Some(total))
}

async fn delete_in_tx(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let lines: Vec<(i64, i64)> =
        sqlx::query_as("SELECT id_producto, cantidad FROM DetalleCompras WHERE id_compra = ?1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

    for (product_id, quantity) in lines {
        inventory::adjust(conn, product_id, -quantity).await?;
    }

    sqlx::query("DELETE FROM DetalleCompras WHERE id_compra = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM Compras WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// `(product, quantity)` of one line of this purchase.
async fn purchase_line(
    conn: &mut SqliteConnection,
    purchase_id: i64,
    line_id: i64,
) -> DbResult<Option<(i64, i64)>> {
    let line = sqlx::query_as(
        "SELECT id_producto, cantidad FROM DetalleCompras WHERE id = ?1 AND id_compra = ?2",
    )
    .bind(line_id)
    .bind(purchase_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(line)
}

async fn set_cost_price(conn: &mut SqliteConnection, product_id: i64, cost: Money) -> DbResult<()> {
    sqlx::query("UPDATE Productos SET precio_compra = ?1 WHERE id = ?2")
        .bind(cost.cents())
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use tienda_core::purchase::{PurchaseLineEdit, PurchaseLineInput};

    fn line(product_id: i64, quantity: i64, unit_price_cents: i64) -> PurchaseLineInput {
        PurchaseLineInput {
            product_id,
            quantity,
            unit_price_cents,
            iva_bps: 0,
            update_cost_price: true,
        }
    }

    async fn cost_of(db: &crate::Database, product_id: i64) -> i64 {
        db.products()
            .get_by_id(product_id)
            .await
            .unwrap()
            .unwrap()
            .cost_price_cents
    }

    #[tokio::test]
    async fn test_create_apportions_shipping_per_unit() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 1000).await;
        let yerba = product(&db, "Y", 0).await;
        let bombilla = product(&db, "B", 2).await;

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(yerba, 5, 2000), line(bombilla, 5, 100)],
                ..Default::default()
            })
            .await
            .unwrap();

        // Supplier default shipping, split over 10 units.
        assert_eq!(created.purchase.shipping_cost_cents, 1000);
        assert_eq!(created.purchase.total_cents, 10_000 + 500 + 1000);
        assert_eq!(created.purchase.supplier_name.as_deref(), Some("Norte"));
        assert_eq!(created.lines.len(), 2);

        assert_eq!(stock_of(&db, yerba).await, 5);
        assert_eq!(stock_of(&db, bombilla).await, 7);
        assert_eq!(cost_of(&db, yerba).await, 2100);
        assert_eq!(cost_of(&db, bombilla).await, 200);
    }

    #[tokio::test]
    async fn test_create_with_iva_and_explicit_shipping() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 1000).await;
        let p = product(&db, "P", 0).await;
        let untouched = product(&db, "U", 0).await;

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                shipping_cost_cents: Some(0),
                lines: vec![
                    PurchaseLineInput {
                        iva_bps: 2100,
                        ..line(p, 2, 1000)
                    },
                    PurchaseLineInput {
                        update_cost_price: false,
                        ..line(untouched, 1, 500)
                    },
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.lines[0].price_with_iva_cents, 1210);
        assert_eq!(created.lines[0].iva_bps, 2100);
        assert_eq!(created.purchase.total_cents, 2420 + 500);
        assert_eq!(cost_of(&db, p).await, 1210);
        assert_eq!(cost_of(&db, untouched).await, 0);
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_missing_product() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let p = product(&db, "P", 0).await;

        let err = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(p, 3, 100), line(999, 1, 100)],
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(stock_of(&db, p).await, 0);
        assert!(db.purchases().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_unknown_supplier() {
        let db = test_db().await;
        let p = product(&db, "P", 0).await;

        let err = db
            .purchases()
            .create(&NewPurchase {
                supplier_id: 77,
                lines: vec![line(p, 1, 100)],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_follows_quantity_changes() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let a = product(&db, "A", 0).await;
        let b = product(&db, "B", 0).await;
        let c = product(&db, "C", 0).await;

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(a, 4, 100), line(b, 2, 100)],
                ..Default::default()
            })
            .await
            .unwrap();
        let (line_a, line_b) = (created.lines[0].id, created.lines[1].id);

        let updated = db
            .purchases()
            .update(
                created.purchase.id,
                &PurchaseUpdate {
                    shipping_cost_cents: Some(600),
                    existing: vec![PurchaseLineEdit {
                        line_id: line_a,
                        quantity: 1,
                        unit_price_cents: 300,
                        iva_bps: 0,
                    }],
                    added: vec![line(c, 5, 100)],
                    removed: vec![line_b],
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stock_of(&db, a).await, 1);
        assert_eq!(stock_of(&db, b).await, 0);
        assert_eq!(stock_of(&db, c).await, 5);

        assert_eq!(updated.lines.len(), 2);
        assert_eq!(updated.purchase.shipping_cost_cents, 600);
        assert_eq!(updated.purchase.total_cents, 300 + 500 + 600);

        // 600 over the final 6 units.
        assert_eq!(cost_of(&db, c).await, 200);
    }

    #[tokio::test]
    async fn test_update_missing_purchase() {
        let db = test_db().await;
        let result = db
            .purchases()
            .update(5, &PurchaseUpdate::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_rejected() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let a = product(&db, "A", 1).await;

        let err = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(a, 3, i64::MAX / 2)],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(db.purchases().list().await.unwrap().is_empty());

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(a, 2, 100)],
                ..Default::default()
            })
            .await
            .unwrap();
        let err = db
            .purchases()
            .update(
                created.purchase.id,
                &PurchaseUpdate {
                    existing: vec![PurchaseLineEdit {
                        line_id: created.lines[0].id,
                        quantity: 2,
                        unit_price_cents: i64::MAX / 2,
                        iva_bps: 0,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(stock_of(&db, a).await, 3);
    }

    #[tokio::test]
    async fn test_update_past_line_limit_rolls_back() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let a = product(&db, "A", 0).await;

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(a, 1, 100)],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = db
            .purchases()
            .update(
                created.purchase.id,
                &PurchaseUpdate {
                    added: vec![line(a, 1, 100); tienda_core::MAX_DOCUMENT_LINES],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(stock_of(&db, a).await, 1);
        let reloaded = db.purchases().get_by_id(created.purchase.id).await.unwrap().unwrap();
        assert_eq!(reloaded.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reverses_stock() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let a = product(&db, "A", 1).await;

        let created = db
            .purchases()
            .create(&NewPurchase {
                supplier_id,
                lines: vec![line(a, 4, 100)],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stock_of(&db, a).await, 5);

        assert!(db.purchases().delete(created.purchase.id).await.unwrap());
        assert_eq!(stock_of(&db, a).await, 1);
        assert!(db.purchases().get_by_id(created.purchase.id).await.unwrap().is_none());
        assert!(!db.purchases().delete(created.purchase.id).await.unwrap());
    }
}
