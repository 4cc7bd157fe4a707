//! # Sale Repository
//!
//! The sale lifecycle: creation with stock reservation, status transitions,
//! line replacement and deletion with stock reversal.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Lifecycle                                  │
//! │                                                                         │
//! │  create ─── stock covers every line? ──┬─ yes ──► "Para embalar"       │
//! │     │                                   └─ no  ──► "Pendiente"          │
//! │     │   stock is decremented either way (may go negative)              │
//! │     ▼                                                                   │
//! │  Pendiente ⇄ Para embalar ──► Despachado ──► Completado                │
//! │          ▲                                                              │
//! │          └── entering "Para embalar" re-checks current stock           │
//! │                                                                         │
//! │  replace_lines: restore old lines, decrement new ones                  │
//! │  delete:        restore every line, remove the sale                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write runs in one transaction: a failure part-way leaves stock
//! and the sale exactly as they were.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use tienda_core::sale_status::Transition;
use tienda_core::stock::{find_shortages, StockCheck, StockDirection};
use tienda_core::validation::validate_sale_lines;
use tienda_core::{
    LineItem, ModifiedComboEntry, Money, NewSale, Sale, SaleLine, SaleStatus, SaleUpdate,
    SaleWithLines,
};

use crate::error::{DbError, DbResult};
use crate::executor::UnitOfWork;
use crate::repository::inventory::{self, MissingCombo};
use crate::repository::{clean, timestamp};

pub(crate) const SALE_SELECT: &str = r#"
    SELECT
        v.id,
        v.id_cliente AS client_id,
        c.nombre AS client_name,
        v.fecha AS date,
        v.total AS total_cents,
        v.estado AS status,
        v.cerrado AS closed,
        v.medio_comunicacion AS communication_channel,
        v.dato_comunicacion AS communication_detail,
        v.correo_usado AS email_used,
        v.pago_envio AS shipping_payment,
        v.cuenta_transferencia AS transfer_account,
        v.comprobante_pago AS payment_receipt,
        v.requiere_factura AS invoice_required,
        v.numero_factura AS invoice_number,
        v.numero_seguimiento AS tracking_number,
        v.pago_en_destino AS pay_on_delivery
    FROM Ventas v
    LEFT JOIN Clientes c ON c.id = v.id_cliente
"#;

const LINE_SELECT: &str = r#"
    SELECT
        d.id,
        d.id_venta AS sale_id,
        d.id_producto AS reference_id,
        d.cantidad AS quantity,
        d.precio AS unit_price_cents,
        d.es_combo AS is_combo,
        d.es_mayorista AS wholesale,
        d.datos_combo_modificado AS override_json,
        CASE WHEN d.es_combo = 1 THEN c.nombre ELSE p.nombre END AS name,
        CASE WHEN d.es_combo = 1 THEN c.codigo ELSE p.codigo END AS code
    FROM DetalleVentas d
    LEFT JOIN Productos p ON p.id = d.id_producto AND d.es_combo = 0
    LEFT JOIN Combos c ON c.id = d.id_producto AND d.es_combo = 1
"#;

/// Repository for the sale lifecycle.
///
/// ## Usage
/// ```rust,ignore
/// let sales = db.sales();
///
/// let sale = sales.create(&new_sale).await?;          // reserves stock
/// sales.update_status(sale.sale.id, SaleStatus::ParaEmbalar).await?;
/// sales.delete(sale.sale.id).await?;                  // gives stock back
/// ```
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Records a sale and decrements stock for every line.
    ///
    /// The sale is never refused for lack of stock: it starts in
    /// "Pendiente" when any requirement exceeds current stock, otherwise in
    /// "Para embalar". The total is the sum of the line totals.
    ///
    /// ## Errors
    /// - Validation errors (no lines, bad quantities or prices)
    /// - `NotFound` when a line references a missing product or combo
    pub async fn create(&self, sale: &NewSale) -> DbResult<SaleWithLines> {
        validate_sale_lines(&sale.lines)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("sale.create");
        let result = create_in_tx(&mut tx, sale).await;
        let (id, status) = unit.finish(tx, result).await?;

        info!(id, status = %status, lines = sale.lines.len(), "Sale created");
        self.require(id).await
    }

    /// Moves a sale to `target`.
    ///
    /// Requesting the current status is a no-op. Entering "Para embalar"
    /// re-checks every line against current stock and fails with
    /// `InsufficientStock` listing each short product.
    pub async fn update_status(&self, id: i64, target: SaleStatus) -> DbResult<SaleWithLines> {
        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("sale.update_status");
        let result = update_status_in_tx(&mut tx, id, target).await;
        let changed = unit.finish(tx, result).await?;

        if let Some(from) = changed {
            info!(id, from = %from, to = %target, "Sale status changed");
        } else {
            debug!(id, status = %target, "Sale already in requested status");
        }
        self.require(id).await
    }

    /// Updates header fields (client, date, fulfillment). `None` leaves a
    /// field unchanged. Status and total are not editable here.
    pub async fn update(&self, id: i64, update: &SaleUpdate) -> DbResult<SaleWithLines> {
        let result = sqlx::query(
            r#"
            UPDATE Ventas SET
                id_cliente           = COALESCE(?2, id_cliente),
                fecha                = COALESCE(?3, fecha),
                medio_comunicacion   = COALESCE(?4, medio_comunicacion),
                dato_comunicacion    = COALESCE(?5, dato_comunicacion),
                correo_usado         = COALESCE(?6, correo_usado),
                pago_envio           = COALESCE(?7, pago_envio),
                cuenta_transferencia = COALESCE(?8, cuenta_transferencia),
                comprobante_pago     = COALESCE(?9, comprobante_pago),
                requiere_factura     = COALESCE(?10, requiere_factura),
                numero_factura       = COALESCE(?11, numero_factura),
                numero_seguimiento   = COALESCE(?12, numero_seguimiento),
                pago_en_destino      = COALESCE(?13, pago_en_destino)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.client_id)
        .bind(update.date.map(|d| timestamp(Some(d))))
        .bind(clean(&update.communication_channel))
        .bind(clean(&update.communication_detail))
        .bind(clean(&update.email_used))
        .bind(clean(&update.shipping_payment))
        .bind(clean(&update.transfer_account))
        .bind(clean(&update.payment_receipt))
        .bind(update.invoice_required)
        .bind(clean(&update.invoice_number))
        .bind(clean(&update.tracking_number))
        .bind(update.pay_on_delivery)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", id));
        }

        debug!(id, "Sale header updated");
        self.require(id).await
    }

    /// Replaces every line of a sale.
    ///
    /// Stock for the old lines is restored, the new lines are decremented
    /// and the total recomputed. The status is left as it is.
    pub async fn replace_lines(&self, id: i64, lines: &[LineItem]) -> DbResult<SaleWithLines> {
        validate_sale_lines(lines)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("sale.replace_lines");
        let result = replace_lines_in_tx(&mut tx, id, lines).await;
        let total = unit.finish(tx, result).await?;

        info!(id, total = %total, lines = lines.len(), "Sale lines replaced");
        self.require(id).await
    }

    /// Deletes a sale, restoring the stock its lines took.
    ///
    /// Returns false if the sale did not exist.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("sale.delete");
        let result = delete_in_tx(&mut tx, id).await;
        let deleted = unit.finish(tx, result).await?;

        if deleted {
            info!(id, "Sale deleted, stock restored");
        }
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Dry run of the stock check `create` performs.
    pub async fn check_stock(&self, lines: &[LineItem]) -> DbResult<StockCheck> {
        validate_sale_lines(lines)?;

        let mut conn = self.pool.acquire().await?;
        let needed = inventory::expand_lines(&mut conn, lines, MissingCombo::Reject).await?;
        let snapshot = inventory::load_stock(&mut conn, &needed).await?;
        inventory::ensure_products_exist(&needed, &snapshot)?;

        Ok(find_shortages(&needed, &snapshot))
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<SaleWithLines>> {
        let mut conn = self.pool.acquire().await?;
        let Some(sale) = fetch_sale(&mut conn, id).await? else {
            return Ok(None);
        };
        let lines = fetch_lines(&mut conn, id).await?;
        Ok(Some(SaleWithLines { sale, lines }))
    }

    /// All sales, newest first.
    pub async fn list(&self) -> DbResult<Vec<Sale>> {
        let sql = format!("{SALE_SELECT} ORDER BY v.fecha DESC, v.id DESC");
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    pub async fn list_by_status(&self, status: SaleStatus) -> DbResult<Vec<Sale>> {
        let sql = format!("{SALE_SELECT} WHERE v.estado = ?1 ORDER BY v.fecha DESC, v.id DESC");
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    /// The `limit` most recent sales.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<Sale>> {
        let sql = format!("{SALE_SELECT} ORDER BY v.fecha DESC, v.id DESC LIMIT ?1");
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    /// Sales not yet dispatched ("Pendiente" or "Para embalar").
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM Ventas WHERE estado IN ('Pendiente', 'Para embalar')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// The product list of a modified-combo line, with product names.
    ///
    /// Empty for any other kind of line.
    pub async fn modified_combo_items(&self, line_id: i64) -> DbResult<Vec<ModifiedComboEntry>> {
        let sql = format!("{LINE_SELECT} WHERE d.id = ?1");
        let mut conn = self.pool.acquire().await?;
        let line = sqlx::query_as::<_, SaleLine>(&sql)
            .bind(line_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("SaleLine", line_id))?;

        let item = line.item()?;
        let Some(items) = item.override_items() else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(items.len());
        for entry in items {
            let product: Option<(String, String)> =
                sqlx::query_as("SELECT nombre, codigo FROM Productos WHERE id = ?1")
                    .bind(entry.product_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let (name, code) = product.unzip();
            entries.push(ModifiedComboEntry {
                product_id: entry.product_id,
                quantity: entry.quantity,
                name,
                code,
            });
        }
        Ok(entries)
    }

    async fn require(&self, id: i64) -> DbResult<SaleWithLines> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }
}

// =============================================================================
// Transaction Bodies
// =============================================================================

async fn create_in_tx(conn: &mut SqliteConnection, sale: &NewSale) -> DbResult<(i64, SaleStatus)> {
    let needed = inventory::expand_lines(conn, &sale.lines, MissingCombo::Reject).await?;
    let snapshot = inventory::load_stock(conn, &needed).await?;
    inventory::ensure_products_exist(&needed, &snapshot)?;

    let check = find_shortages(&needed, &snapshot);
    let status = SaleStatus::initial(check.is_sufficient());
    if !check.is_sufficient() {
        warn!(
            short = check.shortages.len(),
            "Sale taken without enough stock, starting as Pendiente"
        );
    }

    let total: Money = sale.lines.iter().map(LineItem::line_total).sum();
    let f = &sale.fulfillment;

    let id = sqlx::query(
        r#"
        INSERT INTO Ventas (
            id_cliente, fecha, total, estado, cerrado,
            medio_comunicacion, dato_comunicacion, correo_usado, pago_envio,
            cuenta_transferencia, comprobante_pago, requiere_factura,
            numero_factura, numero_seguimiento, pago_en_destino
        ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(sale.client_id)
    .bind(timestamp(sale.date))
    .bind(total.cents())
    .bind(status)
    .bind(clean(&f.communication_channel))
    .bind(clean(&f.communication_detail))
    .bind(clean(&f.email_used))
    .bind(clean(&f.shipping_payment))
    .bind(clean(&f.transfer_account))
    .bind(clean(&f.payment_receipt))
    .bind(f.invoice_required)
    .bind(clean(&f.invoice_number))
    .bind(clean(&f.tracking_number))
    .bind(f.pay_on_delivery)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    insert_lines(conn, id, &sale.lines).await?;
    inventory::apply(conn, &needed, StockDirection::Consume).await?;

    Ok((id, status))
}

/// Returns the previous status when it changed.
async fn update_status_in_tx(
    conn: &mut SqliteConnection,
    id: i64,
    target: SaleStatus,
) -> DbResult<Option<SaleStatus>> {
    let current: SaleStatus = sqlx::query_scalar("SELECT estado FROM Ventas WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", id))?;

    let verify_stock = match current.transition_to(target)? {
        Transition::Unchanged => return Ok(None),
        Transition::Apply { verify_stock } => verify_stock,
    };

    if verify_stock {
        let items = stored_items(conn, id).await?;
        let needed = inventory::expand_lines(conn, &items, MissingCombo::Ignore).await?;
        let check = inventory::check(conn, &needed).await?;
        if !check.is_sufficient() {
            warn!(
                id,
                short = check.shortages.len(),
                "Status change blocked by insufficient stock"
            );
        }
        check.into_result()?;
    }

    sqlx::query("UPDATE Ventas SET estado = ?1 WHERE id = ?2")
        .bind(target)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(Some(current))
}

async fn replace_lines_in_tx(
    conn: &mut SqliteConnection,
    id: i64,
    lines: &[LineItem],
) -> DbResult<Money> {
    if !sale_exists(conn, id).await? {
        return Err(DbError::not_found("Sale", id));
    }

    restore_lines(conn, id).await?;
    sqlx::query("DELETE FROM DetalleVentas WHERE id_venta = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let needed = inventory::expand_lines(conn, lines, MissingCombo::Reject).await?;
    let snapshot = inventory::load_stock(conn, &needed).await?;
    inventory::ensure_products_exist(&needed, &snapshot)?;

    insert_lines(conn, id, lines).await?;
    inventory::apply(conn, &needed, StockDirection::Consume).await?;

    let total: Money = lines.iter().map(LineItem::line_total).sum();
    sqlx::query("UPDATE Ventas SET total = ?1 WHERE id = ?2")
        .bind(total.cents())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(total)
}

async fn delete_in_tx(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    if !sale_exists(conn, id).await? {
        return Ok(false);
    }

    restore_lines(conn, id).await?;

    sqlx::query("DELETE FROM DetalleVentas WHERE id_venta = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM Ventas WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

// =============================================================================
// Helpers
// =============================================================================

async fn sale_exists(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM Ventas WHERE id = ?1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

async fn fetch_sale(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Sale>> {
    let sql = format!("{SALE_SELECT} WHERE v.id = ?1");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

async fn fetch_lines(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleLine>> {
    let sql = format!("{LINE_SELECT} WHERE d.id_venta = ?1 ORDER BY d.id");
    let lines = sqlx::query_as::<_, SaleLine>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(lines)
}

/// The stored lines of a sale as line items.
async fn stored_items(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<LineItem>> {
    fetch_lines(conn, sale_id)
        .await?
        .iter()
        .map(|line| line.item().map_err(DbError::from))
        .collect()
}

/// Gives back the stock a sale's stored lines took. Modified combos give
/// back their own items, not the current recipe.
async fn restore_lines(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<()> {
    let items = stored_items(conn, sale_id).await?;
    let needed = inventory::expand_lines(conn, &items, MissingCombo::Ignore).await?;
    inventory::apply(conn, &needed, StockDirection::Restore).await
}

async fn insert_lines(conn: &mut SqliteConnection, sale_id: i64, lines: &[LineItem]) -> DbResult<()> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO DetalleVentas (
                id_venta, id_producto, cantidad, precio, es_combo, es_mayorista, datos_combo_modificado
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(sale_id)
        .bind(line.reference_id())
        .bind(line.quantity())
        .bind(line.unit_price().cents())
        .bind(line.is_combo())
        .bind(line.is_wholesale())
        .bind(line.override_json()?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use tienda_core::{ComboItem, CoreError, SaleFulfillment, SaleLineRequest};

    fn product_line(product_id: i64, quantity: i64) -> LineItem {
        LineItem::Product {
            product_id,
            quantity,
            unit_price: Money::from_cents(1000),
            wholesale: false,
        }
    }

    fn combo_line(combo_id: i64, quantity: i64) -> LineItem {
        LineItem::Combo {
            combo_id,
            quantity,
            unit_price: Money::from_cents(5000),
        }
    }

    fn sale_of(lines: Vec<LineItem>) -> NewSale {
        NewSale {
            lines,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_stock_goes_to_para_embalar() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;

        let sale = db.sales().create(&sale_of(vec![product_line(a, 3)])).await.unwrap();

        assert_eq!(sale.sale.status, SaleStatus::ParaEmbalar);
        assert_eq!(sale.sale.total_cents, 3000);
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.lines[0].name.as_deref(), Some("Producto A"));
        assert_eq!(stock_of(&db, a).await, 7);
    }

    #[tokio::test]
    async fn test_create_without_stock_is_pendiente_and_oversells() {
        let db = test_db().await;
        let a = product(&db, "A", 2).await;

        let sale = db.sales().create(&sale_of(vec![product_line(a, 5)])).await.unwrap();

        assert_eq!(sale.sale.status, SaleStatus::Pendiente);
        assert_eq!(stock_of(&db, a).await, -3);
    }

    #[tokio::test]
    async fn test_shortage_checked_per_line() {
        let db = test_db().await;
        let a = product(&db, "A", 5).await;

        // Each line alone fits in 5, together they do not.
        let sale = db
            .sales()
            .create(&sale_of(vec![product_line(a, 3), product_line(a, 3)]))
            .await
            .unwrap();

        assert_eq!(sale.sale.status, SaleStatus::ParaEmbalar);
        assert_eq!(stock_of(&db, a).await, -1);
    }

    #[tokio::test]
    async fn test_combo_line_consumes_recipe() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let b = product(&db, "B", 10).await;
        let c = combo(&db, "C", &[(a, 2), (b, 1)]).await;

        let sale = db.sales().create(&sale_of(vec![combo_line(c, 3)])).await.unwrap();

        assert_eq!(sale.lines[0].name.as_deref(), Some("Combo C"));
        assert!(sale.lines[0].is_combo);
        assert_eq!(stock_of(&db, a).await, 4);
        assert_eq!(stock_of(&db, b).await, 7);
    }

    #[tokio::test]
    async fn test_modified_combo_round_trip_restores_override_items() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let b = product(&db, "B", 10).await;
        let c = combo(&db, "C", &[(a, 1)]).await;

        let sale = db
            .sales()
            .create(&sale_of(vec![LineItem::ModifiedCombo {
                combo_id: c,
                quantity: 2,
                unit_price: Money::from_cents(4000),
                items: vec![ComboItem::new(b, 3)],
            }]))
            .await
            .unwrap();

        // The override replaces the recipe entirely.
        assert_eq!(stock_of(&db, a).await, 10);
        assert_eq!(stock_of(&db, b).await, 4);

        let entries = db
            .sales()
            .modified_combo_items(sale.lines[0].id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product_id, b);
        assert_eq!(entries[0].code.as_deref(), Some("B"));

        // Deleting gives back exactly what was taken.
        assert!(db.sales().delete(sale.sale.id).await.unwrap());
        assert_eq!(stock_of(&db, a).await, 10);
        assert_eq!(stock_of(&db, b).await, 10);
    }

    #[tokio::test]
    async fn test_create_with_missing_product_changes_nothing() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;

        let err = db
            .sales()
            .create(&sale_of(vec![product_line(a, 1), product_line(999, 1)]))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(stock_of(&db, a).await, 10);
        assert!(db.sales().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_sale() {
        let db = test_db().await;
        let err = db.sales().create(&NewSale::default()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_para_embalar_recheck_blocks_until_restocked() {
        let db = test_db().await;
        let a = product(&db, "A", 2).await;
        let sale = db.sales().create(&sale_of(vec![product_line(a, 5)])).await.unwrap();
        let id = sale.sale.id;
        assert_eq!(stock_of(&db, a).await, -3);

        let err = db
            .sales()
            .update_status(id, SaleStatus::ParaEmbalar)
            .await
            .unwrap_err();
        let shortages = err.shortages().expect("stock error");
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].available, -3);
        assert_eq!(shortages[0].required, 5);
        assert!(err.to_string().contains("Producto A (Code: A"));

        // Still pending, stock untouched by the failed attempt.
        let reloaded = db.sales().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded.sale.status, SaleStatus::Pendiente);
        assert_eq!(stock_of(&db, a).await, -3);

        // The check compares against stock left after this sale's own
        // decrement, so it needs the full quantity again.
        db.products().adjust_stock(a, 8).await.unwrap();
        let moved = db
            .sales()
            .update_status(id, SaleStatus::ParaEmbalar)
            .await
            .unwrap();
        assert_eq!(moved.sale.status, SaleStatus::ParaEmbalar);
        assert_eq!(stock_of(&db, a).await, 5);
    }

    #[tokio::test]
    async fn test_recheck_names_the_combo() {
        let db = test_db().await;
        let a = product(&db, "A", 0).await;
        let c = combo(&db, "KIT", &[(a, 2)]).await;
        let sale = db.sales().create(&sale_of(vec![combo_line(c, 1)])).await.unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Pendiente);

        let err = db
            .sales()
            .update_status(sale.sale.id, SaleStatus::ParaEmbalar)
            .await
            .unwrap_err();
        let shortages = err.shortages().unwrap();
        assert_eq!(shortages[0].combo_name.as_deref(), Some("Combo KIT"));
        assert!(err.to_string().contains("from combo \"Combo KIT\""));
    }

    #[tokio::test]
    async fn test_full_status_flow() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let id = db
            .sales()
            .create(&sale_of(vec![product_line(a, 1)]))
            .await
            .unwrap()
            .sale
            .id;

        let sales = db.sales();
        assert_eq!(
            sales.update_status(id, SaleStatus::Pendiente).await.unwrap().sale.status,
            SaleStatus::Pendiente
        );
        sales.update_status(id, SaleStatus::ParaEmbalar).await.unwrap();
        sales.update_status(id, SaleStatus::Despachado).await.unwrap();

        // Same status again is accepted and changes nothing.
        sales.update_status(id, SaleStatus::Despachado).await.unwrap();

        let err = sales.update_status(id, SaleStatus::Pendiente).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidTransition {
                from: SaleStatus::Despachado,
                to: SaleStatus::Pendiente
            })
        ));

        let done = sales.update_status(id, SaleStatus::Completado).await.unwrap();
        assert_eq!(done.sale.status, SaleStatus::Completado);
        assert_eq!(stock_of(&db, a).await, 9);
    }

    #[tokio::test]
    async fn test_update_status_missing_sale() {
        let db = test_db().await;
        let err = db
            .sales()
            .update_status(42, SaleStatus::Despachado)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replace_lines_moves_stock_and_total() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let b = product(&db, "B", 10).await;
        let sale = db.sales().create(&sale_of(vec![product_line(a, 4)])).await.unwrap();
        assert_eq!(stock_of(&db, a).await, 6);

        let replaced = db
            .sales()
            .replace_lines(sale.sale.id, &[product_line(a, 1), product_line(b, 2)])
            .await
            .unwrap();

        assert_eq!(stock_of(&db, a).await, 9);
        assert_eq!(stock_of(&db, b).await, 8);
        assert_eq!(replaced.lines.len(), 2);
        assert_eq!(replaced.sale.total_cents, 3000);
        assert_eq!(replaced.sale.status, SaleStatus::ParaEmbalar);
    }

    #[tokio::test]
    async fn test_create_then_delete_returns_stock() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;

        let sale = db.sales().create(&sale_of(vec![product_line(a, 3)])).await.unwrap();
        assert_eq!(stock_of(&db, a).await, 7);

        assert!(db.sales().delete(sale.sale.id).await.unwrap());
        assert_eq!(stock_of(&db, a).await, 10);
    }

    #[tokio::test]
    async fn test_replace_lines_uses_modified_combo_override() {
        let db = test_db().await;
        let bill = product(&db, "A", 20).await;
        let swapped = product(&db, "B", 20).await;
        let c = combo(&db, "C", &[(bill, 5)]).await;
        let sale = db.sales().create(&sale_of(vec![product_line(bill, 1)])).await.unwrap();
        assert_eq!(stock_of(&db, bill).await, 19);

        db.sales()
            .replace_lines(
                sale.sale.id,
                &[LineItem::ModifiedCombo {
                    combo_id: c,
                    quantity: 3,
                    unit_price: Money::from_cents(4000),
                    items: vec![ComboItem::new(swapped, 2)],
                }],
            )
            .await
            .unwrap();

        // 2 per combo from the override, nothing from the combo's own bill.
        assert_eq!(stock_of(&db, swapped).await, 14);
        assert_eq!(stock_of(&db, bill).await, 20);
    }

    #[tokio::test]
    async fn test_edit_keeps_stored_modified_combo() {
        let db = test_db().await;
        let bill = product(&db, "A", 20).await;
        let swapped = product(&db, "B", 20).await;
        let c = combo(&db, "C", &[(bill, 5)]).await;

        let sale = db
            .sales()
            .create(&sale_of(vec![LineItem::ModifiedCombo {
                combo_id: c,
                quantity: 2,
                unit_price: Money::from_cents(4000),
                items: vec![ComboItem::new(swapped, 2)],
            }]))
            .await
            .unwrap();
        assert_eq!(stock_of(&db, swapped).await, 16);

        // The edit form posts the stored override string back untouched.
        let stored = &sale.lines[0];
        let edited = LineItem::try_from(SaleLineRequest {
            id_producto: stored.reference_id,
            cantidad: 3,
            precio: stored.unit_price_cents,
            es_combo: stored.is_combo,
            es_mayorista: stored.wholesale,
            combo_modificado: false,
            items: None,
            datos_combo_modificado: stored.override_json.clone(),
        })
        .unwrap();

        let replaced = db.sales().replace_lines(sale.sale.id, &[edited]).await.unwrap();

        assert_eq!(stock_of(&db, swapped).await, 14);
        assert_eq!(stock_of(&db, bill).await, 20);
        assert_eq!(replaced.lines[0].quantity, 3);
        assert_eq!(replaced.lines[0].override_json, stored.override_json);
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_rejected() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;

        let err = db
            .sales()
            .create(&sale_of(vec![LineItem::Product {
                product_id: a,
                quantity: 3,
                unit_price: Money::from_cents(i64::MAX / 2),
                wholesale: false,
            }]))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(stock_of(&db, a).await, 10);
        assert!(db.sales().list().await.unwrap().is_empty());

        let too_many = vec![product_line(a, 1); tienda_core::MAX_DOCUMENT_LINES + 1];
        assert!(db.sales().create(&sale_of(too_many)).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_replace_lines_failure_restores_everything() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let sale = db.sales().create(&sale_of(vec![product_line(a, 4)])).await.unwrap();

        let err = db
            .sales()
            .replace_lines(sale.sale.id, &[combo_line(999, 1)])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let reloaded = db.sales().get_by_id(sale.sale.id).await.unwrap().unwrap();
        assert_eq!(reloaded.lines.len(), 1);
        assert_eq!(reloaded.lines[0].quantity, 4);
        assert_eq!(stock_of(&db, a).await, 6);
    }

    #[tokio::test]
    async fn test_delete_restores_combo_recipe() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let c = combo(&db, "C", &[(a, 3)]).await;
        let sale = db.sales().create(&sale_of(vec![combo_line(c, 2)])).await.unwrap();
        assert_eq!(stock_of(&db, a).await, 4);

        assert!(db.sales().delete(sale.sale.id).await.unwrap());
        assert_eq!(stock_of(&db, a).await, 10);
        assert!(db.sales().get_by_id(sale.sale.id).await.unwrap().is_none());
        assert!(!db.sales().delete(sale.sale.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_header_update_keeps_lines_and_status() {
        let db = test_db().await;
        let a = product(&db, "A", 10).await;
        let sale = db
            .sales()
            .create(&NewSale {
                lines: vec![product_line(a, 1)],
                fulfillment: SaleFulfillment {
                    communication_channel: Some("WhatsApp".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = db
            .sales()
            .update(
                sale.sale.id,
                &SaleUpdate {
                    tracking_number: Some("AR123".to_string()),
                    invoice_required: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let f = &updated.sale.fulfillment;
        assert_eq!(f.tracking_number.as_deref(), Some("AR123"));
        assert_eq!(f.communication_channel.as_deref(), Some("WhatsApp"));
        assert!(f.invoice_required);
        assert!(!f.pay_on_delivery);
        assert_eq!(updated.sale.status, sale.sale.status);
        assert_eq!(updated.lines.len(), 1);

        let err = db.sales().update(999, &SaleUpdate::default()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_check_stock_is_read_only() {
        let db = test_db().await;
        let a = product(&db, "A", 1).await;

        let check = db.sales().check_stock(&[product_line(a, 2)]).await.unwrap();
        assert!(!check.is_sufficient());
        assert_eq!(stock_of(&db, a).await, 1);
    }

    #[tokio::test]
    async fn test_listings() {
        let db = test_db().await;
        let a = product(&db, "A", 1).await;

        db.sales().create(&sale_of(vec![product_line(a, 1)])).await.unwrap();
        db.sales().create(&sale_of(vec![product_line(a, 1)])).await.unwrap();

        let sales = db.sales();
        assert_eq!(sales.list().await.unwrap().len(), 2);
        assert_eq!(sales.list_by_status(SaleStatus::Pendiente).await.unwrap().len(), 1);
        assert_eq!(sales.list_by_status(SaleStatus::ParaEmbalar).await.unwrap().len(), 1);
        assert_eq!(sales.recent(1).await.unwrap().len(), 1);
        assert_eq!(sales.count_pending().await.unwrap(), 2);
    }
}
