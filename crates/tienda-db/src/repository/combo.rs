//! # Combo Repository
//!
//! Combos are sellable bundles of products. Their bill of materials lives in
//! `DetalleCombos`; a combo's codes share the product code namespace.
//!
//! ## Availability
//! ```text
//! Combo "Kit mate" = 1 × Mate (stock 7) + 2 × Yerba (stock 9)
//!
//!   Mate:  7 / 1 = 7
//!   Yerba: 9 / 2 = 4   ← limiting component
//!                 ───
//!   available     = 4
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tienda_core::stock::combo_availability;
use tienda_core::validation::{validate_code, validate_combo_items, validate_name, validate_price_cents};
use tienda_core::{
    Combo, ComboComponent, ComboItem, ComboUpdate, ComboWithComponents, NewCombo, ValidationError,
};

use crate::error::{DbError, DbResult};
use crate::executor::UnitOfWork;
use crate::repository::{clean, code_taken};

const COMBO_SELECT: &str = r#"
    SELECT
        id,
        nombre AS name,
        descripcion AS description,
        precio_venta AS price_cents,
        codigo AS code
    FROM Combos
"#;

#[derive(Debug, Clone)]
pub struct ComboRepository {
    pool: SqlitePool,
}

impl ComboRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ComboRepository { pool }
    }

    /// Every combo with its components and current availability.
    pub async fn list(&self) -> DbResult<Vec<ComboWithComponents>> {
        let sql = format!("{COMBO_SELECT} ORDER BY nombre, id");
        let combos = sqlx::query_as::<_, Combo>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        let mut result = Vec::with_capacity(combos.len());
        for combo in combos {
            result.push(with_components(&mut conn, combo).await?);
        }
        Ok(result)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<ComboWithComponents>> {
        let sql = format!("{COMBO_SELECT} WHERE id = ?1");
        let mut conn = self.pool.acquire().await?;
        let combo = sqlx::query_as::<_, Combo>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match combo {
            Some(combo) => Ok(Some(with_components(&mut conn, combo).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<ComboWithComponents>> {
        let sql = format!("{COMBO_SELECT} WHERE codigo = ?1");
        let mut conn = self.pool.acquire().await?;
        let combo = sqlx::query_as::<_, Combo>(&sql)
            .bind(code.trim())
            .fetch_optional(&mut *conn)
            .await?;

        match combo {
            Some(combo) => Ok(Some(with_components(&mut conn, combo).await?)),
            None => Ok(None),
        }
    }

    /// How many whole combos current stock can build, or `None` if the
    /// combo does not exist.
    pub async fn availability(&self, id: i64) -> DbResult<Option<i64>> {
        Ok(self.get_by_id(id).await?.map(|c| c.available))
    }

    /// Creates a combo and its bill of materials in one transaction.
    ///
    /// ## Errors
    /// - Validation errors (blank name/code, no components, bad quantities)
    /// - `UniqueViolation` when the code is used by a product or combo
    /// - `NotFound` when a component product does not exist
    pub async fn insert(&self, combo: &NewCombo) -> DbResult<ComboWithComponents> {
        validate_name("name", &combo.name)?;
        validate_code(&combo.code)?;
        validate_price_cents("price", combo.price_cents)?;
        validate_combo_items("components", &combo.components)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("combo.insert");
        let result = insert_in_tx(&mut tx, combo).await;
        let id = unit.finish(tx, result).await?;

        info!(id, code = %combo.code.trim(), "Combo created");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Combo", id))
    }

    /// Partial update. When `components` is given, the bill of materials is
    /// replaced as a whole.
    pub async fn update(&self, id: i64, update: &ComboUpdate) -> DbResult<ComboWithComponents> {
        if let Some(name) = &update.name {
            validate_name("name", name)?;
        }
        if let Some(code) = &update.code {
            validate_code(code)?;
        }
        if let Some(cents) = update.price_cents {
            validate_price_cents("price", cents)?;
        }
        if let Some(components) = &update.components {
            validate_combo_items("components", components)?;
        }

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("combo.update");
        let result = update_in_tx(&mut tx, id, update).await;
        unit.finish(tx, result).await?;

        debug!(id, "Combo updated");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Combo", id))
    }

    /// Deletes a combo and its bill of materials. Sales that sold it keep
    /// their lines.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM Combos WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(id, "Combo deleted");
        }
        Ok(deleted)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn with_components(
    conn: &mut SqliteConnection,
    combo: Combo,
) -> DbResult<ComboWithComponents> {
    let components = sqlx::query_as::<_, ComboComponent>(
        r#"
        SELECT
            dc.id_producto AS product_id,
            dc.cantidad AS quantity,
            p.nombre AS product_name,
            p.codigo AS product_code,
            p.precio AS product_price_cents,
            p.stock AS product_stock
        FROM DetalleCombos dc
        JOIN Productos p ON p.id = dc.id_producto
        WHERE dc.id_combo = ?1
        ORDER BY dc.id
        "#,
    )
    .bind(combo.id)
    .fetch_all(&mut *conn)
    .await?;

    let per_component: Vec<(i64, i64)> = components
        .iter()
        .map(|c| (c.quantity, c.product_stock))
        .collect();

    Ok(ComboWithComponents {
        available: combo_availability(&per_component),
        combo,
        components,
    })
}

async fn insert_in_tx(conn: &mut SqliteConnection, combo: &NewCombo) -> DbResult<i64> {
    let code = combo.code.trim();
    if code_taken(conn, code, None, None).await? {
        return Err(ValidationError::duplicate("code", code).into());
    }

    let id = sqlx::query(
        "INSERT INTO Combos (nombre, descripcion, precio_venta, codigo) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(combo.name.trim())
    .bind(clean(&combo.description))
    .bind(combo.price_cents)
    .bind(code)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    insert_components(conn, id, &combo.components).await?;
    Ok(id)
}

async fn update_in_tx(conn: &mut SqliteConnection, id: i64, update: &ComboUpdate) -> DbResult<()> {
    if let Some(code) = &update.code {
        if code_taken(conn, code, None, Some(id)).await? {
            return Err(ValidationError::duplicate("code", code.trim()).into());
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE Combos SET
            nombre       = COALESCE(?2, nombre),
            descripcion  = COALESCE(?3, descripcion),
            precio_venta = COALESCE(?4, precio_venta),
            codigo       = COALESCE(?5, codigo)
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(update.name.as_deref().map(str::trim))
    .bind(clean(&update.description))
    .bind(update.price_cents)
    .bind(update.code.as_deref().map(str::trim))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Combo", id));
    }

    if let Some(components) = &update.components {
        sqlx::query("DELETE FROM DetalleCombos WHERE id_combo = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        insert_components(conn, id, components).await?;
    }

    Ok(())
}

async fn insert_components(
    conn: &mut SqliteConnection,
    combo_id: i64,
    components: &[ComboItem],
) -> DbResult<()> {
    for item in components {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM Productos WHERE id = ?1)")
            .bind(item.product_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(DbError::not_found("Product", item.product_id));
        }

        sqlx::query("INSERT INTO DetalleCombos (id_combo, id_producto, cantidad) VALUES (?1, ?2, ?3)")
            .bind(combo_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
