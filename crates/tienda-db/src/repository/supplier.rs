//! # Supplier Repository

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use tienda_core::validation::{validate_name, validate_price_cents};
use tienda_core::{NewSupplier, Supplier, SupplierUpdate};

use crate::error::{DbError, DbResult};
use crate::executor::UnitOfWork;
use crate::repository::clean;

const SUPPLIER_SELECT: &str = r#"
    SELECT
        id,
        nombre AS name,
        telefono AS phone,
        email,
        direccion AS address,
        envio AS shipping_cost_cents
    FROM Proveedor
"#;

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Supplier>> {
        let sql = format!("{SUPPLIER_SELECT} ORDER BY nombre, id");
        let suppliers = sqlx::query_as::<_, Supplier>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(suppliers)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Supplier>> {
        let sql = format!("{SUPPLIER_SELECT} WHERE id = ?1");
        let supplier = sqlx::query_as::<_, Supplier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(supplier)
    }

    pub async fn insert(&self, supplier: &NewSupplier) -> DbResult<Supplier> {
        validate_new_supplier(supplier)?;

        let mut conn = self.pool.acquire().await?;
        let id = insert_row(&mut conn, supplier).await?;
        drop(conn);
        info!(id, "Supplier created");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    /// Inserts every supplier in one transaction.
    pub async fn import(&self, suppliers: &[NewSupplier]) -> DbResult<usize> {
        suppliers.iter().try_for_each(validate_new_supplier)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("supplier.import");
        let mut result: DbResult<usize> = Ok(0);
        for supplier in suppliers {
            if let Err(err) = insert_row(&mut tx, supplier).await {
                result = Err(err);
                break;
            }
            result = result.map(|n| n + 1);
        }
        let imported = unit.finish(tx, result).await?;

        info!(imported, "Suppliers imported");
        Ok(imported)
    }

    pub async fn update(&self, id: i64, update: &SupplierUpdate) -> DbResult<Supplier> {
        if let Some(name) = &update.name {
            validate_name("name", name)?;
        }
        if let Some(cents) = update.shipping_cost_cents {
            validate_price_cents("shipping_cost", cents)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE Proveedor SET
                nombre    = COALESCE(?2, nombre),
                telefono  = COALESCE(?3, telefono),
                email     = COALESCE(?4, email),
                direccion = COALESCE(?5, direccion),
                envio     = COALESCE(?6, envio)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(clean(&update.phone))
        .bind(clean(&update.email))
        .bind(clean(&update.address))
        .bind(update.shipping_cost_cents)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Supplier", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    /// Deletes a supplier. Its products are kept without a supplier;
    /// suppliers with purchases cannot be deleted.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM Proveedor WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(id, "Supplier deleted");
        }
        Ok(deleted)
    }
}

fn validate_new_supplier(supplier: &NewSupplier) -> DbResult<()> {
    validate_name("name", &supplier.name)?;
    validate_price_cents("shipping_cost", supplier.shipping_cost_cents)?;
    Ok(())
}

async fn insert_row(conn: &mut SqliteConnection, supplier: &NewSupplier) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO Proveedor (nombre, telefono, email, direccion, envio) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(supplier.name.trim())
    .bind(clean(&supplier.phone))
    .bind(clean(&supplier.email))
    .bind(clean(&supplier.address))
    .bind(supplier.shipping_cost_cents)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}
