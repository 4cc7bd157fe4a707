//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - CRUD with code uniqueness across products *and* combos
//! - Search by name, description, code or supplier code
//! - Stock adjustments and low-stock reports
//! - Unique code generation
//!
//! ## Code Uniqueness
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Scanner reads "779123456789"                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Productos.codigo ∪ Combos.codigo  → at most one match                │
//! │                                                                         │
//! │  insert / update: reject codes already used by any other row           │
//! │  generate_unique_code: up to 5 random 12-digit candidates              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use tienda_core::validation::{
    random_code, validate_code, validate_name, validate_price_cents, validate_search_query,
};
use tienda_core::{
    CoreError, LowStockFilter, NewProduct, Product, ProductUpdate, ValidationError,
    MAX_CODE_ATTEMPTS,
};

use crate::error::{DbError, DbResult};
use crate::executor::UnitOfWork;
use crate::repository::{clean, code_taken, like_pattern};

const PRODUCT_SELECT: &str = r#"
    SELECT
        p.id,
        p.nombre AS name,
        p.descripcion AS description,
        p.precio AS price_cents,
        p.precio_compra AS cost_price_cents,
        p.precio_mayorista AS wholesale_price_cents,
        p.codigo AS code,
        p.codigo_proveedor AS supplier_code,
        p.stock,
        p.id_proveedor AS supplier_id,
        pr.nombre AS supplier_name
    FROM Productos p
    LEFT JOIN Proveedor pr ON pr.id = p.id_proveedor
"#;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.search("yerba", 20).await?;
/// let product = repo.get_by_code("779123456789").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// All products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let sql = format!("{PRODUCT_SELECT} ORDER BY p.nombre, p.id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Gets a product by its (scanned) code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.codigo = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Searches by name or description (substring, case-insensitive) and by
    /// exact code or supplier code.
    ///
    /// An empty query lists the first `limit` products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        let sql = format!(
            "{PRODUCT_SELECT}
             WHERE ?1 = ''
                OR p.nombre LIKE ?2 ESCAPE '\\'
                OR p.descripcion LIKE ?2 ESCAPE '\\'
                OR p.codigo = ?1
                OR p.codigo_proveedor = ?1
             ORDER BY p.nombre, p.id
             LIMIT ?3"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(&query)
            .bind(like_pattern(&query))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Errors
    /// - Validation errors for blank name/code or negative prices
    /// - `UniqueViolation` when the code is used by a product or combo
    pub async fn insert(&self, product: &NewProduct) -> DbResult<Product> {
        validate_new_product(product)?;

        let mut conn = self.pool.acquire().await?;
        let id = insert_row(&mut conn, product).await?;
        drop(conn);

        info!(id, code = %product.code.trim(), "Product created");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Inserts every product in one transaction; one bad row imports none.
    pub async fn import(&self, products: &[NewProduct]) -> DbResult<usize> {
        products.iter().try_for_each(validate_new_product)?;

        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("product.import");
        let mut result: DbResult<usize> = Ok(0);
        for product in products {
            if let Err(err) = insert_row(&mut tx, product).await {
                result = Err(err);
                break;
            }
            result = result.map(|n| n + 1);
        }
        let imported = unit.finish(tx, result).await?;

        info!(imported, "Products imported");
        Ok(imported)
    }

    /// Links products to suppliers by product code and supplier name
    /// (case-insensitive). Rows naming an unknown supplier or product are
    /// reported and skipped.
    pub async fn assign_suppliers(
        &self,
        assignments: &[(String, String)],
    ) -> DbResult<SupplierAssignment> {
        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("product.assign_suppliers");
        let result = assign_suppliers_in_tx(&mut tx, assignments).await;
        let report = unit.finish(tx, result).await?;

        info!(
            updated = report.updated,
            unknown_suppliers = report.unknown_suppliers.len(),
            unknown_products = report.unknown_products.len(),
            "Supplier assignment finished"
        );
        Ok(report)
    }

    /// Applies a partial update. `None` fields are left unchanged.
    pub async fn update(&self, id: i64, update: &ProductUpdate) -> DbResult<Product> {
        if let Some(name) = &update.name {
            validate_name("name", name)?;
        }
        if let Some(code) = &update.code {
            validate_code(code)?;
        }
        for (field, cents) in [
            ("price", update.price_cents),
            ("cost_price", update.cost_price_cents),
            ("wholesale_price", update.wholesale_price_cents),
        ] {
            if let Some(cents) = cents {
                validate_price_cents(field, cents)?;
            }
        }

        let mut conn = self.pool.acquire().await?;
        if let Some(code) = &update.code {
            if code_taken(&mut conn, code, Some(id), None).await? {
                return Err(ValidationError::duplicate("code", code.trim()).into());
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE Productos SET
                nombre           = COALESCE(?2, nombre),
                descripcion      = COALESCE(?3, descripcion),
                precio           = COALESCE(?4, precio),
                precio_compra    = COALESCE(?5, precio_compra),
                precio_mayorista = COALESCE(?6, precio_mayorista),
                codigo           = COALESCE(?7, codigo),
                codigo_proveedor = COALESCE(?8, codigo_proveedor),
                stock            = COALESCE(?9, stock),
                id_proveedor     = COALESCE(?10, id_proveedor)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(clean(&update.description))
        .bind(update.price_cents)
        .bind(update.cost_price_cents)
        .bind(update.wholesale_price_cents)
        .bind(update.code.as_deref().map(str::trim))
        .bind(clean(&update.supplier_code))
        .bind(update.stock)
        .bind(update.supplier_id)
        .execute(&mut *conn)
        .await?;
        drop(conn);

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        debug!(id, "Product updated");
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product. Returns false if it did not exist.
    ///
    /// Products still used by a combo or a purchase cannot be deleted
    /// (`ForeignKeyViolation`).
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM Productos WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(id, "Product deleted");
        }
        Ok(deleted)
    }

    /// Adds `delta` (may be negative) to a product's stock and returns the
    /// new level.
    pub async fn adjust_stock(&self, id: i64, delta: i64) -> DbResult<i64> {
        let unit = UnitOfWork::start("product.adjust_stock");
        let result = sqlx::query_scalar::<_, i64>(
            "UPDATE Productos SET stock = stock + ?1 WHERE id = ?2 RETURNING stock",
        )
        .bind(delta)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)
        .and_then(|stock| stock.ok_or_else(|| DbError::not_found("Product", id)));

        unit.done(result)
    }

    pub async fn set_cost_price(&self, id: i64, cost_price_cents: i64) -> DbResult<()> {
        validate_price_cents("cost_price", cost_price_cents)?;

        let result = sqlx::query("UPDATE Productos SET precio_compra = ?1 WHERE id = ?2")
            .bind(cost_price_cents)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM Productos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Products with no stock left (zero or oversold).
    pub async fn count_out_of_stock(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM Productos WHERE stock <= 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Products matching the filter, lowest stock first.
    pub async fn low_stock(&self, filter: LowStockFilter) -> DbResult<Vec<Product>> {
        let (condition, a, b) = match filter {
            LowStockFilter::Below { limit } => ("p.stock < ?1", limit, 0),
            LowStockFilter::Exactly { units } => ("p.stock = ?1", units, 0),
            LowStockFilter::Between { min, max } => ("p.stock >= ?1 AND p.stock < ?2", min, max),
        };

        let sql = format!("{PRODUCT_SELECT} WHERE {condition} ORDER BY p.stock, p.nombre");
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(a)
            .bind(b)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Whether a code is used by any product or combo.
    pub async fn code_exists(&self, code: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        code_taken(&mut conn, code, None, None).await
    }

    /// A random 12-digit code not used by any product or combo.
    ///
    /// ## Errors
    /// `CodeGenerationExhausted` after five colliding candidates.
    pub async fn generate_unique_code(&self) -> DbResult<String> {
        self.generate_unique_code_with(|| random_code(&mut rand::thread_rng()))
            .await
    }

    /// [`generate_unique_code`](Self::generate_unique_code) with a custom
    /// candidate source.
    pub async fn generate_unique_code_with(
        &self,
        mut candidate: impl FnMut() -> String,
    ) -> DbResult<String> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = candidate();
            if !self.code_exists(&code).await? {
                debug!(attempt, "Generated unique code");
                return Ok(code);
            }
            debug!(attempt, code = %code, "Generated code collides, retrying");
        }

        warn!(attempts = MAX_CODE_ATTEMPTS, "Could not generate a unique code");
        Err(CoreError::CodeGenerationExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        }
        .into())
    }
}

/// Outcome of [`ProductRepository::assign_suppliers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplierAssignment {
    pub updated: usize,
    /// Supplier names with no match.
    pub unknown_suppliers: Vec<String>,
    /// Product codes with no match.
    pub unknown_products: Vec<String>,
}

fn validate_new_product(product: &NewProduct) -> DbResult<()> {
    validate_name("name", &product.name)?;
    validate_code(&product.code)?;
    validate_price_cents("price", product.price_cents)?;
    validate_price_cents("cost_price", product.cost_price_cents)?;
    validate_price_cents("wholesale_price", product.wholesale_price_cents)?;
    Ok(())
}

async fn insert_row(conn: &mut SqliteConnection, product: &NewProduct) -> DbResult<i64> {
    let code = product.code.trim();
    if code_taken(conn, code, None, None).await? {
        return Err(ValidationError::duplicate("code", code).into());
    }

    let id = sqlx::query(
        r#"
        INSERT INTO Productos (
            nombre, descripcion, precio, precio_compra, precio_mayorista,
            codigo, codigo_proveedor, stock, id_proveedor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(product.name.trim())
    .bind(clean(&product.description))
    .bind(product.price_cents)
    .bind(product.cost_price_cents)
    .bind(product.wholesale_price_cents)
    .bind(code)
    .bind(clean(&product.supplier_code))
    .bind(product.stock)
    .bind(product.supplier_id)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

async fn assign_suppliers_in_tx(
    conn: &mut SqliteConnection,
    assignments: &[(String, String)],
) -> DbResult<SupplierAssignment> {
    let mut report = SupplierAssignment::default();

    for (code, supplier_name) in assignments {
        let supplier_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM Proveedor WHERE LOWER(TRIM(nombre)) = LOWER(TRIM(?1))",
        )
        .bind(supplier_name)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(supplier_id) = supplier_id else {
            warn!(supplier = %supplier_name, code = %code, "Unknown supplier, row skipped");
            report.unknown_suppliers.push(supplier_name.clone());
            continue;
        };

        let result = sqlx::query("UPDATE Productos SET id_proveedor = ?1 WHERE codigo = ?2")
            .bind(supplier_id)
            .bind(code.trim())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            report.unknown_products.push(code.clone());
        } else {
            report.updated += 1;
        }
    }

    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================
