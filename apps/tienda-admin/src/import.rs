//! Spreadsheet imports.
//!
//! Reads CSV exports of the shop's spreadsheets. Column names follow the
//! store's own table columns:
//!
//! | File | Columns |
//! |------|---------|
//! | products | `nombre, descripcion, precio, codigo, precio_compra, precio_mayorista, codigo_proveedor` |
//! | suppliers | `nombre, telefono, email, direccion, envio` |
//! | supplier assignment | `codigo_producto, proveedor_nombre` |
//!
//! Prices are decimal amounts (`1500.50`). Parsing is all-or-nothing: the
//! first bad row aborts the import before anything is written.

use std::io::Read;

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use tienda_core::{Money, NewProduct, NewSupplier};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    nombre: String,
    descripcion: Option<String>,
    precio: String,
    codigo: String,
    precio_compra: Option<String>,
    precio_mayorista: Option<String>,
    codigo_proveedor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SupplierRow {
    nombre: String,
    telefono: Option<String>,
    email: Option<String>,
    direccion: Option<String>,
    envio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignmentRow {
    codigo_producto: String,
    proveedor_nombre: String,
}

/// Parses a product sheet. New products start with zero stock.
pub fn read_products<R: Read>(input: R) -> Result<Vec<NewProduct>, ImportError> {
    read_rows(input, |row: ProductRow, line| {
        Ok(NewProduct {
            name: row.nombre,
            description: row.descripcion,
            price_cents: cents(&row.precio, line)?,
            cost_price_cents: optional_cents(row.precio_compra.as_deref(), line)?,
            wholesale_price_cents: optional_cents(row.precio_mayorista.as_deref(), line)?,
            code: row.codigo,
            supplier_code: row.codigo_proveedor,
            stock: 0,
            supplier_id: None,
        })
    })
}

pub fn read_suppliers<R: Read>(input: R) -> Result<Vec<NewSupplier>, ImportError> {
    read_rows(input, |row: SupplierRow, line| {
        Ok(NewSupplier {
            name: row.nombre,
            phone: row.telefono,
            email: row.email,
            address: row.direccion,
            shipping_cost_cents: optional_cents(row.envio.as_deref(), line)?,
        })
    })
}

/// Parses `(product code, supplier name)` pairs.
pub fn read_supplier_assignments<R: Read>(
    input: R,
) -> Result<Vec<(String, String)>, ImportError> {
    read_rows(input, |row: AssignmentRow, _| {
        Ok((row.codigo_producto, row.proveedor_nombre))
    })
}

fn read_rows<R, Row, T>(
    input: R,
    mut convert: impl FnMut(Row, usize) -> Result<T, ImportError>,
) -> Result<Vec<T>, ImportError>
where
    R: Read,
    Row: DeserializeOwned,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(input);

    let mut out = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        // Line 1 is the header.
        out.push(convert(record?, index + 2)?);
    }
    Ok(out)
}

fn cents(raw: &str, row: usize) -> Result<i64, ImportError> {
    raw.parse::<Money>()
        .map(|m| m.cents())
        .map_err(|e| ImportError::InvalidRow {
            row,
            reason: format!("{raw:?}: {e}"),
        })
}

fn optional_cents(raw: Option<&str>, row: usize) -> Result<i64, ImportError> {
    match raw {
        Some(raw) if !raw.is_empty() => cents(raw, row),
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_products() {
        let csv = "\
nombre,descripcion,precio,codigo,precio_compra,precio_mayorista,codigo_proveedor
Yerba 1kg,Suave,4500.50,779000000001,3000,4000,YB-1
 Azucar ,,1200,779000000002,,,
";
        let products = read_products(csv.as_bytes()).unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price_cents, 450_050);
        assert_eq!(products[0].wholesale_price_cents, 400_000);
        assert_eq!(products[0].supplier_code.as_deref(), Some("YB-1"));

        assert_eq!(products[1].name, "Azucar");
        assert_eq!(products[1].description, None);
        assert_eq!(products[1].cost_price_cents, 0);
        assert_eq!(products[1].stock, 0);
    }

    #[test]
    fn test_bad_price_reports_row() {
        let csv = "\
nombre,descripcion,precio,codigo,precio_compra,precio_mayorista,codigo_proveedor
Yerba,,4500,1,,,
Azucar,,doce,2,,,
";
        let err = read_products(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::InvalidRow { row: 3, .. }));
    }

    #[test]
    fn test_missing_column() {
        let csv = "telefono,envio\n123,0\n";
        let err = read_suppliers(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::Csv(_)));
    }

    #[test]
    fn test_read_suppliers_and_assignments() {
        let csv = "\
nombre,telefono,email,direccion,envio
Distribuidora Norte,351000000,ventas@norte.test,Calle 1,1500
";
        let suppliers = read_suppliers(csv.as_bytes()).unwrap();
        assert_eq!(suppliers[0].shipping_cost_cents, 150_000);
        assert_eq!(suppliers[0].email.as_deref(), Some("ventas@norte.test"));

        let csv = "codigo_producto,proveedor_nombre\n779000000001, Distribuidora Norte\n";
        let pairs = read_supplier_assignments(csv.as_bytes()).unwrap();
        assert_eq!(
            pairs,
            vec![("779000000001".to_string(), "Distribuidora Norte".to_string())]
        );
    }
}
