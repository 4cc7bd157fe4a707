//! # Repository Module
//!
//! Database repository implementations for Tienda.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Caller                                                                │
//! │       │  db.sales().update_status(42, SaleStatus::ParaEmbalar)         │
//! │       ▼                                                                 │
//! │  SaleRepository ──► inventory helpers ──► tienda-core rules            │
//! │       │                                                                 │
//! │       │  SQL (one transaction per operation)                           │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ClientRepository`] - Clients, search and purchase history
//! - [`SupplierRepository`] - Suppliers and their default shipping cost
//! - [`ProductRepository`] - Products, stock, code uniqueness
//! - [`ComboRepository`] - Combos and their bill of materials
//! - [`SaleRepository`] - Sale lifecycle
//! - [`PurchaseRepository`] - Purchases (stock in, cost prices)
//! - [`DayCloseRepository`] - End-of-day close
//! - [`DashboardRepository`] - Read-only aggregates

pub mod client;
pub mod combo;
pub mod dashboard;
pub mod day_close;
pub mod inventory;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod supplier;

pub use client::ClientRepository;
pub use combo::ComboRepository;
pub use dashboard::DashboardRepository;
pub use day_close::DayCloseRepository;
pub use product::ProductRepository;
pub use purchase::PurchaseRepository;
pub use sale::SaleRepository;
pub use supplier::SupplierRepository;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;

/// Whether `code` is used by a product or a combo.
///
/// `except_product` / `except_combo` skip the row being updated.
pub(crate) async fn code_taken(
    conn: &mut SqliteConnection,
    code: &str,
    except_product: Option<i64>,
    except_combo: Option<i64>,
) -> DbResult<bool> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM Productos WHERE codigo = ?1 AND id IS NOT ?2)
            OR EXISTS(SELECT 1 FROM Combos WHERE codigo = ?1 AND id IS NOT ?3)
        "#,
    )
    .bind(code.trim())
    .bind(except_product)
    .bind(except_combo)
    .fetch_one(&mut *conn)
    .await?;

    Ok(taken)
}

/// `%query%` for LIKE searches, with `%`, `_` and `\` in the query taken
/// literally. Pair with `ESCAPE '\'`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Timestamps are stored at whole-second precision.
pub(crate) fn timestamp(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or_else(Utc::now).trunc_subsecs(0)
}

/// Trimmed text, with blank strings stored as NULL.
pub(crate) fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Test Fixtures
// =============================================================================


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_clean_blank_text() {
        assert_eq!(clean(&Some("  ".to_string())), None);
        assert_eq!(clean(&Some(" a ".to_string())), Some("a".to_string()));
        assert_eq!(clean(&None), None);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" yerba "), "%yerba%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let db = test_db().await;
        product(&db, "A", 0).await;
        product(&db, "B", 0).await;

        assert_eq!(db.products().search("Producto", 10).await.unwrap().len(), 2);
        assert!(db.products().search("%", 10).await.unwrap().is_empty());
        assert!(db.products().search("_", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_code_taken_checks_both_tables() {
        let db = test_db().await;
        let p = product(&db, "1234", 0).await;
        let c = combo(&db, "5678", &[(p, 1)]).await;

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(code_taken(&mut conn, "1234", None, None).await.unwrap());
        assert!(code_taken(&mut conn, "5678", None, None).await.unwrap());
        assert!(!code_taken(&mut conn, "9999", None, None).await.unwrap());

        // The row being edited does not collide with itself.
        assert!(!code_taken(&mut conn, "1234", Some(p), None).await.unwrap());
        assert!(!code_taken(&mut conn, "5678", None, Some(c)).await.unwrap());
    }
}
