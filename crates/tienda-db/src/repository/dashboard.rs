//! # Dashboard Repository
//!
//! Read-only aggregates for the back-office landing page.

use chrono::{Datelike, Months, NaiveDate, Utc};
use sqlx::SqlitePool;

use tienda_core::{DashboardStats, MonthlyTotal, Sale, TopProduct, DASHBOARD_RECENT_SALES, DASHBOARD_TOP_PRODUCTS};

use crate::error::DbResult;
use crate::repository::sale::SALE_SELECT;

#[derive(Debug, Clone)]
pub struct DashboardRepository {
    pool: SqlitePool,
}

impl DashboardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DashboardRepository { pool }
    }

    /// Totals, counts, recent sales, best sellers and the last twelve
    /// months of sales (current month included).
    pub async fn stats(&self) -> DbResult<DashboardStats> {
        self.stats_as_of(Utc::now().date_naive()).await
    }

    /// [`stats`](Self::stats) with the monthly window ending at `today`.
    pub async fn stats_as_of(&self, today: NaiveDate) -> DbResult<DashboardStats> {
        let sales_total_cents: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM Ventas")
            .fetch_one(&self.pool)
            .await?;
        let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Productos")
            .fetch_one(&self.pool)
            .await?;
        let client_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Clientes")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("{SALE_SELECT} ORDER BY v.fecha DESC, v.id DESC LIMIT ?1");
        let recent_sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(DASHBOARD_RECENT_SALES)
            .fetch_all(&self.pool)
            .await?;

        // Combo lines carry a combo id, so only plain product lines count.
        let top_products = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT p.nombre AS name, SUM(d.cantidad) AS quantity
            FROM DetalleVentas d
            JOIN Productos p ON p.id = d.id_producto
            WHERE d.es_combo = 0
            GROUP BY p.id
            ORDER BY quantity DESC, p.nombre
            LIMIT ?1
            "#,
        )
        .bind(DASHBOARD_TOP_PRODUCTS)
        .fetch_all(&self.pool)
        .await?;

        let monthly_sales = sqlx::query_as::<_, MonthlyTotal>(
            r#"
            SELECT strftime('%Y-%m', fecha) AS month, SUM(total) AS total_cents
            FROM Ventas
            WHERE datetime(fecha) >= datetime(?1)
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(window_start(today))
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardStats {
            sales_total_cents,
            product_count,
            client_count,
            recent_sales,
            top_products,
            monthly_sales,
        })
    }
}

/// First day of the month eleven months before `today`'s month.
fn window_start(today: NaiveDate) -> NaiveDate {
    let first = today.with_day(1).unwrap_or(today);
    first.checked_sub_months(Months::new(11)).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use chrono::{TimeZone, Utc};
    use tienda_core::{LineItem, Money, NewClient, NewSale};

    #[test]
    fn test_window_start() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert_eq!(window_start(today), NaiveDate::from_ymd_opt(2023, 4, 1).unwrap());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = test_db().await;
        let stats = db.dashboard().stats().await.unwrap();

        assert_eq!(stats.sales_total_cents, 0);
        assert_eq!(stats.product_count, 0);
        assert!(stats.recent_sales.is_empty());
        assert!(stats.top_products.is_empty());
        assert!(stats.monthly_sales.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let db = test_db().await;
        let a = product(&db, "A", 100).await;
        let b = product(&db, "B", 100).await;
        let c = combo(&db, "C", &[(a, 1)]).await;
        db.clients()
            .insert(&NewClient {
                name: "Ana".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let at = |y: i32, m: u32| Some(Utc.with_ymd_and_hms(y, m, 10, 12, 0, 0).unwrap());
        let product_line = |id: i64, quantity: i64| LineItem::Product {
            product_id: id,
            quantity,
            unit_price: Money::from_cents(100),
            wholesale: false,
        };

        let sales = [
            (at(2023, 1), vec![product_line(a, 50)]),
            (at(2024, 2), vec![product_line(b, 3)]),
            (
                at(2024, 3),
                vec![
                    product_line(b, 1),
                    LineItem::Combo {
                        combo_id: c,
                        quantity: 9,
                        unit_price: Money::from_cents(1000),
                    },
                ],
            ),
        ];
        for (date, lines) in sales {
            db.sales()
                .create(&NewSale {
                    date,
                    lines,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let stats = db.dashboard().stats_as_of(today).await.unwrap();

        assert_eq!(stats.sales_total_cents, 5000 + 300 + 100 + 9000);
        assert_eq!(stats.product_count, 2);
        assert_eq!(stats.client_count, 1);
        assert_eq!(stats.recent_sales.len(), 3);
        assert_eq!(stats.recent_sales[0].total_cents, 9100);

        let top: Vec<(&str, i64)> = stats
            .top_products
            .iter()
            .map(|t| (t.name.as_str(), t.quantity))
            .collect();
        assert_eq!(top, vec![("Producto A", 50), ("Producto B", 4)]);

        let months: Vec<(&str, i64)> = stats
            .monthly_sales
            .iter()
            .map(|m| (m.month.as_str(), m.total_cents))
            .collect();
        assert_eq!(months, vec![("2024-02", 300), ("2024-03", 9100)]);
    }
}
