//! # Day Close Repository
//!
//! End-of-day close: totals the day's sales and purchases once and marks
//! the day's sales as closed. Days are calendar days in UTC.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tienda_core::DayClose;

use crate::error::DbResult;
use crate::executor::UnitOfWork;

const CLOSE_SELECT: &str = r#"
    SELECT
        id,
        fecha AS date,
        total_ventas AS sales_total_cents,
        total_compras AS purchases_total_cents,
        ganancias AS profit_cents
    FROM CierresDia
"#;

#[derive(Debug, Clone)]
pub struct DayCloseRepository {
    pool: SqlitePool,
}

impl DayCloseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DayCloseRepository { pool }
    }

    /// Closes `date`. Returns `None` if the day was already closed.
    pub async fn create(&self, date: NaiveDate) -> DbResult<Option<DayClose>> {
        let mut tx = self.pool.begin().await?;
        let unit = UnitOfWork::start("day_close.create");
        let result = create_in_tx(&mut tx, date).await;
        let close = unit.finish(tx, result).await?;

        match &close {
            Some(c) => info!(
                date = %date,
                sales = c.sales_total_cents,
                purchases = c.purchases_total_cents,
                profit = c.profit_cents,
                "Day closed"
            ),
            None => debug!(date = %date, "Day already closed"),
        }
        Ok(close)
    }

    /// All closes, newest first.
    pub async fn list(&self) -> DbResult<Vec<DayClose>> {
        let sql = format!("{CLOSE_SELECT} ORDER BY fecha DESC");
        let closes = sqlx::query_as::<_, DayClose>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(closes)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<DayClose>> {
        let sql = format!("{CLOSE_SELECT} WHERE id = ?1");
        let close = sqlx::query_as::<_, DayClose>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(close)
    }

    pub async fn get_by_date(&self, date: NaiveDate) -> DbResult<Option<DayClose>> {
        let sql = format!("{CLOSE_SELECT} WHERE fecha = ?1");
        let close = sqlx::query_as::<_, DayClose>(&sql)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(close)
    }
}

async fn create_in_tx(conn: &mut SqliteConnection, date: NaiveDate) -> DbResult<Option<DayClose>> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM CierresDia WHERE fecha = ?1)")
        .bind(date)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        return Ok(None);
    }

    let sales_total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM Ventas WHERE date(fecha) = ?1")
            .bind(date)
            .fetch_one(&mut *conn)
            .await?;
    let purchases_total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM Compras WHERE date(fecha) = ?1")
            .bind(date)
            .fetch_one(&mut *conn)
            .await?;
    let profit = sales_total - purchases_total;

    let id = sqlx::query(
        "INSERT INTO CierresDia (fecha, total_ventas, total_compras, ganancias) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(date)
    .bind(sales_total)
    .bind(purchases_total)
    .bind(profit)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let marked = sqlx::query("UPDATE Ventas SET cerrado = 1 WHERE date(fecha) = ?1")
        .bind(date)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    debug!(date = %date, sales = marked, "Sales marked closed");

    Ok(Some(DayClose {
        id,
        date,
        sales_total_cents: sales_total,
        purchases_total_cents: purchases_total,
        profit_cents: profit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use chrono::{TimeZone, Utc};
    use tienda_core::purchase::{NewPurchase, PurchaseLineInput};
    use tienda_core::{LineItem, Money, NewSale};

    #[tokio::test]
    async fn test_close_totals_one_day_once() {
        let db = test_db().await;
        let supplier_id = supplier(&db, "Norte", 0).await;
        let p = product(&db, "A", 100).await;
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let sale_at = |hour: u32, quantity: i64| NewSale {
            date: Some(Utc.with_ymd_and_hms(2024, 3, 15, hour, 0, 0).unwrap()),
            lines: vec![LineItem::Product {
                product_id: p,
                quantity,
                unit_price: Money::from_cents(1000),
                wholesale: false,
            }],
            ..Default::default()
        };
        let same_day = db.sales().create(&sale_at(9, 2)).await.unwrap();
        db.sales().create(&sale_at(18, 1)).await.unwrap();
        let next_day = db
            .sales()
            .create(&NewSale {
                date: Some(Utc.with_ymd_and_hms(2024, 3, 16, 9, 0, 0).unwrap()),
                ..sale_at(0, 5)
            })
            .await
            .unwrap();

        db.purchases()
            .create(&NewPurchase {
                supplier_id,
                date: Some(Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap()),
                lines: vec![PurchaseLineInput {
                    product_id: p,
                    quantity: 1,
                    unit_price_cents: 1200,
                    iva_bps: 0,
                    update_cost_price: false,
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let close = db.day_closes().create(day).await.unwrap().unwrap();
        assert_eq!(close.sales_total_cents, 3000);
        assert_eq!(close.purchases_total_cents, 1200);
        assert_eq!(close.profit_cents, 1800);

        assert!(db.day_closes().create(day).await.unwrap().is_none());

        let closed = db.sales().get_by_id(same_day.sale.id).await.unwrap().unwrap();
        assert!(closed.sale.closed);
        let open = db.sales().get_by_id(next_day.sale.id).await.unwrap().unwrap();
        assert!(!open.sale.closed);

        let stored = db.day_closes().get_by_date(day).await.unwrap().unwrap();
        assert_eq!(stored.id, close.id);
        assert_eq!(db.day_closes().get_by_id(close.id).await.unwrap().unwrap().date, day);
        assert_eq!(db.day_closes().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_empty_day() {
        let db = test_db().await;
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let close = db.day_closes().create(day).await.unwrap().unwrap();
        assert_eq!(close.sales_total_cents, 0);
        assert_eq!(close.profit_cents, 0);
    }
}
