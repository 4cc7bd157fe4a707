//! # Client Repository
//!
//! Clients and their purchase history.

use sqlx::SqlitePool;
use tracing::{debug, info};

use tienda_core::validation::{validate_name, validate_search_query};
use tienda_core::{Client, ClientSaleSummary, ClientUpdate, NewClient};

use crate::error::{DbError, DbResult};
use crate::repository::{clean, like_pattern};

const CLIENT_SELECT: &str = r#"
    SELECT
        id,
        nombre AS name,
        email,
        telefono AS phone,
        direccion AS address,
        dni,
        provincia AS province,
        ciudad AS city,
        cp AS postal_code
    FROM Clientes
"#;

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Client>> {
        let sql = format!("{CLIENT_SELECT} ORDER BY nombre, id");
        let clients = sqlx::query_as::<_, Client>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(clients)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Client>> {
        let sql = format!("{CLIENT_SELECT} WHERE id = ?1");
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    /// Substring match on name, email, phone or DNI.
    pub async fn search(&self, query: &str) -> DbResult<Vec<Client>> {
        let query = validate_search_query(query)?;
        let sql = format!(
            "{CLIENT_SELECT}
             WHERE nombre LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'
                OR telefono LIKE ?1 ESCAPE '\\' OR dni LIKE ?1 ESCAPE '\\'
             ORDER BY nombre, id"
        );
        let clients = sqlx::query_as::<_, Client>(&sql)
            .bind(like_pattern(&query))
            .fetch_all(&self.pool)
            .await?;

        debug!(query = %query, count = clients.len(), "Searched clients");
        Ok(clients)
    }

    pub async fn insert(&self, client: &NewClient) -> DbResult<Client> {
        validate_name("name", &client.name)?;

        let result = sqlx::query(
            r#"
            INSERT INTO Clientes (nombre, email, telefono, direccion, dni, provincia, ciudad, cp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(client.name.trim())
        .bind(clean(&client.email))
        .bind(clean(&client.phone))
        .bind(clean(&client.address))
        .bind(clean(&client.dni))
        .bind(clean(&client.province))
        .bind(clean(&client.city))
        .bind(clean(&client.postal_code))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, "Client created");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Client", id))
    }

    /// Partial update; `None` leaves a field as it is.
    pub async fn update(&self, id: i64, update: &ClientUpdate) -> DbResult<Client> {
        if let Some(name) = &update.name {
            validate_name("name", name)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE Clientes SET
                nombre    = COALESCE(?2, nombre),
                email     = COALESCE(?3, email),
                telefono  = COALESCE(?4, telefono),
                direccion = COALESCE(?5, direccion),
                dni       = COALESCE(?6, dni),
                provincia = COALESCE(?7, provincia),
                ciudad    = COALESCE(?8, ciudad),
                cp        = COALESCE(?9, cp)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(clean(&update.email))
        .bind(clean(&update.phone))
        .bind(clean(&update.address))
        .bind(clean(&update.dni))
        .bind(clean(&update.province))
        .bind(clean(&update.city))
        .bind(clean(&update.postal_code))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Client", id))
    }

    /// Deletes a client. Their sales stay, without a client.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM Clientes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(id, "Client deleted");
        }
        Ok(deleted)
    }

    /// The client's sales, newest first.
    pub async fn purchase_history(&self, client_id: i64) -> DbResult<Vec<ClientSaleSummary>> {
        let history = sqlx::query_as::<_, ClientSaleSummary>(
            r#"
            SELECT
                v.id,
                v.fecha AS date,
                v.total AS total_cents,
                v.estado AS status,
                COUNT(d.id) AS line_count
            FROM Ventas v
            LEFT JOIN DetalleVentas d ON d.id_venta = v.id
            WHERE v.id_cliente = ?1
            GROUP BY v.id
            ORDER BY v.fecha DESC, v.id DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use chrono::{Duration, Utc};
    use tienda_core::{LineItem, Money, NewSale};

    fn maria() -> NewClient {
        NewClient {
            name: "María Gómez".to_string(),
            email: Some("maria@example.com".to_string()),
            phone: Some("11 5555-0000".to_string()),
            city: Some("Rosario".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let db = test_db().await;
        let created = db.clients().insert(&maria()).await.unwrap();
        assert_eq!(created.city.as_deref(), Some("Rosario"));

        let updated = db
            .clients()
            .update(
                created.id,
                &ClientUpdate {
                    city: Some("Córdoba".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.city.as_deref(), Some("Córdoba"));
        assert_eq!(updated.email, created.email);

        assert_eq!(db.clients().list().await.unwrap().len(), 1);
        assert!(db.clients().delete(created.id).await.unwrap());
        assert!(db.clients().get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let db = test_db().await;
        let err = db
            .clients()
            .insert(&NewClient {
                name: " ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_search() {
        let db = test_db().await;
        db.clients().insert(&maria()).await.unwrap();

        assert_eq!(db.clients().search("gómez").await.unwrap().len(), 1);
        assert_eq!(db.clients().search("example.com").await.unwrap().len(), 1);
        assert_eq!(db.clients().search("5555").await.unwrap().len(), 1);
        assert!(db.clients().search("pérez").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_history() {
        let db = test_db().await;
        let client = db.clients().insert(&maria()).await.unwrap();
        let p = product(&db, "A", 10).await;

        let line = LineItem::Product {
            product_id: p,
            quantity: 1,
            unit_price: Money::from_cents(1000),
            wholesale: false,
        };
        for days_ago in [3, 1] {
            db.sales()
                .create(&NewSale {
                    client_id: Some(client.id),
                    date: Some(Utc::now() - Duration::days(days_ago)),
                    lines: vec![line.clone(), line.clone()],
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let history = db.clients().purchase_history(client.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].date > history[1].date);
        assert_eq!(history[0].line_count, 2);
        assert_eq!(history[0].total_cents, 2000);
    }
}
