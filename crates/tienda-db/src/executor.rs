//! # Unit of Work
//!
//! Every multi-statement operation follows the same shape:
//!
//! ```text
//! pool.begin()  ──►  statements on &mut SqliteConnection  ──►  Ok  ──► COMMIT
//!                                                          └─►  Err ──► ROLLBACK, return Err
//! ```
//!
//! [`UnitOfWork`] owns the "finish" half so that no code path can return an
//! error with a transaction still open, and logs name, outcome and elapsed
//! time for each unit.

use std::time::Instant;

use sqlx::{Sqlite, Transaction};
use tracing::{debug, warn};

use crate::error::DbResult;

/// Timing and outcome logging for one transaction.
#[derive(Debug)]
pub struct UnitOfWork {
    name: &'static str,
    started: Instant,
}

impl UnitOfWork {
    pub fn start(name: &'static str) -> Self {
        debug!(unit = name, "Begin");
        UnitOfWork {
            name,
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Commits on `Ok`, rolls back on `Err`, and passes the result through.
    pub async fn finish<T>(
        self,
        tx: Transaction<'_, Sqlite>,
        result: DbResult<T>,
    ) -> DbResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                debug!(unit = self.name, elapsed_ms = self.elapsed_ms(), "Committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(unit = self.name, error = %rollback_err, "Rollback failed");
                }
                warn!(
                    unit = self.name,
                    elapsed_ms = self.elapsed_ms(),
                    error = %err,
                    "Rolled back"
                );
                Err(err)
            }
        }
    }

    /// Logs a single-statement operation that needed no transaction.
    pub fn done<T>(self, result: DbResult<T>) -> DbResult<T> {
        match &result {
            Ok(_) => debug!(unit = self.name, elapsed_ms = self.elapsed_ms(), "Executed"),
            Err(err) => warn!(
                unit = self.name,
                elapsed_ms = self.elapsed_ms(),
                error = %err,
                "Failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    async fn count_suppliers(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM Proveedor")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_error_rolls_back_every_statement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let unit = UnitOfWork::start("test.rollback");
        let result: DbResult<()> = async {
            sqlx::query("INSERT INTO Proveedor (nombre) VALUES ('A')")
                .execute(&mut *tx)
                .await?;
            Err(DbError::Internal("boom".to_string()))
        }
        .await;

        let err = unit.finish(tx, result).await.unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));
        assert_eq!(count_suppliers(&db).await, 0);
    }

    #[tokio::test]
    async fn test_ok_commits() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let unit = UnitOfWork::start("test.commit");
        let result = sqlx::query("INSERT INTO Proveedor (nombre) VALUES ('A')")
            .execute(&mut *tx)
            .await
            .map(|r| r.rows_affected())
            .map_err(DbError::from);

        assert_eq!(unit.finish(tx, result).await.unwrap(), 1);
        assert_eq!(count_suppliers(&db).await, 1);
    }
}
