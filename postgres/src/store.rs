//! [`PostgresResourceStore`]: conditional decrement on a `resources` row.
//!
//! Each decrement runs in its own transaction:
//!
//! ```sql
//! SELECT set_config('lock_timeout', '100ms', true);
//! UPDATE resources SET quantity = quantity - $2
//!     WHERE id = $1 AND quantity >= $2
//!     RETURNING quantity;
//! INSERT INTO receipts (resource_id, amount) VALUES ($1, $2) RETURNING id, created_at;
//! COMMIT;
//! ```
//!
//! The `WHERE quantity >= $2` guard makes the check and the subtraction one
//! statement under the row lock. If the row lock cannot be taken before
//! `lock_timeout` the statement fails with SQLSTATE `55P03`, which is reported
//! as [`DecrementOutcome::ContentionBlocked`]. Dropping the future before
//! `COMMIT` rolls the transaction back.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tally_core::{
    DecrementOutcome, Quantity, Receipt, ReceiptId, Rejection, ResourceId, ResourceRecord,
    ResourceStore, SeedMode, StoreError, StoreFuture,
};

/// Default wait for a row lock before a decrement reports contention.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// SQLSTATEs meaning "could not get exclusive access": `lock_not_available`,
/// `serialization_failure` and `deadlock_detected`.
const CONTENTION_CODES: [&str; 3] = ["55P03", "40001", "40P01"];

/// `PostgreSQL`-backed [`ResourceStore`].
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresResourceStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresResourceStore {
    /// Connect with a default pool of 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long a decrement waits for the row lock.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Run the embedded migrations (`resources` and `receipts` tables).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn try_decrement(
        &self,
        id: ResourceId,
        amount: Quantity,
    ) -> Result<DecrementOutcome, Failure> {
        let amount_db = to_db(amount)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE resources
            SET quantity = quantity - $2
            WHERE id = $1 AND quantity >= $2
            RETURNING quantity
            ",
        )
        .bind(id.as_i64())
        .bind(amount_db)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((remaining,)) = updated else {
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT quantity FROM resources WHERE id = $1")
                    .bind(id.as_i64())
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            let rejection = match current {
                None => Rejection::NotFound,
                Some((available,)) => Rejection::Insufficient {
                    available: from_db(available)?,
                },
            };
            return Ok(DecrementOutcome::Rejected(rejection));
        };

        let (receipt_id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO receipts (resource_id, amount)
            VALUES ($1, $2)
            RETURNING id, created_at
            ",
        )
        .bind(id.as_i64())
        .bind(amount_db)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DecrementOutcome::Applied {
            remaining: from_db(remaining)?,
            receipt: Receipt {
                id: ReceiptId::new(receipt_id),
                resource_id: id,
                amount,
                timestamp: created_at,
            },
        })
    }
}

impl ResourceStore for PostgresResourceStore {
    fn decrement(&self, id: ResourceId, amount: Quantity) -> StoreFuture<'_, DecrementOutcome> {
        Box::pin(async move {
            match self.try_decrement(id, amount).await {
                Ok(outcome) => Ok(outcome),
                Err(Failure::Sql(e)) if is_contention(&e) => {
                    tracing::debug!(resource_id = %id, error = %e, "Row lock not acquired");
                    Ok(DecrementOutcome::ContentionBlocked)
                },
                Err(Failure::Sql(e)) => Err(StoreError::Database(e.to_string())),
                Err(Failure::Store(e)) => Err(e),
            }
        })
    }

    fn get(&self, id: ResourceId) -> StoreFuture<'_, Option<ResourceRecord>> {
        Box::pin(async move {
            let row: Option<(i64, String, i64)> =
                sqlx::query_as("SELECT id, name, quantity FROM resources WHERE id = $1")
                    .bind(id.as_i64())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;

            row.map(|(id, name, quantity)| {
                from_db(quantity).map(|q| ResourceRecord::new(ResourceId::new(id), name, q))
            })
            .transpose()
        })
    }

    fn receipts(&self, id: ResourceId) -> StoreFuture<'_, Vec<Receipt>> {
        Box::pin(async move {
            let rows: Vec<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
                r"
                SELECT id, amount, created_at
                FROM receipts
                WHERE resource_id = $1
                ORDER BY id ASC
                ",
            )
            .bind(id.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            rows.into_iter()
                .map(|(receipt_id, amount, created_at)| {
                    from_db(amount).map(|amount| Receipt {
                        id: ReceiptId::new(receipt_id),
                        resource_id: id,
                        amount,
                        timestamp: created_at,
                    })
                })
                .collect()
        })
    }

    fn seed(&self, records: Vec<ResourceRecord>, mode: SeedMode) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut written = 0;

            for record in &records {
                let quantity = to_db(record.quantity)?;
                let result = match mode {
                    SeedMode::InsertMissing => {
                        sqlx::query(
                            r"
                            INSERT INTO resources (id, name, quantity)
                            VALUES ($1, $2, $3)
                            ON CONFLICT (id) DO NOTHING
                            ",
                        )
                        .bind(record.id.as_i64())
                        .bind(&record.name)
                        .bind(quantity)
                        .execute(&mut *tx)
                        .await
                    },
                    SeedMode::Reset => {
                        // Receipts describe decrements from the previous initial quantity
                        sqlx::query("DELETE FROM receipts WHERE resource_id = $1")
                            .bind(record.id.as_i64())
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| StoreError::Database(e.to_string()))?;

                        sqlx::query(
                            r"
                            INSERT INTO resources (id, name, quantity)
                            VALUES ($1, $2, $3)
                            ON CONFLICT (id) DO UPDATE
                            SET name = EXCLUDED.name, quantity = EXCLUDED.quantity
                            ",
                        )
                        .bind(record.id.as_i64())
                        .bind(&record.name)
                        .bind(quantity)
                        .execute(&mut *tx)
                        .await
                    },
                }
                .map_err(|e| StoreError::Database(e.to_string()))?;

                if result.rows_affected() > 0 {
                    written += 1;
                }
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            tracing::info!(records = records.len(), written, ?mode, "Resources seeded");
            Ok(written)
        })
    }
}

/// Failure inside a decrement transaction, before contention is classified.
enum Failure {
    Sql(sqlx::Error),
    Store(StoreError),
}

impl From<sqlx::Error> for Failure {
    fn from(error: sqlx::Error) -> Self {
        Self::Sql(error)
    }
}

impl From<StoreError> for Failure {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

fn is_contention(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| CONTENTION_CODES.contains(&code.as_ref()))
}

fn to_db(quantity: Quantity) -> Result<i64, StoreError> {
    i64::try_from(quantity.units())
        .map_err(|_| StoreError::Corrupt(format!("quantity {quantity} exceeds BIGINT range")))
}

fn from_db(value: i64) -> Result<Quantity, StoreError> {
    u64::try_from(value)
        .map(Quantity::new)
        .map_err(|_| StoreError::Corrupt(format!("negative quantity {value} in database")))
}
