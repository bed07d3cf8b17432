//! Unit of work: one transaction around a caller-supplied block
//!
//! ```ignore
//! let mut uow = db.unit_of_work();
//! let id = uow
//!     .run(|uow| {
//!         Box::pin(async move {
//!             let params = Params::new().with("name", "Igor");
//!             executor::insert(uow.queryer(), INSERT, &params).await
//!         })
//!     })
//!     .await?;
//! ```

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::queryer::Queryer;

/// Groups operations into one atomic commit or rollback.
///
/// Holds at most one transaction. Calling [`UnitOfWork::run`] again from
/// inside a running block is rejected rather than opening a second
/// transaction.
pub struct UnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl UnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// The active transaction if there is one, otherwise the pool.
    pub fn queryer(&mut self) -> &mut dyn Queryer {
        if let Some(tx) = self.tx.as_mut() {
            return tx;
        }
        &mut self.pool
    }

    /// Run `f` inside a new transaction.
    ///
    /// Commits when `f` returns `Ok`. Rolls back when it returns `Err`, and
    /// when it panics, in which case the rollback completes before the panic
    /// resumes. Dropping the returned future before it finishes also rolls
    /// back and leaves the unit of work reusable.
    pub async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        if self.tx.is_some() {
            return Err(DbError::internal(
                "unit of work already has an active transaction",
            ));
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DbError::from_sqlx("failed to begin transaction", err))?;
        let mut slot = TxSlot::fill(self, tx);
        debug!("transaction started");

        let outcome = AssertUnwindSafe(async { f(&mut *slot.uow).await })
            .catch_unwind()
            .await;
        let tx = slot.uow.tx.take();

        match outcome {
            Ok(Ok(value)) => {
                let tx = tx.ok_or_else(|| DbError::internal("transaction missing at commit"))?;
                tx.commit()
                    .await
                    .map_err(|err| DbError::from_sqlx("failed to commit transaction", err))?;
                debug!("transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(error = %err, "rolling back transaction");
                rollback(tx).await;
                Err(err)
            }
            Err(panic) => {
                warn!("panic inside unit of work, rolling back");
                rollback(tx).await;
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Holds the unit of work while its transaction is open.
///
/// Empties the slot on drop. A `Transaction` dropped while still open queues
/// its own rollback on the connection, so a cancelled `run` never leaves the
/// unit of work pointing at an abandoned transaction.
struct TxSlot<'a> {
    uow: &'a mut UnitOfWork,
}

impl<'a> TxSlot<'a> {
    fn fill(uow: &'a mut UnitOfWork, tx: Transaction<'static, Postgres>) -> Self {
        uow.tx = Some(tx);
        Self { uow }
    }
}

impl Drop for TxSlot<'_> {
    fn drop(&mut self) {
        if self.uow.tx.take().is_some() {
            warn!("unit of work dropped with an open transaction, rolling back");
        }
    }
}

async fn rollback(tx: Option<Transaction<'static, Postgres>>) {
    let Some(tx) = tx else {
        return;
    };
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "transaction rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://dbpsql@127.0.0.1:1/none")
            .expect("lazy pool from a valid url")
    }

    #[tokio::test]
    async fn starts_without_transaction() {
        let uow = UnitOfWork::new(unreachable_pool());
        assert!(!uow.in_transaction());
    }

    #[tokio::test]
    async fn begin_failure_skips_the_block() {
        let mut uow = UnitOfWork::new(unreachable_pool());
        let mut called = false;

        let result = uow
            .run(|_| {
                called = true;
                Box::pin(async { Ok(()) })
            })
            .await;

        let err = result.expect_err("begin should fail without a database");
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert!(!called);
        assert!(!uow.in_transaction());
    }
}
