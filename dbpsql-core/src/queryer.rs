//! The query capability shared by the pool and open transactions
//!
//! Helpers in [`crate::executor`] accept any `Queryer`, so the same code runs
//! standalone against the pool or inside a [`crate::UnitOfWork`].

use async_trait::async_trait;
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Postgres, Transaction};

use crate::named::Statement;

/// Something that can run a compiled named-parameter statement.
#[async_trait]
pub trait Queryer: Send {
    /// Run the statement and collect every row.
    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<PgRow>, sqlx::Error>;

    /// Run the statement and return exactly one row, or `RowNotFound`.
    async fn fetch_one(&mut self, statement: &Statement) -> Result<PgRow, sqlx::Error>;

    /// Run the statement for its side effects.
    async fn execute(&mut self, statement: &Statement) -> Result<PgQueryResult, sqlx::Error>;
}

#[async_trait]
impl Queryer for PgPool {
    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<PgRow>, sqlx::Error> {
        statement.query().fetch_all(&*self).await
    }

    async fn fetch_one(&mut self, statement: &Statement) -> Result<PgRow, sqlx::Error> {
        statement.query().fetch_one(&*self).await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<PgQueryResult, sqlx::Error> {
        statement.query().execute(&*self).await
    }
}

#[async_trait]
impl Queryer for Transaction<'static, Postgres> {
    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<PgRow>, sqlx::Error> {
        statement.query().fetch_all(&mut **self).await
    }

    async fn fetch_one(&mut self, statement: &Statement) -> Result<PgRow, sqlx::Error> {
        statement.query().fetch_one(&mut **self).await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<PgQueryResult, sqlx::Error> {
        statement.query().execute(&mut **self).await
    }
}
