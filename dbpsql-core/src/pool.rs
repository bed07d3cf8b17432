//! Database connection pool management
//!
//! Uses sqlx PgPool with explicit connection limits. Startup connects with a
//! bounded, fixed-interval retry so the process can wait for a database that
//! is still booting, then gives up.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgQueryResult, PgRow};
use sqlx::{Connection, PgPool};
use tracing::{error, info};

use crate::error::{DbError, Result};
use crate::named::Statement;
use crate::queryer::Queryer;
use crate::uow::UnitOfWork;

/// Maximum number of connection attempts at startup.
pub const MAX_RETRIES: u32 = 50;

/// Pause between failed connection attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum open connections in the pool.
pub const MAX_OPEN_CONNS: u32 = 5;

/// Maximum idle connections. sqlx keeps idle connections up to the pool
/// maximum, so this is informational and equal to [`MAX_OPEN_CONNS`].
pub const MAX_IDLE_CONNS: u32 = MAX_OPEN_CONNS;

/// Connections older than this are recycled.
pub const CONN_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Upper bound for a single connect + ping health check.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for draining the pool on shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed-interval retry budget for establishing the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            interval: RETRY_INTERVAL,
        }
    }
}

/// Call `dial` until it succeeds or the policy's attempts run out.
///
/// `dial` receives the 1-based attempt number. There is no pause after the
/// final failure. A policy of zero attempts still dials once.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut dial: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match dial(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                error!(attempt, max_attempts, error = %err, "giving up on database connection");
                return Err(DbError::Connection {
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                error!(attempt, max_attempts, error = %err, "failed to connect to database");
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
        }
    }
}

/// Open a pool and verify it with a ping.
async fn connect_once(dsn: &str) -> std::result::Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_OPEN_CONNS)
        .min_connections(0)
        .max_lifetime(CONN_MAX_LIFETIME)
        .acquire_timeout(PING_TIMEOUT)
        .connect(dsn)
        .await?;

    let ping = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    };

    match tokio::time::timeout(PING_TIMEOUT, ping).await {
        Ok(Ok(())) => Ok(pool),
        Ok(Err(err)) => {
            pool.close().await;
            Err(err)
        }
        Err(_) => {
            pool.close().await;
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

/// Pooled database handle.
///
/// Cheap to clone; every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with the default retry budget.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Database::connect("postgres://localhost/dbpsql").await?;
    /// ```
    pub async fn connect(dsn: &str) -> Result<Self> {
        Self::connect_with_policy(dsn, RetryPolicy::default()).await
    }

    /// Connect with a custom retry budget.
    pub async fn connect_with_policy(dsn: &str, policy: RetryPolicy) -> Result<Self> {
        let pool = retry(&policy, |_| connect_once(dsn)).await?;
        info!(
            max_open = MAX_OPEN_CONNS,
            max_idle = MAX_IDLE_CONNS,
            max_lifetime_secs = CONN_MAX_LIFETIME.as_secs(),
            "database connection established"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool, e.g. one handed out by `#[sqlx::test]`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A fresh unit of work over this pool.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.pool.clone())
    }

    /// Close the pool, waiting for checked-out connections to return.
    ///
    /// Failure is logged and reported, never retried.
    pub async fn close(&self) -> Result<()> {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.pool.close()).await {
            Ok(()) => {
                info!("database pool closed");
                Ok(())
            }
            Err(_) => {
                error!(
                    timeout_secs = CLOSE_TIMEOUT.as_secs(),
                    "timed out closing database pool"
                );
                Err(DbError::internal("timed out closing database pool"))
            }
        }
    }
}

#[async_trait]
impl Queryer for Database {
    async fn fetch_all(
        &mut self,
        statement: &Statement,
    ) -> std::result::Result<Vec<PgRow>, sqlx::Error> {
        Queryer::fetch_all(&mut self.pool, statement).await
    }

    async fn fetch_one(
        &mut self,
        statement: &Statement,
    ) -> std::result::Result<PgRow, sqlx::Error> {
        Queryer::fetch_one(&mut self.pool, statement).await
    }

    async fn execute(
        &mut self,
        statement: &Statement,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        Queryer::execute(&mut self.pool, statement).await
    }
}
