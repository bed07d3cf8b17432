//! Schema migrations
//!
//! Scripts are sqlx reversible migrations: `NNNN_name.up.sql` and
//! `NNNN_name.down.sql`, applied in version order.

use std::path::Path;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::{DbError, Result};

/// The workspace's own migrations, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Apply every pending migration found in `dir` to the database at `dsn`.
///
/// Uses a dedicated single-connection pool that is closed afterwards.
pub async fn apply_migrations(dsn: &str, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    info!(path = %dir.display(), "loading migrations");

    let migrator = Migrator::new(dir.to_path_buf()).await?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(dsn)
        .await
        .map_err(|err| DbError::from_sqlx("failed to open migration connection", err))?;

    let result = migrator.run(&pool).await;
    pool.close().await;
    result?;

    info!(
        path = %dir.display(),
        known = migrator.iter().count(),
        "migrations up to date"
    );
    Ok(())
}
