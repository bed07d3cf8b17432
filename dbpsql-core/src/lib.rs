//! dbpsql-core: pooled PostgreSQL access with named-parameter query helpers
//!
//! - [`pool`] connects with bounded retry and owns the pool
//! - [`uow`] wraps a block of work in one transaction
//! - [`executor`] runs `:name` templates through any [`Queryer`] and maps
//!   outcomes onto [`DbError`]

pub mod config;
pub mod error;
pub mod executor;
pub mod migrate;
pub mod models;
pub mod named;
pub mod pool;
pub mod queryer;
pub mod uow;

pub use config::{Config, ConfigError};
pub use error::{DbError, ErrorKind, Result};
pub use migrate::{apply_migrations, MIGRATOR};
pub use models::{KeyAndValue, OnlyId};
pub use named::{Params, Statement, Value};
pub use pool::{Database, RetryPolicy};
pub use queryer::Queryer;
pub use uow::UnitOfWork;
