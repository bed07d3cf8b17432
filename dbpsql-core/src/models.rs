//! Small row shapes reused across queries

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row carrying only an `id` column, as returned by `RETURNING id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OnlyId {
    pub id: i64,
}

/// A generic key/value pair row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KeyAndValue {
    pub key: String,
    pub value: String,
}
