//! Generic query helpers
//!
//! Each helper takes a [`Queryer`], a named-parameter template and its
//! [`Params`], and classifies driver outcomes into [`DbError`].
//!
//! Writes never trust "no error" alone: inserts and id-returning updates
//! check that rows came back, updates and deletes check the affected-row
//! count.

use sqlx::postgres::PgRow;
use sqlx::FromRow;
use tracing::debug;

use crate::error::{DbError, Result};
use crate::models::OnlyId;
use crate::named::{Params, Statement};
use crate::queryer::Queryer;

fn prepare(operation: &'static str, template: &str, params: &Params) -> Result<Statement> {
    let statement = Statement::compile(template, params)?;
    debug!(
        operation,
        sql = statement.sql(),
        binds = statement.values().len(),
        "executing query"
    );
    Ok(statement)
}

fn decode<T>(rows: &[PgRow]) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    rows.iter()
        .map(|row| {
            T::from_row(row).map_err(|source| DbError::Internal {
                reason: "failed to decode row".to_string(),
                source: Some(source),
            })
        })
        .collect()
}

/// Run a query and decode every row. An empty result is not an error.
pub async fn select_many<T, Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow>,
    Q: Queryer + ?Sized,
{
    let statement = prepare("select_many", template, params)?;
    let rows = queryer
        .fetch_all(&statement)
        .await
        .map_err(|err| DbError::from_sqlx("select many failed", err))?;
    decode(&rows)
}

/// Run a query that must yield exactly one row.
///
/// Returns [`DbError::NotFound`] when the query matches nothing.
pub async fn select_one<T, Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<T>
where
    T: for<'r> FromRow<'r, PgRow>,
    Q: Queryer + ?Sized,
{
    let statement = prepare("select_one", template, params)?;
    let row = queryer
        .fetch_one(&statement)
        .await
        .map_err(|err| DbError::from_sqlx("select one failed", err))?;
    T::from_row(&row).map_err(|source| DbError::Internal {
        reason: "failed to decode row".to_string(),
        source: Some(source),
    })
}

/// Insert a record and return its generated id.
///
/// The template must end in a `RETURNING` clause whose first column is the
/// id. No returned row means nothing was inserted, which is `Internal`.
pub async fn insert<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<i64>
where
    Q: Queryer + ?Sized,
{
    let ids: Vec<(i64,)> = select_many(queryer, template, params).await?;
    ids.first()
        .map(|(id,)| *id)
        .ok_or_else(|| DbError::internal("record was not inserted"))
}

/// Update records, requiring at least one affected row.
pub async fn update<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<()>
where
    Q: Queryer + ?Sized,
{
    let statement = prepare("update", template, params)?;
    let result = queryer
        .execute(&statement)
        .await
        .map_err(|err| DbError::from_sqlx("update failed", err))?;
    if result.rows_affected() < 1 {
        return Err(DbError::internal("record was not updated"));
    }
    Ok(())
}

/// Update through a `RETURNING` template and return the first id.
pub async fn update_returning_id<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<i64>
where
    Q: Queryer + ?Sized,
{
    insert(queryer, template, params).await
}

/// Update through a `RETURNING id` template and return every touched id.
///
/// Returns [`DbError::NotUpdated`] when nothing matched.
pub async fn update_returning_ids<Q>(
    queryer: &mut Q,
    template: &str,
    params: &Params,
) -> Result<Vec<i64>>
where
    Q: Queryer + ?Sized,
{
    let rows: Vec<OnlyId> = select_many(queryer, template, params).await?;
    if rows.is_empty() {
        return Err(DbError::NotUpdated);
    }
    Ok(rows.into_iter().map(|row| row.id).collect())
}

/// Delete records, returning [`DbError::NotFound`] if none matched.
pub async fn delete<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<()>
where
    Q: Queryer + ?Sized,
{
    let statement = prepare("delete", template, params)?;
    let result = queryer
        .execute(&statement)
        .await
        .map_err(|err| DbError::from_sqlx("delete failed", err))?;
    if result.rows_affected() < 1 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Run any statement without a result set; zero affected rows is `NotFound`.
pub async fn execute<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<u64>
where
    Q: Queryer + ?Sized,
{
    let statement = prepare("execute", template, params)?;
    let result = queryer
        .execute(&statement)
        .await
        .map_err(|err| DbError::from_sqlx("execute failed", err))?;
    match result.rows_affected() {
        0 => Err(DbError::NotFound),
        affected => Ok(affected),
    }
}

fn exists_template(template: &str) -> String {
    format!("SELECT EXISTS({template}) AS ex")
}

/// Check whether `template` matches any row.
///
/// The template is wrapped in `SELECT EXISTS(...)`, so pass the inner query,
/// e.g. `select 1 from test_table where id = :id`.
pub async fn exists<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<bool>
where
    Q: Queryer + ?Sized,
{
    match select_one::<(bool,), Q>(queryer, &exists_template(template), params).await {
        Ok((found,)) => Ok(found),
        Err(DbError::NotFound) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Like [`exists`], but a match is the failure: returns
/// [`DbError::AlreadyExists`] when a row is present.
pub async fn ensure_absent<Q>(queryer: &mut Q, template: &str, params: &Params) -> Result<()>
where
    Q: Queryer + ?Sized,
{
    if exists(queryer, template, params).await? {
        return Err(DbError::AlreadyExists);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_wraps_inner_query() {
        assert_eq!(
            exists_template("select 1 from t where id = :id"),
            "SELECT EXISTS(select 1 from t where id = :id) AS ex"
        );
    }

    #[test]
    fn prepare_rejects_missing_params_before_touching_the_database() {
        let err = prepare("select_one", "select :id", &Params::new())
            .expect_err("missing parameter should fail");
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParams);
    }
}
