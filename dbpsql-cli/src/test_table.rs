//! Queries over the example `test_table`

use dbpsql_core::executor::{delete, ensure_absent, insert, select_many, select_one, update};
use dbpsql_core::{Database, DbError, Params, Queryer};
use serde::Serialize;
use sqlx::FromRow;

const SELECT_ALL: &str = r#"select t.id, t.name
    from public."test_table" t
    order by t.id"#;

const SELECT_BY_ID: &str = r#"select t.id, t.name
    from public."test_table" t
    where t.id = :idTestTable"#;

const EXISTS_BY_ID: &str = r#"select 1
    from public."test_table" t
    where t.id = :idTestTable"#;

const EXISTS_BY_NAME: &str = r#"select 1
    from public."test_table" t
    where t.name = :name"#;

const INSERT: &str = r#"insert into public."test_table" (name)
    values (:name)
    returning id"#;

const RENAME: &str = r#"update public."test_table"
    set name = :name
    where id = :idTestTable"#;

const DELETE: &str = r#"delete from public."test_table"
    where id = :idTestTable"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TestTable {
    pub id: i64,
    pub name: String,
}

fn by_id(id: i64) -> Params {
    Params::new().with("idTestTable", id)
}

/// Every row, ordered by id.
pub async fn list<Q: Queryer + ?Sized>(queryer: &mut Q) -> Result<Vec<TestTable>, DbError> {
    select_many(queryer, SELECT_ALL, &Params::new()).await
}

pub async fn get<Q: Queryer + ?Sized>(queryer: &mut Q, id: i64) -> Result<TestTable, DbError> {
    select_one(queryer, SELECT_BY_ID, &by_id(id)).await
}

/// `Err(AlreadyExists)` when a row with `id` is present.
pub async fn ensure_id_free<Q: Queryer + ?Sized>(queryer: &mut Q, id: i64) -> Result<(), DbError> {
    ensure_absent(queryer, EXISTS_BY_ID, &by_id(id)).await
}

/// Insert a row with a name not yet taken, atomically.
pub async fn add(db: &Database, name: &str) -> Result<i64, DbError> {
    let params = Params::new().with("name", name);
    let mut uow = db.unit_of_work();

    uow.run(move |uow| {
        Box::pin(async move {
            ensure_absent(uow.queryer(), EXISTS_BY_NAME, &params).await?;
            insert(uow.queryer(), INSERT, &params).await
        })
    })
    .await
}

pub async fn rename<Q: Queryer + ?Sized>(
    queryer: &mut Q,
    id: i64,
    name: &str,
) -> Result<(), DbError> {
    update(queryer, RENAME, &by_id(id).with("name", name)).await
}

pub async fn remove<Q: Queryer + ?Sized>(queryer: &mut Q, id: i64) -> Result<(), DbError> {
    delete(queryer, DELETE, &by_id(id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbpsql_core::Statement;

    #[test]
    fn templates_compile_with_repo_params() {
        let cases = [
            (SELECT_ALL, Params::new()),
            (SELECT_BY_ID, by_id(1)),
            (EXISTS_BY_ID, by_id(1)),
            (EXISTS_BY_NAME, Params::new().with("name", "Igor")),
            (INSERT, Params::new().with("name", "Igor")),
            (RENAME, by_id(1).with("name", "Igor")),
            (DELETE, by_id(1)),
        ];

        for (template, params) in cases {
            let stmt = Statement::compile(template, &params)
                .unwrap_or_else(|err| panic!("{template}: {err}"));
            assert!(!stmt.sql().contains(":idTestTable"));
            assert!(!stmt.sql().contains(":name"));
        }
    }

    #[test]
    fn rename_binds_id_then_name_in_template_order() {
        let stmt = Statement::compile(RENAME, &by_id(7).with("name", "Igor")).unwrap();
        assert!(stmt.sql().contains("set name = $1"));
        assert!(stmt.sql().contains("where id = $2"));
    }
}
