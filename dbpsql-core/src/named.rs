//! Named-parameter SQL templates
//!
//! Templates use `:name` placeholders which are rewritten into Postgres
//! positional parameters (`$1`, `$2`, ...) before execution. Casts (`::int`),
//! quoted strings, quoted identifiers, dollar-quoted bodies and comments are
//! copied through untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Encode, Postgres, Type};
use uuid::Uuid;

use crate::error::{DbError, Result};

/// A value that can be bound to a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Bound without a type, so Postgres infers it from where the
    /// placeholder is used.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    fn bind_to<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Value::Null => query.bind(UntypedNull),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Uuid(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
            Value::Json(v) => query.bind(sqlx::types::Json(v)),
        }
    }
}

/// A NULL parameter declared with OID 0 ("unspecified") in the Parse message.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Parameter mapping for a template. Keys are unique; order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    ///
    /// ```ignore
    /// let params = Params::new().with("idTestTable", 2);
    /// ```
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A template compiled to positional SQL with its values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    values: Vec<Value>,
}

impl Statement {
    /// Compile `template`, resolving every placeholder from `params`.
    pub fn compile(template: &str, params: &Params) -> Result<Self> {
        let (sql, names) = rewrite(template);
        let values = names
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DbError::invalid_params(format!("missing parameter '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sql, values })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Build a sqlx query with every value bound in order.
    pub fn query(&self) -> Query<'_, Postgres, PgArguments> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| value.bind_to(query))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rewrite placeholders, returning the SQL and the distinct names in slot order.
fn rewrite(template: &str) -> (String, Vec<String>) {
    let bytes = template.as_bytes();
    let mut sql = String::with_capacity(template.len() + 8);
    let mut names: Vec<String> = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' if starts_escape_string(bytes, i) => {
                i = skip_escape_string(bytes, i + 1);
            }
            b'\'' | b'"' => {
                let quote = bytes[i];
                i = skip_past(bytes, i + 1, |b| b == quote);
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_past(bytes, i + 2, |b| b == b'\n');
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i + 2);
            }
            b'$' if i > 0 && is_ident_char(bytes[i - 1]) => {
                i += 1;
            }
            b'$' => {
                i = skip_dollar_quoted(template, i);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes.get(i + 1).copied().is_some_and(is_ident_start) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_ident_char(bytes[end]) {
                    end += 1;
                }
                let name = &template[start..end];
                let slot = match names.iter().position(|n| n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        names.push(name.to_owned());
                        names.len()
                    }
                };
                sql.push_str(&template[copied..i]);
                sql.push('$');
                sql.push_str(&slot.to_string());
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }

    sql.push_str(&template[copied..]);
    (sql, names)
}

/// Index just past the first byte at or after `from` matching `stop`.
fn skip_past(bytes: &[u8], from: usize, stop: impl Fn(u8) -> bool) -> usize {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| stop(b))
        .map_or(bytes.len(), |offset| from + offset + 1)
}

/// `quote` points at a `'` directly preceded by a standalone `E` or `e`.
fn starts_escape_string(bytes: &[u8], quote: usize) -> bool {
    match quote.checked_sub(1).map(|p| bytes[p]) {
        Some(b'E' | b'e') => quote < 2 || !is_ident_char(bytes[quote - 2]),
        _ => false,
    }
}

/// Skip the body of an `E'...'` literal, where `\'` and `''` do not close it.
fn skip_escape_string(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'\\', Some(_)) | (b'\'', Some(b'\'')) => i += 2,
            (b'\'', _) => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    let mut depth = 1;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (b'/', Some(b'*')) => {
                depth += 1;
                i += 2;
            }
            (b'*', Some(b'/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// `start` points at a `$`. Skips a whole `$tag$ ... $tag$` body when one
/// starts here, otherwise just the `$` (e.g. `$1`).
fn skip_dollar_quoted(template: &str, start: usize) -> usize {
    let bytes = template.as_bytes();
    let mut end = start + 1;
    if end < bytes.len() && is_ident_start(bytes[end]) {
        while end < bytes.len() && is_ident_char(bytes[end]) {
            end += 1;
        }
    }
    if bytes.get(end) != Some(&b'$') {
        return start + 1;
    }

    let delimiter = &template[start..=end];
    let body = end + 1;
    template[body..]
        .find(delimiter)
        .map_or(bytes.len(), |offset| body + offset + delimiter.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str, params: &Params) -> Statement {
        Statement::compile(template, params).expect("template should compile")
    }

    #[test]
    fn rewrites_single_placeholder() {
        let params = Params::new().with("idTestTable", 2);
        let stmt = compile(
            "select t.id, t.name from public.\"test_table\" t where t.id =:idTestTable",
            &params,
        );

        assert_eq!(
            stmt.sql(),
            "select t.id, t.name from public.\"test_table\" t where t.id =$1"
        );
        assert_eq!(stmt.values(), &[Value::Int(2)]);
    }

    #[test]
    fn repeated_names_share_a_slot() {
        let params = Params::new().with("a", 1).with("b", "x");
        let stmt = compile("select :a, :b, :a", &params);

        assert_eq!(stmt.sql(), "select $1, $2, $1");
        assert_eq!(stmt.values(), &[Value::Int(1), Value::Text("x".into())]);
    }

    #[test]
    fn casts_are_not_placeholders() {
        let params = Params::new().with("id", 7);
        let stmt = compile("select :id::bigint, now()::date", &params);

        assert_eq!(stmt.sql(), "select $1::bigint, now()::date");
        assert_eq!(stmt.values().len(), 1);
    }

    #[test]
    fn quoted_text_is_left_alone() {
        let params = Params::new().with("name", "Igor");
        let stmt = compile(
            "select ':skip', \"col:skip\" from t where name = :name and note = 'it''s :also'",
            &params,
        );

        assert_eq!(
            stmt.sql(),
            "select ':skip', \"col:skip\" from t where name = $1 and note = 'it''s :also'"
        );
    }

    #[test]
    fn comments_are_left_alone() {
        let params = Params::new().with("id", 1);
        let stmt = compile(
            "select 1 -- where x = :nope\n/* :nope /* :nested */ */ where id = :id",
            &params,
        );

        assert_eq!(
            stmt.sql(),
            "select 1 -- where x = :nope\n/* :nope /* :nested */ */ where id = $1"
        );
    }

    #[test]
    fn dollar_quoted_bodies_are_left_alone() {
        let params = Params::new().with("v", true);
        let stmt = compile(
            "do $body$ begin perform :inside; end $body$; select $$:raw$$, :v",
            &params,
        );

        assert_eq!(
            stmt.sql(),
            "do $body$ begin perform :inside; end $body$; select $$:raw$$, $1"
        );
        assert_eq!(stmt.values(), &[Value::Bool(true)]);
    }

    #[test]
    fn dollar_inside_identifier_is_not_a_quote() {
        let params = Params::new().with("x", 1);
        let stmt = compile("select a$b$c, :x from t$1", &params);

        assert_eq!(stmt.sql(), "select a$b$c, $1 from t$1");
        assert_eq!(stmt.values(), &[Value::Int(1)]);
    }

    #[test]
    fn escape_strings_honour_backslash_quotes() {
        let params = Params::new().with("x", 1);
        let stmt = compile(
            r"select E'it\'s :no', e'a''b :no\\', :x, name'",
            &params,
        );

        assert_eq!(
            stmt.sql(),
            r"select E'it\'s :no', e'a''b :no\\', $1, name'"
        );
    }

    #[test]
    fn identifier_ending_in_e_is_not_an_escape_prefix() {
        let params = Params::new().with("x", 1).with("y", 2);
        let stmt = compile(r"select name'\', :x, :y", &params);
        assert_eq!(stmt.sql(), r"select name'\', $1, $2");
    }

    #[test]
    fn positional_parameters_pass_through() {
        let stmt = compile("select $1", &Params::new());
        assert_eq!(stmt.sql(), "select $1");
        assert!(stmt.values().is_empty());
    }

    #[test]
    fn missing_parameter_is_invalid_params() {
        let err = Statement::compile("select :id, :name", &Params::new().with("id", 1))
            .expect_err("missing name should fail");

        assert_eq!(err.kind(), crate::ErrorKind::InvalidParams);
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn unused_parameters_are_ignored() {
        let params = Params::new().with("id", 1).with("extra", "unused");
        let stmt = compile("select :id", &params);
        assert_eq!(stmt.values(), &[Value::Int(1)]);
    }

    #[test]
    fn non_ascii_text_survives_rewriting() {
        let params = Params::new().with("name", "Карина");
        let stmt = compile("select 'Антон' as a, :name as b -- комментарий", &params);

        assert_eq!(stmt.sql(), "select 'Антон' as a, $1 as b -- комментарий");
        assert_eq!(stmt.values(), &[Value::Text("Карина".into())]);
    }

    #[test]
    fn unterminated_literal_swallows_rest() {
        let stmt = compile("select 'open :x", &Params::new());
        assert_eq!(stmt.sql(), "select 'open :x");
    }

    #[test]
    fn params_collect_from_pairs() {
        let params: Params = [("a", Value::Int(1)), ("b", Value::Null)].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("b"), Some(&Value::Null));
        assert!(!params.is_empty());
    }

    #[test]
    fn option_values_map_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Value::from(5_i32), Value::Int(5));
    }
}
