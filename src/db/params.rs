//! Placeholder rewriting and parameter binding.
//!
//! Queries are written with pyformat placeholders: `%(name)s` for named
//! parameters, a single `%s` for the row list of `execute_values`, and `%%`
//! for a literal percent sign. PostgreSQL only understands `$n`, so every
//! statement is rewritten before it reaches the driver. A name used several
//! times binds a single value.
//!
//! A query without parameters is passed through untouched, percent signs
//! included.

use crate::db::driver::Statement;
use crate::db::types::array_element;
use crate::error::{DbError, DbResult};
use crate::models::Params;
use crate::models::query::json_type_name;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::postgres::types::Oid;
use sqlx::types::Json;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Named(&'a str),
    Positional,
}

fn tokenize(sql: &str) -> DbResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = sql;

    while let Some(pos) = rest.find('%') {
        if pos > 0 {
            tokens.push(Token::Text(&rest[..pos]));
        }
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            tokens.push(Token::Text("%"));
            rest = after;
        } else if let Some(after) = tail.strip_prefix('s') {
            tokens.push(Token::Positional);
            rest = after;
        } else if let Some(after) = tail.strip_prefix('(') {
            let end = after.find(')').ok_or_else(|| {
                DbError::invalid_input(format!("Unterminated placeholder in query: {sql}"))
            })?;
            let name = &after[..end];
            if name.is_empty() {
                return Err(DbError::invalid_input("Placeholder name cannot be empty"));
            }
            rest = after[end + 1..].strip_prefix('s').ok_or_else(|| {
                DbError::invalid_input(format!(
                    "Placeholder %({name}) must be followed by 's'"
                ))
            })?;
            tokens.push(Token::Named(name));
        } else {
            // A lone percent sign, e.g. the modulo operator
            tokens.push(Token::Text("%"));
            rest = tail;
        }
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

/// Accumulates rewritten SQL and bind values.
#[derive(Default)]
struct Rewriter<'a> {
    sql: String,
    binds: Vec<JsonValue>,
    named: HashMap<&'a str, usize>,
}

impl<'a> Rewriter<'a> {
    fn push_value(&mut self, value: JsonValue) -> usize {
        self.binds.push(value);
        self.binds.len()
    }

    fn push_named(&mut self, name: &'a str, params: &Params) -> DbResult<()> {
        let index = match self.named.get(name) {
            Some(index) => *index,
            None => {
                let value = params.get(name).cloned().ok_or_else(|| {
                    DbError::invalid_input(format!("Missing value for parameter '{name}'"))
                })?;
                let index = self.push_value(value);
                self.named.insert(name, index);
                index
            }
        };
        let _ = write!(self.sql, "${index}");
        Ok(())
    }

    fn push_rows(&mut self, rows: &[Vec<JsonValue>]) {
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                self.sql.push(',');
            }
            self.sql.push('(');
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    self.sql.push(',');
                }
                let index = self.push_value(value.clone());
                let _ = write!(self.sql, "${index}");
            }
            self.sql.push(')');
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            binds: self.binds,
        }
    }
}

/// Rewrite a query with named parameters into a driver statement.
pub fn prepare(sql: &str, params: &Params) -> DbResult<Statement> {
    if params.is_empty() {
        return Ok(Statement::raw(sql));
    }

    let mut rewriter = Rewriter::default();
    for token in tokenize(sql)? {
        match token {
            Token::Text(text) => rewriter.sql.push_str(text),
            Token::Named(name) => rewriter.push_named(name, params)?,
            Token::Positional => {
                return Err(DbError::invalid_input(
                    "Positional placeholder %s is only supported by execute_values",
                ));
            }
        }
    }
    Ok(rewriter.finish())
}

/// Rewrite an `execute_values` query, expanding its single `%s` into one
/// parenthesised tuple per row.
pub fn prepare_values(
    sql: &str,
    params: &Params,
    rows: &[Vec<JsonValue>],
) -> DbResult<Statement> {
    let mut rewriter = Rewriter::default();
    let mut expanded = false;

    for token in tokenize(sql)? {
        match token {
            Token::Text(text) => rewriter.sql.push_str(text),
            Token::Named(name) => rewriter.push_named(name, params)?,
            Token::Positional if expanded => {
                return Err(DbError::invalid_input(
                    "execute_values query must contain exactly one %s placeholder",
                ));
            }
            Token::Positional => {
                rewriter.push_rows(rows);
                expanded = true;
            }
        }
    }

    if !expanded {
        return Err(DbError::invalid_input(
            "execute_values query must contain a %s placeholder for the rows",
        ));
    }
    Ok(rewriter.finish())
}

/// Query type the PostgreSQL driver binds parameters into.
pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A bind value converted to the type PostgreSQL inferred for its parameter.
///
/// Parameters travel in binary form, so each value has to be encoded as the
/// exact type the prepared statement expects. Strings are the common case:
/// a uuid, timestamp or numeric serialized as text is parsed back here, the
/// way the server would coerce an untyped literal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgParam {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(u32),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    BoolArray(Vec<Option<bool>>),
    Int2Array(Vec<Option<i16>>),
    Int4Array(Vec<Option<i32>>),
    Int8Array(Vec<Option<i64>>),
    Float4Array(Vec<Option<f32>>),
    Float8Array(Vec<Option<f64>>),
    NumericArray(Vec<Option<Decimal>>),
    TextArray(Vec<Option<String>>),
    UuidArray(Vec<Option<Uuid>>),
    DateArray(Vec<Option<NaiveDate>>),
    TimestampArray(Vec<Option<NaiveDateTime>>),
    TimestampTzArray(Vec<Option<DateTime<Utc>>>),
    JsonArray(Vec<Option<JsonValue>>),
}

impl PgParam {
    pub(crate) fn bind_to<'q>(self, query: PgQuery<'q>) -> PgQuery<'q> {
        match self {
            // NULL carries no payload; the statement's parameter type applies
            Self::Null => query.bind(None::<String>),
            Self::Bool(v) => query.bind(v),
            Self::Int2(v) => query.bind(v),
            Self::Int4(v) => query.bind(v),
            Self::Int8(v) => query.bind(v),
            Self::Oid(v) => query.bind(Oid(v)),
            Self::Float4(v) => query.bind(v),
            Self::Float8(v) => query.bind(v),
            Self::Numeric(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::Bytes(v) => query.bind(v),
            Self::Json(v) => query.bind(Json(v)),
            Self::Uuid(v) => query.bind(v),
            Self::Date(v) => query.bind(v),
            Self::Time(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
            Self::TimestampTz(v) => query.bind(v),
            Self::BoolArray(v) => query.bind(v),
            Self::Int2Array(v) => query.bind(v),
            Self::Int4Array(v) => query.bind(v),
            Self::Int8Array(v) => query.bind(v),
            Self::Float4Array(v) => query.bind(v),
            Self::Float8Array(v) => query.bind(v),
            Self::NumericArray(v) => query.bind(v),
            Self::TextArray(v) => query.bind(v),
            Self::UuidArray(v) => query.bind(v),
            Self::DateArray(v) => query.bind(v),
            Self::TimestampArray(v) => query.bind(v),
            Self::TimestampTzArray(v) => query.bind(v),
            Self::JsonArray(v) => {
                query.bind(v.into_iter().map(|o| o.map(Json)).collect::<Vec<_>>())
            }
        }
    }
}

/// Types whose binary form is not their text form. A JSON value cannot be
/// sent for them directly; the placeholder needs a cast through text.
const NEEDS_TEXT_CAST: &[&str] = &[
    "INTERVAL", "INET", "CIDR", "MACADDR", "MACADDR8", "MONEY", "TIMETZ", "BIT", "VARBIT",
    "POINT", "LINE", "LSEG", "BOX", "PATH", "POLYGON", "CIRCLE", "TSVECTOR", "TSQUERY",
    "INT4RANGE", "INT8RANGE", "NUMRANGE", "DATERANGE", "TSRANGE", "TSTZRANGE",
];

/// Convert a JSON value for a parameter the server typed as `type_name`.
pub(crate) fn coerce_param(value: &JsonValue, type_name: &str) -> Result<PgParam, String> {
    match array_element(type_name) {
        Some(element) => coerce_array(value, type_name, element),
        None => coerce_scalar(value, type_name),
    }
}

fn coerce_scalar(value: &JsonValue, type_name: &str) -> Result<PgParam, String> {
    if value.is_null() {
        return Ok(PgParam::Null);
    }
    let upper = type_name.to_uppercase();
    let invalid = || {
        format!(
            "cannot bind {} value {value} as {upper}",
            json_type_name(value)
        )
    };

    match upper.as_str() {
        "BOOL" => as_bool(value).map(PgParam::Bool).ok_or_else(invalid),
        "INT2" => as_i64(value)
            .and_then(|v| i16::try_from(v).ok())
            .map(PgParam::Int2)
            .ok_or_else(invalid),
        "INT4" => as_i64(value)
            .and_then(|v| i32::try_from(v).ok())
            .map(PgParam::Int4)
            .ok_or_else(invalid),
        "INT8" => as_i64(value).map(PgParam::Int8).ok_or_else(invalid),
        "OID" => as_i64(value)
            .and_then(|v| u32::try_from(v).ok())
            .map(PgParam::Oid)
            .ok_or_else(invalid),
        "FLOAT4" => as_f64(value).map(|v| PgParam::Float4(v as f32)).ok_or_else(invalid),
        "FLOAT8" => as_f64(value).map(PgParam::Float8).ok_or_else(invalid),
        "NUMERIC" => as_decimal(value).map(PgParam::Numeric).ok_or_else(invalid),
        "UUID" => as_str(value)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(PgParam::Uuid)
            .ok_or_else(invalid),
        "DATE" => as_str(value)
            .and_then(parse_date)
            .map(PgParam::Date)
            .ok_or_else(invalid),
        "TIME" => as_str(value)
            .and_then(parse_time)
            .map(PgParam::Time)
            .ok_or_else(invalid),
        "TIMESTAMP" => as_str(value)
            .and_then(parse_timestamp)
            .map(PgParam::Timestamp)
            .ok_or_else(invalid),
        "TIMESTAMPTZ" => as_str(value)
            .and_then(parse_timestamptz)
            .map(PgParam::TimestampTz)
            .ok_or_else(invalid),
        "JSON" | "JSONB" => Ok(PgParam::Json(match value {
            // Text holding a JSON document is sent as that document
            JsonValue::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        })),
        "BYTEA" => as_bytes(value).map(PgParam::Bytes).ok_or_else(invalid),
        other if NEEDS_TEXT_CAST.contains(&other) => Err(format!(
            "parameters of type {other} must be cast from text in the query, e.g. %(name)s::text::{}",
            other.to_lowercase()
        )),
        // Text-like types, enums and domains over text take the text form
        _ => Ok(PgParam::Text(match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })),
    }
}

fn coerce_array(value: &JsonValue, type_name: &str, element: &str) -> Result<PgParam, String> {
    let items = match value {
        JsonValue::Null => return Ok(PgParam::Null),
        JsonValue::Array(items) => items,
        other => {
            return Err(format!(
                "cannot bind {} value {other} as {type_name}",
                json_type_name(other)
            ));
        }
    };
    let scalars = items
        .iter()
        .map(|item| coerce_scalar(item, element))
        .collect::<Result<Vec<_>, _>>()?;

    macro_rules! collect_as {
        ($scalar:ident, $array:ident) => {
            scalars
                .into_iter()
                .map(|param| match param {
                    PgParam::$scalar(v) => Ok(Some(v)),
                    PgParam::Null => Ok(None),
                    other => Err(format!("unexpected element {other:?} for {type_name}")),
                })
                .collect::<Result<Vec<_>, String>>()
                .map(PgParam::$array)
        };
    }

    match element.to_uppercase().as_str() {
        "BOOL" => collect_as!(Bool, BoolArray),
        "INT2" => collect_as!(Int2, Int2Array),
        "INT4" => collect_as!(Int4, Int4Array),
        "INT8" => collect_as!(Int8, Int8Array),
        "FLOAT4" => collect_as!(Float4, Float4Array),
        "FLOAT8" => collect_as!(Float8, Float8Array),
        "NUMERIC" => collect_as!(Numeric, NumericArray),
        "TEXT" => collect_as!(Text, TextArray),
        "UUID" => collect_as!(Uuid, UuidArray),
        "DATE" => collect_as!(Date, DateArray),
        "TIMESTAMP" => collect_as!(Timestamp, TimestampArray),
        "TIMESTAMPTZ" => collect_as!(TimestampTz, TimestampTzArray),
        "JSONB" => collect_as!(Json, JsonArray),
        _ => Err(format!(
            "array parameters of type {type_name} are not supported, cast from text[] in the query"
        )),
    }
}

fn as_str(value: &JsonValue) -> Option<&str> {
    value.as_str()
}

fn as_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(v) => Some(*v),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &JsonValue) -> Option<Decimal> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn as_bytes(value: &JsonValue) -> Option<Vec<u8>> {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match value {
        JsonValue::String(s) => STANDARD.decode(s).ok(),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Timestamps without an offset are taken as UTC.
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_placeholders_become_numbered() {
        let params = Params::new().with("id", 1).with("name", "ada");
        let stmt = prepare(
            "select * from users where id = %(id)s and name = %(name)s",
            &params,
        )
        .unwrap();
        assert_eq!(stmt.sql, "select * from users where id = $1 and name = $2");
        assert_eq!(stmt.binds, vec![json!(1), json!("ada")]);
    }

    #[test]
    fn test_repeated_name_reuses_index() {
        let params = Params::new().with("v", "x");
        let stmt = prepare("select %(v)s, %(v)s", &params).unwrap();
        assert_eq!(stmt.sql, "select $1, $1");
        assert_eq!(stmt.binds.len(), 1);
    }

    #[test]
    fn test_escaped_percent() {
        let params = Params::new().with("pattern", "a");
        let stmt = prepare(
            "select * from t where name like 'x%%' or name = %(pattern)s",
            &params,
        )
        .unwrap();
        assert_eq!(stmt.sql, "select * from t where name like 'x%' or name = $1");
    }

    #[test]
    fn test_lone_percent_is_kept() {
        let params = Params::new().with("n", 3);
        let stmt = prepare("select 10 % %(n)s", &params).unwrap();
        assert_eq!(stmt.sql, "select 10 % $1");
    }

    #[test]
    fn test_no_params_passes_sql_through() {
        let stmt = prepare("select '100%%'", &Params::new()).unwrap();
        assert_eq!(stmt.sql, "select '100%%'");
        assert!(stmt.binds.is_empty());
    }

    #[test]
    fn test_missing_param_is_rejected() {
        let params = Params::new().with("id", 1);
        let err = prepare("select %(other)s", &params).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_malformed_placeholders_are_rejected() {
        let params = Params::new().with("id", 1);
        assert!(prepare("select %(id", &params).is_err());
        assert!(prepare("select %(id)d", &params).is_err());
        assert!(prepare("select %()s", &params).is_err());
        assert!(prepare("select %s", &params).is_err());
    }

    #[test]
    fn test_values_expansion() {
        let rows = vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]];
        let stmt = prepare_values("insert into t (id, name) values %s", &Params::new(), &rows)
            .unwrap();
        assert_eq!(stmt.sql, "insert into t (id, name) values ($1,$2),($3,$4)");
        assert_eq!(stmt.binds, vec![json!(1), json!("a"), json!(2), json!("b")]);
    }

    #[test]
    fn test_values_with_named_suffix() {
        let rows = vec![vec![json!(1)]];
        let params = Params::new().with("tag", "t");
        let stmt = prepare_values(
            "insert into t (id) values %s on conflict do nothing returning %(tag)s",
            &params,
            &rows,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "insert into t (id) values ($1) on conflict do nothing returning $2"
        );
    }

    #[test]
    fn test_values_requires_exactly_one_placeholder() {
        let rows = vec![vec![json!(1)]];
        assert!(prepare_values("insert into t values (1)", &Params::new(), &rows).is_err());
        assert!(prepare_values("insert into t values %s, %s", &Params::new(), &rows).is_err());
    }

    #[test]
    fn test_strings_coerce_to_inferred_type() {
        let id = "6f1c1d4e-3b2a-4c5d-9e8f-0a1b2c3d4e5f";
        assert_eq!(
            coerce_param(&json!(id), "UUID").unwrap(),
            PgParam::Uuid(Uuid::parse_str(id).unwrap())
        );
        assert_eq!(
            coerce_param(&json!("2024-03-01T12:30:00+02:00"), "TIMESTAMPTZ").unwrap(),
            PgParam::TimestampTz("2024-03-01T10:30:00Z".parse().unwrap())
        );
        assert_eq!(
            coerce_param(&json!("2024-03-01 12:30:00"), "TIMESTAMPTZ").unwrap(),
            PgParam::TimestampTz("2024-03-01T12:30:00Z".parse().unwrap())
        );
        assert_eq!(
            coerce_param(&json!("2024-03-01"), "DATE").unwrap(),
            PgParam::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            coerce_param(&json!("12.50"), "NUMERIC").unwrap(),
            PgParam::Numeric(Decimal::new(1250, 2))
        );
        assert_eq!(coerce_param(&json!("42"), "INT4").unwrap(), PgParam::Int4(42));
        assert_eq!(coerce_param(&json!("on"), "BOOL").unwrap(), PgParam::Bool(true));
    }

    #[test]
    fn test_numbers_respect_column_width() {
        assert_eq!(coerce_param(&json!(7), "INT2").unwrap(), PgParam::Int2(7));
        assert_eq!(coerce_param(&json!(3.0), "INT8").unwrap(), PgParam::Int8(3));
        assert_eq!(coerce_param(&json!(1.5), "FLOAT8").unwrap(), PgParam::Float8(1.5));
        assert!(coerce_param(&json!(70000), "INT2").is_err());
        assert!(coerce_param(&json!(1.5), "INT4").is_err());
        assert!(coerce_param(&json!("abc"), "INT8").is_err());
    }

    #[test]
    fn test_null_and_text_fallback() {
        assert_eq!(coerce_param(&JsonValue::Null, "UUID").unwrap(), PgParam::Null);
        assert_eq!(
            coerce_param(&json!("hello"), "VARCHAR").unwrap(),
            PgParam::Text("hello".into())
        );
        // Enums and other text-like types take the value's text
        assert_eq!(
            coerce_param(&json!(12), "mood").unwrap(),
            PgParam::Text("12".into())
        );
    }

    #[test]
    fn test_json_parameters() {
        assert_eq!(
            coerce_param(&json!({"a": 1}), "JSONB").unwrap(),
            PgParam::Json(json!({"a": 1}))
        );
        assert_eq!(
            coerce_param(&json!(r#"{"a": 1}"#), "JSON").unwrap(),
            PgParam::Json(json!({"a": 1}))
        );
        assert_eq!(
            coerce_param(&json!("plain"), "JSONB").unwrap(),
            PgParam::Json(json!("plain"))
        );
    }

    #[test]
    fn test_bytea_from_base64() {
        assert_eq!(
            coerce_param(&json!("AAEC"), "BYTEA").unwrap(),
            PgParam::Bytes(vec![0, 1, 2])
        );
    }

    #[test]
    fn test_arrays_collect_elements() {
        assert_eq!(
            coerce_param(&json!([1, null, 3]), "INT4[]").unwrap(),
            PgParam::Int4Array(vec![Some(1), None, Some(3)])
        );
        assert_eq!(
            coerce_param(&json!(["a", "b"]), "TEXT[]").unwrap(),
            PgParam::TextArray(vec![Some("a".into()), Some("b".into())])
        );
        assert!(coerce_param(&json!("1,2"), "INT4[]").is_err());
        assert!(coerce_param(&json!(["x"]), "INET[]").is_err());
    }

    #[test]
    fn test_binary_only_types_ask_for_text_cast() {
        let err = coerce_param(&json!("1 day"), "INTERVAL").unwrap_err();
        assert!(err.contains("::text::interval"), "{err}");
        assert!(coerce_param(&json!("10.0.0.1"), "INET").is_err());
    }
}
