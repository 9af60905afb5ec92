//! PostgreSQL column decoding.
//!
//! Rows come back from the server as typed columns; the client works with
//! ordered JSON mappings so that any serde record can be built from them.
//!
//! # Architecture
//!
//! Conversion is two-phase:
//! 1. `categorize_type` classifies the column's type name (array columns are
//!    classified by their element type)
//! 2. a per-category decoder extracts the value
//!
//! NULL decodes to `null` in every category. A value that cannot be decoded
//! is an error; it never turns into `null`.

use crate::models::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::types::{PgInterval, PgMoney, PgRange, PgTimeTz};
use sqlx::postgres::{PgHasArrayType, PgRow, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::{Column, Decode, Postgres, Row as _, Type, TypeInfo, ValueRef};
use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::Bound;

/// Logical category for PostgreSQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Money,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    TimeTz,
    Interval,
    Network,
    MacAddress,
    Range,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    match lower.as_str() {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "smallserial"
        | "serial" | "bigserial" | "oid" => TypeCategory::Integer,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "numeric" | "decimal" => TypeCategory::Decimal,
        "money" => TypeCategory::Money,
        "bool" | "boolean" => TypeCategory::Boolean,
        "text" | "varchar" | "char" | "bpchar" | "name" | "citext" | "character varying"
        | "character" => TypeCategory::Text,
        "bytea" => TypeCategory::Binary,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "timestamp" | "timestamp without time zone" => TypeCategory::Timestamp,
        "timestamptz" | "timestamp with time zone" => TypeCategory::TimestampTz,
        "date" => TypeCategory::Date,
        "time" | "time without time zone" => TypeCategory::Time,
        "timetz" | "time with time zone" => TypeCategory::TimeTz,
        "interval" => TypeCategory::Interval,
        "inet" | "cidr" => TypeCategory::Network,
        "macaddr" | "macaddr8" => TypeCategory::MacAddress,
        "int4range" | "int8range" | "numrange" | "daterange" | "tsrange" | "tstzrange" => {
            TypeCategory::Range
        }
        _ => TypeCategory::Unknown,
    }
}

/// Element type name of an array type, e.g. `INT4[]` or `_int4` gives `INT4`.
pub fn array_element(type_name: &str) -> Option<&str> {
    type_name
        .strip_suffix("[]")
        .or_else(|| type_name.strip_prefix('_'))
}

/// Encode `bytea` contents as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

/// Render an interval the way PostgreSQL prints it, e.g. `1 year 2 mons 3 days 04:05:06`.
pub fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    let (years, mons) = (months / 12, months % 12);
    if years != 0 {
        parts.push(unit(years.into(), "year"));
    }
    if mons != 0 {
        parts.push(unit(mons.into(), "mon"));
    }
    if days != 0 {
        parts.push(unit(days.into(), "day"));
    }

    if microseconds != 0 || parts.is_empty() {
        let negative_before = months < 0 || days < 0;
        let sign = match (microseconds < 0, negative_before) {
            (true, _) => "-",
            (false, true) => "+",
            (false, false) => "",
        };
        let total = microseconds.unsigned_abs();
        let seconds = total / 1_000_000;
        let fraction = total % 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        );
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// Render the binary form of an `inet`/`cidr` value.
///
/// Layout: family, prefix bits, is-cidr flag, address length, address bytes.
/// Host addresses without a narrower prefix print as the bare address.
pub fn format_network(bytes: &[u8]) -> Option<String> {
    let [family, bits, is_cidr, len, address @ ..] = bytes else {
        return None;
    };
    if address.len() != usize::from(*len) {
        return None;
    }
    let (ip, max_bits) = match (family, address) {
        (2, &[a, b, c, d]) => (Ipv4Addr::new(a, b, c, d).to_string(), 32),
        (3, octets) if octets.len() == 16 => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(octets);
            (Ipv6Addr::from(raw).to_string(), 128)
        }
        _ => return None,
    };
    if *is_cidr == 0 && *bits == max_bits {
        Some(ip)
    } else {
        Some(format!("{ip}/{bits}"))
    }
}

fn format_mac_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn format_range<T: Display>(range: &PgRange<T>) -> String {
    let start = match &range.start {
        Bound::Included(v) => format!("[{v}"),
        Bound::Excluded(v) => format!("({v}"),
        Bound::Unbounded => "(".to_string(),
    };
    let end = match &range.end {
        Bound::Included(v) => format!("{v}]"),
        Bound::Excluded(v) => format!("{v})"),
        Bound::Unbounded => ")".to_string(),
    };
    format!("{start},{end}")
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of a driver row into a [`Row`] mapping.
pub trait RowToJson {
    fn to_row(&self) -> Result<Row, sqlx::Error>;
}

impl RowToJson for PgRow {
    fn to_row(&self) -> Result<Row, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = match array_element(type_name) {
                    Some(element) => decode_array(self, idx, type_name, element)?,
                    None => decode_column(self, idx, type_name, categorize_type(type_name))?,
                };
                Ok((col.name().to_string(), value))
            })
            .collect()
    }
}

fn decode_column(
    row: &PgRow,
    idx: usize,
    type_name: &str,
    category: TypeCategory,
) -> Result<JsonValue, sqlx::Error> {
    match category {
        // sqlx only reads these in binary; the simple protocol returns text
        TypeCategory::Money | TypeCategory::TimeTz | TypeCategory::Interval
            if is_text(row, idx)? =>
        {
            decode_raw(row, idx, type_name, |_| None)
        }
        TypeCategory::Integer => match type_name.to_uppercase().as_str() {
            "INT2" => decode(row, idx, |v: i16| v.into()),
            "INT4" => decode(row, idx, |v: i32| v.into()),
            "OID" => decode(row, idx, |v: sqlx::postgres::types::Oid| v.0.into()),
            _ => decode(row, idx, |v: i64| v.into()),
        },
        TypeCategory::Float => match type_name.to_uppercase().as_str() {
            "FLOAT4" => decode(row, idx, |v: f32| float_value(v.into())),
            _ => decode(row, idx, float_value),
        },
        TypeCategory::Decimal => decode(row, idx, |v: Decimal| JsonValue::String(v.to_string())),
        TypeCategory::Money => decode(row, idx, |v: PgMoney| {
            JsonValue::String(v.to_decimal(2).to_string())
        }),
        TypeCategory::Boolean => decode(row, idx, JsonValue::Bool),
        TypeCategory::Text => decode(row, idx, JsonValue::String),
        TypeCategory::Binary => decode(row, idx, |v: Vec<u8>| encode_binary(&v)),
        TypeCategory::Json => decode(row, idx, |v: JsonValue| v),
        TypeCategory::Uuid => decode(row, idx, |v: uuid::Uuid| JsonValue::String(v.to_string())),
        TypeCategory::Timestamp => decode(row, idx, format_timestamp),
        TypeCategory::TimestampTz => {
            decode(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()))
        }
        TypeCategory::Date => decode(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
        TypeCategory::Time => decode(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
        TypeCategory::TimeTz => decode(row, idx, |v: PgTimeTz| {
            JsonValue::String(format!("{}{}", v.time, v.offset))
        }),
        TypeCategory::Interval => decode(row, idx, |v: PgInterval| {
            JsonValue::String(format_interval(v.months, v.days, v.microseconds))
        }),
        TypeCategory::Network => decode_raw(row, idx, type_name, format_network),
        TypeCategory::MacAddress => {
            decode_raw(row, idx, type_name, |bytes| Some(format_mac_address(bytes)))
        }
        TypeCategory::Range => decode_range(row, idx, type_name),
        TypeCategory::Unknown => decode_raw(row, idx, type_name, |_| None),
    }
}

fn format_timestamp(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn is_text(row: &PgRow, idx: usize) -> Result<bool, sqlx::Error> {
    Ok(row.try_get_raw(idx)?.format() == PgValueFormat::Text)
}

fn decode<T, F>(row: &PgRow, idx: usize, convert: F) -> Result<JsonValue, sqlx::Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
    F: FnOnce(T) -> JsonValue,
{
    Ok(row
        .try_get::<Option<T>, _>(idx)?
        .map(convert)
        .unwrap_or(JsonValue::Null))
}

fn decode_range(row: &PgRow, idx: usize, type_name: &str) -> Result<JsonValue, sqlx::Error> {
    fn text<T: Display>(range: PgRange<T>) -> JsonValue {
        JsonValue::String(format_range(&range))
    }

    match type_name.to_uppercase().as_str() {
        "INT4RANGE" => decode(row, idx, text::<i32>),
        "INT8RANGE" => decode(row, idx, text::<i64>),
        "NUMRANGE" => decode(row, idx, text::<Decimal>),
        "DATERANGE" => decode(row, idx, text::<NaiveDate>),
        "TSRANGE" => decode(row, idx, text::<NaiveDateTime>),
        _ => decode(row, idx, text::<DateTime<Utc>>),
    }
}

/// Decode an array column element by element; NULL elements become `null`.
fn decode_array(
    row: &PgRow,
    idx: usize,
    type_name: &str,
    element: &str,
) -> Result<JsonValue, sqlx::Error> {
    match categorize_type(element) {
        TypeCategory::Integer => match element.to_uppercase().as_str() {
            "INT2" => decode_elements(row, idx, |v: i16| v.into()),
            "INT4" => decode_elements(row, idx, |v: i32| v.into()),
            _ => decode_elements(row, idx, |v: i64| v.into()),
        },
        TypeCategory::Float => match element.to_uppercase().as_str() {
            "FLOAT4" => decode_elements(row, idx, |v: f32| float_value(v.into())),
            _ => decode_elements(row, idx, float_value),
        },
        TypeCategory::Decimal => {
            decode_elements(row, idx, |v: Decimal| JsonValue::String(v.to_string()))
        }
        TypeCategory::Boolean => decode_elements(row, idx, JsonValue::Bool),
        TypeCategory::Text => decode_elements(row, idx, JsonValue::String),
        TypeCategory::Binary => decode_elements(row, idx, |v: Vec<u8>| encode_binary(&v)),
        TypeCategory::Json => decode_elements(row, idx, |v: JsonValue| v),
        TypeCategory::Uuid => {
            decode_elements(row, idx, |v: uuid::Uuid| JsonValue::String(v.to_string()))
        }
        TypeCategory::Timestamp => decode_elements(row, idx, format_timestamp),
        TypeCategory::TimestampTz => {
            decode_elements(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()))
        }
        TypeCategory::Date => {
            decode_elements(row, idx, |v: NaiveDate| JsonValue::String(v.to_string()))
        }
        TypeCategory::Time => {
            decode_elements(row, idx, |v: NaiveTime| JsonValue::String(v.to_string()))
        }
        TypeCategory::Interval if !is_text(row, idx)? => {
            decode_elements(row, idx, |v: PgInterval| {
                JsonValue::String(format_interval(v.months, v.days, v.microseconds))
            })
        }
        _ => decode_raw(row, idx, type_name, |_| None),
    }
}

fn decode_elements<T, F>(row: &PgRow, idx: usize, convert: F) -> Result<JsonValue, sqlx::Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + PgHasArrayType,
    F: Fn(T) -> JsonValue,
{
    Ok(match row.try_get::<Option<Vec<Option<T>>>, _>(idx)? {
        Some(values) => JsonValue::Array(
            values
                .into_iter()
                .map(|v| v.map(&convert).unwrap_or(JsonValue::Null))
                .collect(),
        ),
        None => JsonValue::Null,
    })
}

/// Fall back to the raw column value.
///
/// Text-format values (simple query protocol) and types whose binary form is
/// plain text, such as enums, come back as strings. An array in text format
/// comes back as its array literal. `binary` renders any
/// other binary value; when it cannot, the column is reported as
/// undecodable.
fn decode_raw(
    row: &PgRow,
    idx: usize,
    type_name: &str,
    binary: impl FnOnce(&[u8]) -> Option<String>,
) -> Result<JsonValue, sqlx::Error> {
    let raw: PgValueRef<'_> = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(JsonValue::Null);
    }

    let textual = raw.format() == PgValueFormat::Text
        || matches!(raw.type_info().kind(), PgTypeKind::Enum(_))
        || matches!(type_name, "\"CHAR\"" | "XML" | "UNKNOWN");
    let column_error = |message: String| sqlx::Error::ColumnDecode {
        index: format!("{idx:?}"),
        source: message.into(),
    };

    if textual {
        let text = raw
            .as_str()
            .map_err(|e| column_error(format!("column of type {type_name} is not text: {e}")))?;
        return Ok(JsonValue::String(text.to_string()));
    }

    let bytes = raw
        .as_bytes()
        .map_err(|e| column_error(format!("could not read column of type {type_name}: {e}")))?;
    binary(bytes)
        .map(JsonValue::String)
        .ok_or_else(|| column_error(format!("unsupported column type {type_name}")))
}
