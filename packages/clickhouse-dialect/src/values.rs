//! Literal values: SQL literal rendering, pyformat parameter substitution and
//! decoding of the text/JSON cells returned by the HTTP interface.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use num_bigint::BigInt;
use regex::Regex;
use uuid::Uuid;

use crate::errors::{CompileError, DatabaseError, DatabaseErrorKind};
use crate::types::ClickHouseType;

/// Matches a pyformat placeholder `%(name)s` or an escaped percent `%%`.
static PYFORMAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%%|%\(([A-Za-z_][A-Za-z0-9_]*)\)s").expect("valid regex"));

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME64_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    BigInt(BigInt),
    Float(f64),
    /// Decimal kept in its exact textual form.
    Decimal(String),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

pub(crate) fn quote_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

/// Renders the value as a ClickHouse SQL literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::BigInt(b) => write!(f, "{b}"),
            Value::Float(x) if x.is_nan() => write!(f, "nan"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
            }
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{}", quote_string(s)),
            Value::Date(d) => write!(f, "'{}'", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => {
                if dt.nanosecond() == 0 {
                    write!(f, "'{}'", dt.format(DATETIME_FORMAT))
                } else {
                    write!(f, "'{}'", dt.format(DATETIME64_FORMAT))
                }
            }
            Value::Uuid(u) => write!(f, "'{u}'"),
            Value::Array(values) => {
                write!(f, "[")?;
                write_values(f, values)?;
                write!(f, "]")
            }
            Value::Tuple(values) => {
                write!(f, "(")?;
                write_values(f, values)?;
                write!(f, ")")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

pub type Params = BTreeMap<String, Value>;

/// Replaces every `%(name)s` placeholder with the literal for `params[name]`
/// and collapses `%%` back to `%`.
pub fn substitute_params(sql: &str, params: &Params) -> Result<String, CompileError> {
    let mut result = String::with_capacity(sql.len());
    let mut last = 0;
    for captures in PYFORMAT_PATTERN.captures_iter(sql) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        result.push_str(&sql[last..whole.start()]);
        match captures.get(1) {
            Some(name) => {
                let value =
                    params
                        .get(name.as_str())
                        .ok_or_else(|| CompileError::MissingBindValue {
                            name: name.as_str().to_string(),
                        })?;
                result.push_str(&value.to_string());
            }
            None => result.push('%'),
        }
        last = whole.end();
    }
    result.push_str(&sql[last..]);
    Ok(result)
}

fn decode_error(column_type: &ClickHouseType, raw: &serde_json::Value) -> DatabaseError {
    DatabaseError::new(
        DatabaseErrorKind::Decode,
        format!("cannot decode {raw} as {column_type}"),
    )
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME64_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT))
        .ok()
}

/// Decodes one JSONEachRow cell according to the column's ClickHouse type.
///
/// 64-bit and wider integers, decimals and dates arrive as JSON strings;
/// `DateTime64` is accepted with or without a fractional part.
pub fn decode_value(
    column_type: &ClickHouseType,
    raw: &serde_json::Value,
) -> Result<Value, DatabaseError> {
    use serde_json::Value as Json;

    if raw.is_null() {
        return Ok(Value::Null);
    }

    let text = || raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());

    match column_type {
        ClickHouseType::Nullable(inner) | ClickHouseType::LowCardinality(inner) => {
            decode_value(inner, raw)
        }
        ClickHouseType::Int(int) => {
            let digits = text();
            if int.bits() <= 64 {
                let parsed = if int.is_signed() {
                    digits.parse::<i64>().map(Value::Int)
                } else {
                    digits.parse::<u64>().map(Value::UInt)
                };
                parsed.map_err(|_| decode_error(column_type, raw))
            } else {
                digits
                    .parse::<BigInt>()
                    .map(Value::BigInt)
                    .map_err(|_| decode_error(column_type, raw))
            }
        }
        ClickHouseType::Float(_) => match raw {
            Json::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| decode_error(column_type, raw)),
            Json::String(s) => match s.as_str() {
                "inf" | "+inf" => Ok(Value::Float(f64::INFINITY)),
                "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                "nan" | "-nan" => Ok(Value::Float(f64::NAN)),
                s => s
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| decode_error(column_type, raw)),
            },
            _ => Err(decode_error(column_type, raw)),
        },
        ClickHouseType::Decimal { .. } => Ok(Value::Decimal(text())),
        ClickHouseType::Boolean => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(Value::Bool(n.as_u64().is_some_and(|n| n != 0))),
            Json::String(s) => Ok(Value::Bool(s == "true" || s == "1")),
            _ => Err(decode_error(column_type, raw)),
        },
        ClickHouseType::Date | ClickHouseType::Date32 => {
            NaiveDate::parse_from_str(&text(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| decode_error(column_type, raw))
        }
        ClickHouseType::DateTime { .. } | ClickHouseType::DateTime64 { .. } => {
            parse_datetime(&text())
                .map(Value::DateTime)
                .ok_or_else(|| decode_error(column_type, raw))
        }
        ClickHouseType::Uuid => Uuid::parse_str(&text())
            .map(Value::Uuid)
            .map_err(|e| DatabaseError::wrap(DatabaseErrorKind::Decode, e)),
        ClickHouseType::Array(inner) => match raw {
            Json::Array(items) => items
                .iter()
                .map(|item| decode_value(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(decode_error(column_type, raw)),
        },
        ClickHouseType::Tuple(elements) => {
            let items: Vec<&Json> = match raw {
                Json::Array(items) => items.iter().collect(),
                Json::Object(fields) => fields.values().collect(),
                _ => return Err(decode_error(column_type, raw)),
            };
            if items.len() != elements.len() {
                return Err(decode_error(column_type, raw));
            }
            elements
                .iter()
                .zip(items)
                .map(|(element, item)| decode_value(element.element_type(), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple)
        }
        ClickHouseType::Map { value_type, .. } => match raw {
            Json::Object(fields) => fields
                .iter()
                .map(|(k, v)| Ok((Value::String(k.clone()), decode_value(value_type, v)?)))
                .collect::<Result<Vec<_>, DatabaseError>>()
                .map(Value::Map),
            _ => Err(decode_error(column_type, raw)),
        },
        _ => Ok(Value::String(text())),
    }
}
