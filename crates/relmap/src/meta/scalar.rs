//! Scalar column types and value coercion.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// An enum type whose values are stored by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumModel {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumModel {
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Match a label exactly, then case-insensitively.
    pub fn variant(&self, label: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.as_str() == label)
            .or_else(|| self.variants.iter().find(|v| v.eq_ignore_ascii_case(label)))
            .map(String::as_str)
    }
}

/// The declared type of a scalar field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Enum(EnumModel),
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl ScalarType {
    /// Type name used as the result type of value-collection aliases.
    pub fn name(&self) -> &str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Text => "text",
            ScalarType::Bytes => "bytes",
            ScalarType::Uuid => "uuid",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::Timestamp => "timestamp",
            ScalarType::TimestampTz => "timestamptz",
            ScalarType::Json => "json",
            ScalarType::Enum(model) => &model.name,
        }
    }

    /// Coerce a raw column value into this type.
    ///
    /// `Null` passes through. A value that cannot be converted is returned
    /// unchanged.
    pub fn coerce(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        match self.try_coerce(&value) {
            Some(coerced) => coerced,
            None => {
                tracing::trace!(
                    target: "relmap.reconstruct",
                    expected = self.name(),
                    got = value.kind(),
                    "keeping uncoercible value"
                );
                value
            }
        }
    }

    fn try_coerce(&self, value: &Value) -> Option<Value> {
        match self {
            ScalarType::Bool => coerce_bool(value),
            ScalarType::Int16 => coerce_int(value, i16::MIN as i64, i16::MAX as i64),
            ScalarType::Int32 => coerce_int(value, i32::MIN as i64, i32::MAX as i64),
            ScalarType::Int64 => coerce_int(value, i64::MIN, i64::MAX),
            ScalarType::Float32 | ScalarType::Float64 => match value {
                Value::Float(_) => Some(value.clone()),
                Value::Int(n) => Some(Value::Float(*n as f64)),
                Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            ScalarType::Text => match value {
                Value::Text(_) => Some(value.clone()),
                Value::Json(serde_json::Value::String(s)) => Some(Value::Text(s.clone())),
                Value::Json(_) | Value::Bytes(_) => None,
                other => Some(Value::Text(other.to_string())),
            },
            ScalarType::Bytes => match value {
                Value::Bytes(_) => Some(value.clone()),
                Value::Text(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
                _ => None,
            },
            ScalarType::Uuid => match value {
                Value::Uuid(_) => Some(value.clone()),
                Value::Text(s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
                Value::Bytes(b) => Uuid::from_slice(b).ok().map(Value::Uuid),
                _ => None,
            },
            ScalarType::Date => match value {
                Value::Date(_) => Some(value.clone()),
                Value::Timestamp(ts) => Some(Value::Date(ts.date())),
                Value::TimestampTz(ts) => Some(Value::Date(ts.naive_utc().date())),
                Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
                    .map(Value::Date),
                _ => None,
            },
            ScalarType::Time => match value {
                Value::Time(_) => Some(value.clone()),
                Value::Timestamp(ts) => Some(Value::Time(ts.time())),
                Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                    .ok()
                    .map(Value::Time),
                _ => None,
            },
            ScalarType::Timestamp => match value {
                Value::Timestamp(_) => Some(value.clone()),
                Value::TimestampTz(ts) => Some(Value::Timestamp(ts.naive_utc())),
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::Timestamp),
                Value::Int(ms) => {
                    DateTime::from_timestamp_millis(*ms).map(|ts| Value::Timestamp(ts.naive_utc()))
                }
                Value::Text(s) => parse_timestamp(s).map(Value::Timestamp),
                _ => None,
            },
            ScalarType::TimestampTz => match value {
                Value::TimestampTz(_) => Some(value.clone()),
                Value::Timestamp(ts) => Some(Value::TimestampTz(ts.and_utc())),
                Value::Date(d) => d
                    .and_hms_opt(0, 0, 0)
                    .map(|ts| Value::TimestampTz(ts.and_utc())),
                Value::Int(ms) => DateTime::from_timestamp_millis(*ms).map(Value::TimestampTz),
                Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|ts| ts.with_timezone(&Utc))
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|ts| ts.and_utc()))
                    .map(Value::TimestampTz),
                _ => None,
            },
            ScalarType::Json => match value {
                Value::Json(_) => Some(value.clone()),
                Value::Text(s) => Some(Value::Json(
                    serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone())),
                )),
                other => Some(Value::Json(other.to_json())),
            },
            ScalarType::Enum(model) => match value {
                Value::Text(s) => model.variant(s).map(|v| Value::Text(v.to_string())),
                Value::Int(n) => usize::try_from(*n)
                    .ok()
                    .and_then(|i| model.variants.get(i))
                    .map(|v| Value::Text(v.clone())),
                _ => None,
            },
        }
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Int(n) => Some(Value::Bool(*n != 0)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Some(Value::Bool(true)),
            "false" | "f" | "0" | "no" | "n" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &Value, min: i64, max: i64) -> Option<Value> {
    let n = match value {
        Value::Int(n) => *n,
        Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
            *f as i64
        }
        Value::Bool(b) => i64::from(*b),
        Value::Text(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (min..=max).contains(&n).then_some(Value::Int(n))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.naive_utc())
        })
}
