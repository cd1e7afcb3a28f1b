use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgTypeKind, Postgres};
use sqlx::{Column, Row, TypeInfo};
use std::fmt;
use uuid::Uuid;

/// A single column value decoded from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Json(JsonValue),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(PgInterval),
    Array(Vec<SqlValue>),
    /// The column type could not be decoded; holds the type name.
    Unsupported(String),
}

/// One result row, rendered tuple-style: `('value1', 42)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow(pub Vec<SqlValue>);

impl ResultRow {
    /// Decodes every column of a driver row.
    pub fn from_pg_row(row: &PgRow) -> Self {
        let values = (0..row.columns().len())
            .map(|idx| decode_column(row, idx))
            .collect();
        Self(values)
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        // A one-element tuple keeps its trailing comma.
        if self.0.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("None"),
            SqlValue::Bool(true) => f.write_str("True"),
            SqlValue::Bool(false) => f.write_str("False"),
            SqlValue::Int(v) => write!(f, "{v}"),
            // Debug keeps the fractional part on whole numbers (`2.0`).
            SqlValue::Float(v) => write!(f, "{v:?}"),
            SqlValue::Decimal(v) => write!(f, "Decimal('{v}')"),
            SqlValue::Text(v) => write_quoted(f, v),
            SqlValue::Bytes(v) => write_bytes(f, v),
            SqlValue::Uuid(v) => write_quoted(f, &v.to_string()),
            SqlValue::Json(v) => write_quoted(f, &v.to_string()),
            SqlValue::Date(v) => write_quoted(f, &v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => write_quoted(f, &v.format("%H:%M:%S%.f").to_string()),
            SqlValue::Timestamp(v) => {
                write_quoted(f, &v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            SqlValue::TimestampTz(v) => {
                write_quoted(f, &v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
            }
            SqlValue::Interval(v) => write_quoted(f, &format_interval(v)),
            SqlValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            SqlValue::Unsupported(type_name) => write!(f, "<unsupported {type_name}>"),
        }
    }
}

/// Single-quotes a string. Escapes keep every row on one output line.
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\x{:02x}", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

/// PostgreSQL's default interval output: `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(v: &PgInterval) -> String {
    fn unit(n: i32, name: &str, plural: &str) -> Option<String> {
        match n {
            0 => None,
            1 => Some(format!("{n} {name}")),
            n => Some(format!("{n} {plural}")),
        }
    }

    let mut parts: Vec<String> = [
        unit(v.months / 12, "year", "years"),
        unit(v.months % 12, "mon", "mons"),
        unit(v.days, "day", "days"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if v.microseconds != 0 || parts.is_empty() {
        let sign = if v.microseconds < 0 { "-" } else { "" };
        let total = v.microseconds.unsigned_abs();
        let secs = total / 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let micros = total % 1_000_000;
        if micros != 0 {
            let fraction = format!("{micros:06}");
            time.push('.');
            time.push_str(fraction.trim_end_matches('0'));
        }
        parts.push(time);
    }

    parts.join(" ")
}

fn write_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("b'")?;
    for &b in bytes {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            0x20..=0x7e => write!(f, "{}", b as char)?,
            _ => write!(f, "\\x{b:02x}")?,
        }
    }
    f.write_str("'")
}

/// Reads a nullable column as `T`, mapping SQL NULL to [`SqlValue::Null`].
fn decode<'r, T>(
    row: &'r PgRow,
    idx: usize,
    wrap: impl FnOnce(T) -> SqlValue,
) -> Result<SqlValue, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    Ok(row
        .try_get::<Option<T>, _>(idx)?
        .map(wrap)
        .unwrap_or(SqlValue::Null))
}

/// Reads a one-dimensional array; NULL elements become [`SqlValue::Null`].
fn decode_array<'r, T>(
    row: &'r PgRow,
    idx: usize,
    wrap: impl Fn(T) -> SqlValue,
) -> Result<SqlValue, sqlx::Error>
where
    Vec<Option<T>>: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    decode::<Vec<Option<T>>>(row, idx, |items| {
        SqlValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&wrap).unwrap_or(SqlValue::Null))
                .collect(),
        )
    })
}

fn decode_column(row: &PgRow, idx: usize) -> SqlValue {
    let type_info = row.columns()[idx].type_info();
    let type_name = type_info.name();

    let decoded = match type_name {
        "BOOL" => decode::<bool>(row, idx, SqlValue::Bool),
        "INT2" => decode::<i16>(row, idx, |v| SqlValue::Int(v.into())),
        "INT4" => decode::<i32>(row, idx, |v| SqlValue::Int(v.into())),
        "INT8" => decode::<i64>(row, idx, SqlValue::Int),
        "OID" => decode::<sqlx::postgres::types::Oid>(row, idx, |v| SqlValue::Int(v.0.into())),
        "FLOAT4" => decode::<f32>(row, idx, |v| SqlValue::Float(v.into())),
        "FLOAT8" => decode::<f64>(row, idx, SqlValue::Float),
        "NUMERIC" => decode::<Decimal>(row, idx, SqlValue::Decimal),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            decode::<String>(row, idx, SqlValue::Text)
        }
        "BYTEA" => decode::<Vec<u8>>(row, idx, SqlValue::Bytes),
        "UUID" => decode::<Uuid>(row, idx, SqlValue::Uuid),
        "JSON" | "JSONB" => decode::<JsonValue>(row, idx, SqlValue::Json),
        "DATE" => decode::<NaiveDate>(row, idx, SqlValue::Date),
        "TIME" => decode::<NaiveTime>(row, idx, SqlValue::Time),
        "TIMESTAMP" => decode::<NaiveDateTime>(row, idx, SqlValue::Timestamp),
        "TIMESTAMPTZ" => decode::<DateTime<Utc>>(row, idx, SqlValue::TimestampTz),
        "INTERVAL" => decode::<PgInterval>(row, idx, SqlValue::Interval),
        "VOID" => Ok(SqlValue::Null),
        "BOOL[]" => decode_array::<bool>(row, idx, SqlValue::Bool),
        "INT2[]" => decode_array::<i16>(row, idx, |v| SqlValue::Int(v.into())),
        "INT4[]" => decode_array::<i32>(row, idx, |v| SqlValue::Int(v.into())),
        "INT8[]" => decode_array::<i64>(row, idx, SqlValue::Int),
        "FLOAT4[]" => decode_array::<f32>(row, idx, |v| SqlValue::Float(v.into())),
        "FLOAT8[]" => decode_array::<f64>(row, idx, SqlValue::Float),
        "NUMERIC[]" => decode_array::<Decimal>(row, idx, SqlValue::Decimal),
        "TEXT[]" | "VARCHAR[]" => decode_array::<String>(row, idx, SqlValue::Text),
        "UUID[]" => decode_array::<Uuid>(row, idx, SqlValue::Uuid),
        "DATE[]" => decode_array::<NaiveDate>(row, idx, SqlValue::Date),
        "TIMESTAMP[]" => decode_array::<NaiveDateTime>(row, idx, SqlValue::Timestamp),
        "TIMESTAMPTZ[]" => decode_array::<DateTime<Utc>>(row, idx, SqlValue::TimestampTz),
        // Enum values arrive as their label bytes.
        _ if matches!(type_info.kind(), PgTypeKind::Enum(_)) => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .map(|v| v.map(SqlValue::Text).unwrap_or(SqlValue::Null)),
        _ => Ok(SqlValue::Unsupported(type_name.to_string())),
    };

    decoded.unwrap_or_else(|e| {
        tracing::debug!(column = idx, type_name, error = %e, "Column could not be decoded.");
        SqlValue::Unsupported(type_name.to_string())
    })
}
