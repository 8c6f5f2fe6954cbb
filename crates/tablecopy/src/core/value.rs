//! SQL value types moved between dialects.
//!
//! Every driver decodes its native row representation into [`SqlValue`] and
//! encodes [`SqlValue`] back into its own parameter types, so the copy engine
//! never sees driver-specific data.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A single, owned SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    Uuid(Uuid),
}

/// One extracted row, in source column order.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, parsing text when needed.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Decimal(d) => d.trunc().to_string().parse().ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view of the value, parsing text when needed.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SqlValue::I64(v) => Some(*v as f64),
            SqlValue::F64(v) => Some(*v),
            SqlValue::Decimal(d) => d.to_string().parse().ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Bool(b) => Some(Decimal::from(i64::from(*b))),
            SqlValue::I64(v) => Some(Decimal::from(*v)),
            SqlValue::F64(v) => Decimal::try_from(*v).ok(),
            SqlValue::Decimal(d) => Some(*d),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::I64(v) => Some(*v != 0),
            SqlValue::Decimal(d) => Some(!d.is_zero()),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Some(true),
                "0" | "f" | "false" | "n" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(dt) => Some(*dt),
            SqlValue::DateTimeTz(dt) => Some(dt.naive_utc()),
            SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
            SqlValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::DateTime(dt) => Some(dt.date()),
            SqlValue::DateTimeTz(dt) => Some(dt.date_naive()),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.date())),
            _ => None,
        }
    }

    pub fn to_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(t) => Some(*t),
            SqlValue::DateTime(dt) => Some(dt.time()),
            SqlValue::DateTimeTz(dt) => Some(dt.time()),
            SqlValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }

    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::DateTimeTz(dt) => Some(*dt),
            SqlValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.and_utc())),
            other => other.to_naive_datetime().map(|dt| dt.and_utc()),
        }
    }

    pub fn to_uuid(&self) -> Option<Uuid> {
        match self {
            SqlValue::Uuid(u) => Some(*u),
            SqlValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
            SqlValue::Bytes(b) => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bytes(b) => Some(b.clone()),
            other => Some(other.to_string().into_bytes()),
        }
    }

    /// Text rendering used when a target column only accepts strings.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Parse the timestamp shapes drivers commonly hand back as text.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::DateTimeTz(dt) => write!(f, "{}", dt.to_rfc3339()),
            SqlValue::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
