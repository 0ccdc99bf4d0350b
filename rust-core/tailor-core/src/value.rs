//! # Value Model
//!
//! Every value the database layer can send or receive.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only represents values, drivers own the wire formats
//! - **L**: Every driver accepts and produces the same `Value` cases
//!
//! Equality is strict: two values are equal only when they are the same case
//! with the same payload, so `Integer(1)` never equals `Boolean(true)`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::Serialize;
use std::fmt;

/// A single database value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Signed 64-bit integer
    Integer(i64),
    /// Double precision float
    Double(f64),
    /// UTF-8 text
    String(String),
    /// Boolean
    Boolean(bool),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Point in time with its time zone
    Timestamp(DateTime<FixedOffset>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
}

impl Value {
    /// Whether this is `Null`
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the active case, for logs and diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Binary(_) => "binary",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
        }
    }

    /// The integer payload
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The double payload
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    /// The text payload
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// The boolean payload
    ///
    /// Databases without a boolean type hand booleans back as `Integer(0)` or
    /// `Integer(1)`, so those are accepted too.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            Self::Integer(0) => Some(false),
            Self::Integer(1) => Some(true),
            _ => None,
        }
    }

    /// The binary payload
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(value) => Some(value),
            _ => None,
        }
    }

    /// The timestamp payload
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    /// The date payload
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// The time payload
    #[must_use]
    pub const fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Binary(value) => write!(f, "<{} bytes>", value.len()),
            Self::Timestamp(value) => write!(f, "{}", value.format(crate::time::TIMESTAMP_FORMAT)),
            Self::Date(value) => write!(f, "{}", value.format(crate::time::DATE_FORMAT)),
            Self::Time(value) => write!(f, "{}", value.format(crate::time::TIME_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strict_equality() {
        assert_ne!(Value::Integer(1), Value::Boolean(true));
        assert_ne!(Value::Integer(1), Value::Double(1.0));
        assert_ne!(Value::String(String::new()), Value::Null);
        assert_eq!(Value::from("red"), Value::String("red".to_string()));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(10_i64)), Value::Integer(10));
    }

    #[test]
    fn test_as_bool_accepts_integer_flags() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(0).as_bool(), Some(false));
        assert_eq!(Value::Integer(1).as_bool(), Some(true));
        assert_eq!(Value::Integer(2).as_bool(), None);
    }

    #[test]
    fn test_accessors_reject_other_cases() {
        let value = Value::from(vec![1_u8, 2, 3]);
        assert_eq!(value.as_bytes(), Some(&[1_u8, 2, 3][..]));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.type_name(), "binary");
    }

    #[test]
    fn test_json_serialization() {
        let json =
            serde_json::to_string(&vec![Value::Null, Value::Integer(3), Value::from("hat")])
                .unwrap();
        assert_eq!(json, r#"[null,3,"hat"]"#);

        let zone = FixedOffset::east_opt(3600).unwrap();
        let timestamp = zone.with_ymd_and_hms(2015, 6, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_string(&Value::Timestamp(timestamp)).unwrap();
        assert!(json.starts_with("\"2015-06-01T12:00:00"));
    }

    #[test]
    fn test_display() {
        let date = NaiveDate::from_ymd_opt(2015, 6, 1).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2015-06-01");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
