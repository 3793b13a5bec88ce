//! Moving record types in and out of SQL.
//!
//! A [`Bean`] lists its fields as [`Param`]s and accepts column text back
//! by name. [`FromValue`] converts a single column value into a Rust type
//! and backs both scalar selects and [`parse_field`].
//!
//! # Example
//!
//! ```
//! use sqlstencil_core::{parse_field, Bean, BeanError, Param};
//!
//! #[derive(Default)]
//! struct User {
//!     id: i64,
//!     name: Option<String>,
//! }
//!
//! impl Bean for User {
//!     fn to_params(&self) -> Vec<Param> {
//!         vec![Param::new("id", self.id), Param::new("name", self.name.clone())]
//!     }
//!
//!     fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), BeanError> {
//!         match name {
//!             "id" => self.id = parse_field(name, value)?,
//!             "name" => self.name = parse_field(name, value)?,
//!             other => return Err(BeanError::UnknownField(other.to_string())),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut user = User::default();
//! user.set_field("id", Some("42")).unwrap();
//! assert_eq!(user.id, 42);
//! assert_eq!(user.name, None);
//! ```

use chrono::NaiveDateTime;

use crate::error::BeanError;
use crate::value::{Param, TIMESTAMP_FORMAT, Value};

/// A record type that can be bound into queries and filled from rows.
pub trait Bean {
    /// Every field as a named parameter.
    fn to_params(&self) -> Vec<Param>;

    /// Stores a column's text form; `None` means SQL `NULL`.
    ///
    /// Implementations return [`BeanError::UnknownField`] for names they do
    /// not own; the mapper ignores those so result sets may carry extra
    /// columns.
    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), BeanError>;
}

/// Conversion from one column value.
pub trait FromValue: Sized {
    /// Converts `value`, naming `column` in any error.
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError>;
}

/// Parses a bean field from its column text.
pub fn parse_field<T: FromValue>(name: &str, value: Option<&str>) -> Result<T, BeanError> {
    let value = value.map_or(Value::Null, |text| Value::Text(text.to_string()));
    T::from_value(name, &value)
}

/// Reads a flag stored as `1`, `'1'` or `true` (any case).
///
/// ```
/// use sqlstencil_core::parse_bool;
///
/// assert!(parse_bool("1"));
/// assert!(parse_bool("'1'"));
/// assert!(parse_bool("TRUE"));
/// assert!(!parse_bool("0"));
/// assert!(!parse_bool("yes"));
/// ```
pub fn parse_bool(text: &str) -> bool {
    let text = text.trim();
    text == "1" || text == "'1'" || text.eq_ignore_ascii_case("true")
}

fn null_error(column: &str) -> BeanError {
    BeanError::invalid(column, "unexpected NULL")
}

impl FromValue for Value {
    fn from_value(_column: &str, value: &Value) -> Result<Self, BeanError> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        value.as_text().ok_or_else(|| null_error(column))
    }
}

impl FromValue for i64 {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Real(r) if r.fract() == 0.0 => Ok(*r as i64),
            Value::Text(s) => s.trim().parse().map_err(|e| BeanError::invalid(column, e)),
            Value::Null => Err(null_error(column)),
            other => Err(BeanError::invalid(
                column,
                format!("cannot read {other} as an integer"),
            )),
        }
    }
}

impl FromValue for i32 {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        let wide = i64::from_value(column, value)?;
        i32::try_from(wide).map_err(|e| BeanError::invalid(column, e))
    }
}

impl FromValue for f64 {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            Value::Text(s) => s.trim().parse().map_err(|e| BeanError::invalid(column, e)),
            Value::Null => Err(null_error(column)),
            other => Err(BeanError::invalid(
                column,
                format!("cannot read {other} as a real"),
            )),
        }
    }
}

impl FromValue for bool {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(i) => Ok(*i == 1),
            Value::Null => Err(null_error(column)),
            other => Ok(parse_bool(&other.to_string())),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Blob(bytes) => Ok(bytes.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            Value::Null => Err(null_error(column)),
            other => Err(BeanError::invalid(
                column,
                format!("cannot read {other} as bytes"),
            )),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(s) => NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
                .map_err(|e| BeanError::invalid(column, e)),
            Value::Null => Err(null_error(column)),
            other => Err(BeanError::invalid(
                column,
                format!("cannot read {other} as a timestamp"),
            )),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(column: &str, value: &Value) -> Result<Self, BeanError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(column, other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(i64::from_value("a", &Value::Text(" 12 ".into())).unwrap(), 12);
        assert_eq!(i64::from_value("a", &Value::Real(3.0)).unwrap(), 3);
        assert!(i64::from_value("a", &Value::Real(3.5)).is_err());
        assert!(i32::from_value("a", &Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn test_null_requires_option() {
        assert!(matches!(
            String::from_value("name", &Value::Null),
            Err(BeanError::InvalidValue { field, .. }) if field == "name"
        ));
        assert_eq!(Option::<String>::from_value("name", &Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value("n", &Value::Integer(2)).unwrap(),
            Some(2)
        );
    }

    #[test]
    fn test_bool_conversions() {
        assert!(bool::from_value("f", &Value::Integer(1)).unwrap());
        assert!(!bool::from_value("f", &Value::Integer(2)).unwrap());
        assert!(bool::from_value("f", &Value::Text("true".into())).unwrap());
        assert!(!bool::from_value("f", &Value::Text("no".into())).unwrap());
    }

    #[test]
    fn test_timestamp_from_text() {
        let ts = NaiveDateTime::from_value("at", &Value::Text("2023-01-02 03:04:05".into())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(ts, expected);
        assert!(NaiveDateTime::from_value("at", &Value::Text("yesterday".into())).is_err());
    }

    #[test]
    fn test_parse_field_from_text() {
        let n: f64 = parse_field("score", Some("2.5")).unwrap();
        assert_eq!(n, 2.5);
        let missing: Option<i32> = parse_field("n", None).unwrap();
        assert_eq!(missing, None);
        let bytes: Vec<u8> = parse_field("b", Some("ab")).unwrap();
        assert_eq!(bytes, b"ab".to_vec());
    }
}
