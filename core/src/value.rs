//! Parameter values and their SQL renderings.
//!
//! A [`Param`] binds a name to a [`Value`]. Before a value is substituted
//! into template text it passes through [`Value::formatted`], the per-type
//! literal-formatting step: strings are quote-escaped, booleans become
//! `0`/`1`, and timestamps become fixed-format text.
//!
//! # Examples
//!
//! ```
//! use sqlstencil_core::{Param, ParamMap, Value};
//!
//! let params = [Param::new("name", "O'Brien"), Param::new("active", true)];
//! let map = ParamMap::from_params(&params);
//!
//! assert_eq!(map.get("name"), Some(&Value::Text("O''Brien".into())));
//! assert_eq!(map.get("active"), Some(&Value::Integer(1)));
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fixed timestamp format used for every date value written to SQL.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A dynamically typed parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// SQL `NULL` / an absent value (the default).
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// Date and time without a zone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Applies the per-type literal-formatting step.
    ///
    /// Text has every `'` doubled, booleans become `Integer(0 | 1)` and
    /// timestamps become text in [`TIMESTAMP_FORMAT`]. Other variants are
    /// returned unchanged.
    pub fn formatted(&self) -> Value {
        match self {
            Value::Text(s) => Value::Text(escape_quotes(s)),
            Value::Bool(b) => Value::Integer(i64::from(*b)),
            Value::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
            other => other.clone(),
        }
    }

    /// Renders the value as a standalone SQL literal.
    ///
    /// ```
    /// use sqlstencil_core::Value;
    ///
    /// assert_eq!(Value::Null.to_sql_literal(), "NULL");
    /// assert_eq!(Value::Integer(7).to_sql_literal(), "7");
    /// assert_eq!(Value::Text("it's".into()).to_sql_literal(), "'it''s'");
    /// assert_eq!(Value::Blob(vec![0xca, 0xfe]).to_sql_literal(), "X'CAFE'");
    /// ```
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => i64::from(*b).to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => real_literal(*r),
            Value::Text(s) => format!("'{}'", escape_quotes(s)),
            Value::Blob(bytes) => hex_literal(bytes),
            Value::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
        }
    }

    /// Returns the string form used by cursors, or `None` for `NULL`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(bytes) => f.write_str(&hex_literal(bytes)),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Doubles every single quote so the text can sit inside a SQL string literal.
pub fn escape_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

/// Always carries a decimal point or exponent so SQLite keeps the REAL type.
/// Infinities use an overflowing literal, which SQLite reads back as ±inf.
fn real_literal(r: f64) -> String {
    if r.is_nan() {
        "NULL".to_string()
    } else if r.is_infinite() {
        if r > 0.0 { "9e999" } else { "-9e999" }.to_string()
    } else {
        format!("{r:?}")
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out.push('\'');
    out
}

/// An immutable name/value pair bound into a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    name: String,
    value: Value,
}

impl Param {
    /// Creates a parameter from anything convertible into a [`Value`].
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a parameter bound to `NULL`.
    pub fn null(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the parameter, returning its value.
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Lookup table of formatted parameter values keyed by name.
///
/// Built from caller-owned params; every value has already been through
/// [`Value::formatted`]. When a name repeats, the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: HashMap<String, Value>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the lookup from a parameter slice, formatting each value.
    pub fn from_params(params: &[Param]) -> Self {
        let values = params
            .iter()
            .map(|p| (p.name.clone(), p.value.formatted()))
            .collect();
        Self { values }
    }

    /// Returns the bound value, or `None` when the name was never bound.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns `true` if the name is absent or bound to `NULL`.
    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).is_none_or(Value::is_null)
    }

    /// String form of the bound value; absent names render as `null`.
    pub fn string_form(&self, name: &str) -> String {
        self.get(name)
            .map_or_else(|| Value::Null.to_string(), ToString::to_string)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
