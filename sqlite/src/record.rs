//! Typed access to one result row.

use sqlstencil_core::{FromValue, Param, Value, parse_bool};

use crate::error::{MapperError, Result};

/// Something that selects a column: a position or a name.
pub trait ColumnIndex {
    /// Resolves to a position in `columns`.
    fn index_in(&self, columns: &[String]) -> Option<usize>;

    /// Label used in error messages.
    fn label(&self) -> String;
}

impl ColumnIndex for usize {
    fn index_in(&self, columns: &[String]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn label(&self) -> String {
        format!("#{self}")
    }
}

impl ColumnIndex for &str {
    fn index_in(&self, columns: &[String]) -> Option<usize> {
        columns.iter().position(|c| c == self)
    }

    fn label(&self) -> String {
        (*self).to_string()
    }
}

impl ColumnIndex for String {
    fn index_in(&self, columns: &[String]) -> Option<usize> {
        self.as_str().index_in(columns)
    }

    fn label(&self) -> String {
        self.clone()
    }
}

/// A borrowed view of one row of a [`RowSet`](crate::RowSet).
///
/// # Examples
///
/// ```
/// use sqlstencil_core::Value;
/// use sqlstencil_sqlite::RowSet;
///
/// let rows = RowSet::new(
///     vec!["id".into(), "active".into()],
///     vec![vec![Value::Integer(7), Value::Text("1".into())]],
/// );
/// let record = rows.record(0).unwrap();
///
/// assert_eq!(record.long("id").unwrap(), 7);
/// assert!(record.boolean(1).unwrap());
/// assert!(!record.exists("name"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    pub(crate) fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        name.index_in(self.columns)
    }

    /// Returns `true` if the row has a column called `name`.
    pub fn exists(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// The raw value, or `None` for an unknown column.
    pub fn value(&self, column: impl ColumnIndex) -> Option<&'a Value> {
        column
            .index_in(self.columns)
            .and_then(|i| self.values.get(i))
    }

    /// Returns `true` for `NULL` and for unknown columns.
    pub fn is_null(&self, column: impl ColumnIndex) -> bool {
        self.value(column).is_none_or(Value::is_null)
    }

    /// Converts a column with [`FromValue`].
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::ColumnNotFound`] for unknown columns and
    /// [`MapperError::BeanError`] when the value does not convert.
    pub fn get<T: FromValue>(&self, column: impl ColumnIndex) -> Result<T> {
        let label = column.label();
        let value = self
            .value(column)
            .ok_or_else(|| MapperError::ColumnNotFound(label.clone()))?;
        Ok(T::from_value(&label, value)?)
    }

    /// The text form of a column; `None` for `NULL` or unknown columns.
    pub fn text(&self, column: impl ColumnIndex) -> Option<String> {
        self.value(column).and_then(Value::as_text)
    }

    pub fn int(&self, column: impl ColumnIndex) -> Result<i32> {
        self.get(column)
    }

    pub fn long(&self, column: impl ColumnIndex) -> Result<i64> {
        self.get(column)
    }

    pub fn real(&self, column: impl ColumnIndex) -> Result<f64> {
        self.get(column)
    }

    /// Reads a flag stored as `1`, `'1'` or `true`; `NULL` is `false`.
    pub fn boolean(&self, column: impl ColumnIndex) -> Result<bool> {
        let label = column.label();
        let value = self
            .value(column)
            .ok_or(MapperError::ColumnNotFound(label))?;
        Ok(value.as_text().is_some_and(|text| parse_bool(&text)))
    }

    pub fn blob(&self, column: impl ColumnIndex) -> Result<Option<Vec<u8>>> {
        self.get(column)
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Every column as a named parameter.
    pub fn to_params(&self) -> Vec<Param> {
        self.iter()
            .map(|(name, value)| Param::new(name, value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RowSet;

    fn sample() -> RowSet {
        RowSet::new(
            vec!["id".into(), "name".into(), "flag".into(), "data".into()],
            vec![vec![
                Value::Integer(3),
                Value::Null,
                Value::Text("true".into()),
                Value::Blob(vec![9]),
            ]],
        )
    }

    #[test]
    fn test_indexed_and_named_access_agree() {
        let rows = sample();
        let record = rows.record(0).unwrap();
        assert_eq!(record.value(0), record.value("id"));
        assert_eq!(record.int(0).unwrap(), 3);
        assert_eq!(record.real("id").unwrap(), 3.0);
    }

    #[test]
    fn test_null_handling() {
        let rows = sample();
        let record = rows.record(0).unwrap();
        assert!(record.is_null("name"));
        assert!(record.is_null("missing"));
        assert_eq!(record.text("name"), None);
        assert!(!record.boolean("name").unwrap());
        assert!(record.long("name").is_err());
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let rows = sample();
        let record = rows.record(0).unwrap();
        assert!(matches!(
            record.long("missing"),
            Err(MapperError::ColumnNotFound(c)) if c == "missing"
        ));
        assert!(record.value(10).is_none());
    }

    #[test]
    fn test_boolean_and_blob() {
        let rows = sample();
        let record = rows.record(0).unwrap();
        assert!(record.boolean("flag").unwrap());
        assert_eq!(record.blob("data").unwrap(), Some(vec![9]));
        assert_eq!(record.blob("name").unwrap(), None);
    }

    #[test]
    fn test_to_params_keeps_column_order() {
        let rows = sample();
        let params = rows.record(0).unwrap().to_params();
        let names: Vec<&str> = params.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["id", "name", "flag", "data"]);
    }
}
