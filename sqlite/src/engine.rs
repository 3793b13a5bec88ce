//! The native SQL engine seam.
//!
//! A [`Session`](crate::Session) drives any [`Engine`]; the bundled
//! implementation is [`rusqlite::Connection`]. Reads come back fully
//! materialized as a [`RowSet`], so no cursor outlives the engine lock.

use rusqlite::Connection;
use rusqlite::types::{Type, ValueRef};
use sqlstencil_core::Value;

use crate::error::Result;
use crate::record::Record;

/// Executes SQL text.
pub trait Engine: Send {
    /// Runs one or more statements that return no rows.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Runs one statement and returns the number of changed rows.
    fn execute(&mut self, sql: &str) -> Result<usize>;

    /// Runs a query and collects every row.
    fn query(&mut self, sql: &str) -> Result<RowSet>;
}

impl Engine for Connection {
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        Connection::execute_batch(self, sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<usize> {
        Ok(Connection::execute(self, sql, [])?)
    }

    fn query(&mut self, sql: &str) -> Result<RowSet> {
        let mut stmt = self.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(convert_value(i, row.get_ref(i)?)?);
            }
            rows.push(values);
        }
        Ok(RowSet { columns, rows })
    }
}

/// TEXT that is not valid UTF-8 is an error rather than a lossy copy.
fn convert_value(index: usize, value: ValueRef<'_>) -> rusqlite::Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
            })?;
            Value::Text(text.to_string())
        }
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

/// Column names plus every row of a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Builds a row set; every row must be as wide as `columns`.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Position of `name` in the column list.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at `index`, if any.
    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows
            .get(index)
            .map(|values| Record::new(&self.columns, values))
    }

    /// Iterates over rows in result order.
    pub fn iter(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows
            .iter()
            .map(|values| Record::new(&self.columns, values))
    }

    /// First column of the first row, if present.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_materializes_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        Engine::execute_batch(
            &mut conn,
            "CREATE TABLE t (a INTEGER, b TEXT, c REAL, d BLOB);
             INSERT INTO t VALUES (1, 'x', 1.5, x'0102'), (2, NULL, NULL, NULL);",
        )
        .unwrap();

        let rows = Engine::query(&mut conn, "SELECT * FROM t ORDER BY a").unwrap();
        assert_eq!(rows.columns(), ["a", "b", "c", "d"]);
        assert_eq!(rows.len(), 2);

        let first = rows.record(0).unwrap();
        assert_eq!(first.value(0), Some(&Value::Integer(1)));
        assert_eq!(first.value("b"), Some(&Value::Text("x".into())));
        assert_eq!(first.value("d"), Some(&Value::Blob(vec![1, 2])));
        assert!(rows.record(1).unwrap().is_null("b"));
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        Engine::execute_batch(&mut conn, "CREATE TABLE t (a, b)").unwrap();
        let rows = Engine::query(&mut conn, "SELECT * FROM t LIMIT 0").unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.column_count(), 2);
        assert_eq!(rows.column_index("b"), Some(1));
        assert_eq!(rows.scalar(), None);
    }

    #[test]
    fn test_execute_counts_changes() {
        let mut conn = Connection::open_in_memory().unwrap();
        Engine::execute_batch(&mut conn, "CREATE TABLE t (a); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        assert_eq!(Engine::execute(&mut conn, "UPDATE t SET a = a + 1").unwrap(), 2);
    }

    #[test]
    fn test_invalid_utf8_text_is_an_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        Engine::execute_batch(
            &mut conn,
            "CREATE TABLE t (a TEXT); INSERT INTO t VALUES (CAST(x'ff61' AS TEXT));",
        )
        .unwrap();

        let err = Engine::query(&mut conn, "SELECT a FROM t").unwrap_err();
        assert!(matches!(
            err,
            crate::MapperError::DatabaseError(rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                _
            ))
        ));
    }
}
