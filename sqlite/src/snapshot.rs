//! Table metadata read from a live database.

use serde::Serialize;
use tracing::debug;

use crate::engine::Engine;
use crate::error::{MapperError, Result};
use crate::session::Session;

const SQL_TABLE_LIST: &str = "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name";
const SYSTEM_TABLE_PREFIX: &str = "sqlite_";

/// Name, columns and row count of one user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub name: String,
    /// Column names in declaration order.
    pub columns: Vec<String>,
    pub row_count: u64,
}

impl TableSnapshot {
    pub fn has_rows(&self) -> bool {
        self.row_count > 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Columns present in both snapshots, in this table's order.
    pub fn migratable_columns(&self, target: &TableSnapshot) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| target.has_column(c))
            .cloned()
            .collect()
    }
}

/// Returns `true` for tables SQLite maintains itself.
pub fn is_system_table(name: &str) -> bool {
    name.starts_with(SYSTEM_TABLE_PREFIX)
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Snapshots every user table, ordered by name.
///
/// # Errors
///
/// Returns [`MapperError::NoSnapshot`] naming the table whose metadata
/// could not be read.
pub fn snapshot_tables<E: Engine>(session: &Session<E>) -> Result<Vec<TableSnapshot>> {
    let names = session
        .query(SQL_TABLE_LIST)
        .map_err(|e| no_snapshot("sqlite_master", e))?;

    let mut tables = Vec::with_capacity(names.len());
    for record in names.iter() {
        let Some(name) = record.text(0) else { continue };
        if is_system_table(&name) {
            continue;
        }
        tables.push(snapshot_table(session, &name)?);
    }
    debug!(tables = tables.len(), "Snapshot complete");
    Ok(tables)
}

/// Snapshots one table.
pub fn snapshot_table<E: Engine>(session: &Session<E>, name: &str) -> Result<TableSnapshot> {
    let quoted = quote_identifier(name);
    let columns = session
        .query(&format!("SELECT * FROM {quoted} LIMIT 0"))
        .map_err(|e| no_snapshot(name, e))?
        .columns()
        .to_vec();

    let counted = session
        .query(&format!("SELECT COUNT(ROWID) FROM {quoted}"))
        .map_err(|e| no_snapshot(name, e))?;
    let row_count = counted
        .record(0)
        .map(|r| r.long(0))
        .transpose()?
        .unwrap_or(0);

    Ok(TableSnapshot {
        name: name.to_string(),
        columns,
        row_count: u64::try_from(row_count).unwrap_or(0),
    })
}

fn no_snapshot(table: &str, error: MapperError) -> MapperError {
    match error {
        MapperError::DatabaseError(source) => MapperError::NoSnapshot {
            table: table.to_string(),
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn session() -> Session {
        let session = Session::new(Connection::open_in_memory().unwrap());
        session
            .execute_raw(
                "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER);
                 CREATE TABLE \"odd\"\"name\" (x);
                 INSERT INTO users (name, age) VALUES ('a', 1), ('b', 2);",
            )
            .unwrap();
        session
    }

    #[test]
    fn test_snapshot_excludes_system_tables() {
        let tables = snapshot_tables(&session()).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        // AUTOINCREMENT creates sqlite_sequence
        assert_eq!(names, ["odd\"name", "users"]);
    }

    #[test]
    fn test_snapshot_columns_and_counts() {
        let users = snapshot_table(&session(), "users").unwrap();
        assert_eq!(users.columns, ["id", "name", "age"]);
        assert_eq!(users.row_count, 2);
        assert!(users.has_rows());
    }

    #[test]
    fn test_migratable_columns_keep_source_order() {
        let old = TableSnapshot {
            name: "t".into(),
            columns: vec!["c".into(), "a".into(), "b".into()],
            row_count: 1,
        };
        let new = TableSnapshot {
            name: "t".into(),
            columns: vec!["a".into(), "b".into(), "d".into()],
            row_count: 0,
        };
        assert_eq!(old.migratable_columns(&new), ["a", "b"]);
    }

    #[test]
    fn test_missing_table_is_no_snapshot() {
        let err = snapshot_table(&session(), "nope").unwrap_err();
        assert!(matches!(err, MapperError::NoSnapshot { ref table, .. } if table == "nope"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
