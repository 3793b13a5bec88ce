//! Row transfer between two schema versions of one database.
//!
//! A [`Migrator`] compares `PRAGMA user_version` of an old and a freshly
//! created database. When the new file is newer, every table present in
//! both is copied over column by column inside one `EXCLUSIVE`
//! transaction on the new database. A [`RetentionPolicy`] decides which
//! tables, rows and columns survive and whether a row is inserted or
//! written over an existing row with the same `ROWID`.
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use sqlstencil_sqlite::{MigrationStatus, Migrator, Session};
//!
//! let old = Session::new(Connection::open_in_memory().unwrap());
//! old.execute_raw("CREATE TABLE t (a, b); INSERT INTO t VALUES (1, 'x');").unwrap();
//! old.set_user_version(1).unwrap();
//!
//! let new = Session::new(Connection::open_in_memory().unwrap());
//! new.execute_raw("CREATE TABLE t (a, b, c DEFAULT 0)").unwrap();
//! new.set_user_version(2).unwrap();
//!
//! let report = Migrator::new(&old, &new).run().unwrap();
//! assert_eq!(report.status, MigrationStatus::Migrated);
//! assert_eq!(report.inserted, 1);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use sqlstencil_core::{Disposition, TransactionMode, Value};
use sqlstencil_db::RetentionConfig;
use tracing::{debug, info, warn};

use crate::database::open_session;
use crate::engine::{Engine, RowSet};
use crate::error::{MapperError, Result};
use crate::record::Record;
use crate::session::{Session, TransactionOutcome};
use crate::snapshot::{TableSnapshot, quote_identifier, snapshot_tables};

const ROWID_ALIAS: &str = "_migrate_rowid_";
const SQL_OPTIMIZE: &str = "VACUUM";

/// Decides what survives a migration.
///
/// Every method has a permissive default: keep every table, row and
/// column, and write rows over matching identities.
pub trait RetentionPolicy {
    /// Tables never copied.
    fn ignores_table(&self, _table: &str) -> bool {
        false
    }

    /// Columns never written by an update or insert.
    fn ignores_column(&self, _table: &str, _column: &str) -> bool {
        false
    }

    fn can_save_table(&self, _table: &str, _old_version: i64, _new_version: i64) -> bool {
        true
    }

    /// What to do with one old row. The record excludes the row identity.
    fn record_disposition(
        &self,
        _table: &str,
        _record: &Record<'_>,
        _old_version: i64,
        _new_version: i64,
    ) -> Disposition {
        Disposition::Update
    }

    /// Consulted for each column of an update.
    fn can_save_column(
        &self,
        _table: &str,
        _column: &str,
        _value: &Value,
        _old_version: i64,
        _new_version: i64,
    ) -> bool {
        true
    }
}

/// A [`RetentionPolicy`] driven by a [`RetentionConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetentionRules {
    config: RetentionConfig,
}

impl RetentionRules {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    /// Loads and validates a YAML retention file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(RetentionConfig::load(path)?))
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }
}

impl From<RetentionConfig> for RetentionRules {
    fn from(config: RetentionConfig) -> Self {
        Self::new(config)
    }
}

impl RetentionPolicy for RetentionRules {
    fn ignores_table(&self, table: &str) -> bool {
        self.config.is_table_ignored(table)
    }

    fn ignores_column(&self, table: &str, column: &str) -> bool {
        self.config.is_column_ignored(table, column)
    }

    fn record_disposition(
        &self,
        table: &str,
        _record: &Record<'_>,
        _old_version: i64,
        _new_version: i64,
    ) -> Disposition {
        self.config.disposition_for(table)
    }
}

/// Whether a run changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// The new database is not newer; nothing was issued.
    UpToDate,
    /// Rows were transferred.
    Migrated,
}

/// Summary of one [`Migrator::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    pub old_version: i64,
    pub new_version: i64,
    /// Tables whose rows were transferred.
    pub tables: usize,
    pub skipped_tables: Vec<String>,
    pub inserted: usize,
    pub updated: usize,
    /// Rows dropped by the policy or left without writable columns.
    pub skipped: usize,
    /// `true` only when the transfer ended in a `COMMIT`.
    pub committed: bool,
}

impl MigrationReport {
    fn new(old_version: i64, new_version: i64) -> Self {
        Self {
            status: MigrationStatus::UpToDate,
            old_version,
            new_version,
            tables: 0,
            skipped_tables: Vec::new(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            committed: false,
        }
    }
}

/// Copies rows from an old database into a newer one.
pub struct Migrator<'a, E: Engine = Connection> {
    old: &'a Session<E>,
    new: &'a Session<E>,
    policy: Option<&'a dyn RetentionPolicy>,
}

impl<'a, E: Engine> Migrator<'a, E> {
    pub fn new(old: &'a Session<E>, new: &'a Session<E>) -> Self {
        Self {
            old,
            new,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: &'a dyn RetentionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Returns `true` if the new database has a higher `user_version`.
    pub fn needs_update(&self) -> Result<bool> {
        Ok(self.new.user_version()? > self.old.user_version()?)
    }

    /// Transfers rows, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::NoSnapshot`] if table metadata cannot be
    /// read, or the first statement error; the new database is rolled
    /// back in both cases.
    pub fn run(&self) -> Result<MigrationReport> {
        let old_version = self.old.user_version()?;
        let new_version = self.new.user_version()?;
        let mut report = MigrationReport::new(old_version, new_version);

        if new_version <= old_version {
            info!(old_version, new_version, "Database is up to date");
            return Ok(report);
        }

        let old_tables = snapshot_tables(self.old)?;
        let new_tables: BTreeMap<String, TableSnapshot> = snapshot_tables(self.new)?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        info!(
            old_version,
            new_version,
            tables = old_tables.len(),
            "Migrating database"
        );

        let result = self.new.transaction(TransactionMode::Exclusive, |session| {
            for old_table in &old_tables {
                let Some(new_table) = new_tables.get(&old_table.name) else {
                    report.skipped_tables.push(old_table.name.clone());
                    continue;
                };
                if !self.should_copy(old_table, new_table, old_version, new_version) {
                    report.skipped_tables.push(old_table.name.clone());
                    continue;
                }
                if self.copy_table(session, old_table, new_table, &mut report)? {
                    report.tables += 1;
                } else {
                    report.skipped_tables.push(old_table.name.clone());
                }
            }
            Ok(())
        });

        match result {
            Ok(((), outcome)) => {
                report.status = MigrationStatus::Migrated;
                report.committed = outcome == TransactionOutcome::Committed;
                info!(
                    tables = report.tables,
                    inserted = report.inserted,
                    updated = report.updated,
                    skipped = report.skipped,
                    committed = report.committed,
                    "Migration finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Migration rolled back");
                Err(e)
            }
        }
    }

    fn should_copy(
        &self,
        old_table: &TableSnapshot,
        new_table: &TableSnapshot,
        old_version: i64,
        new_version: i64,
    ) -> bool {
        if !old_table.has_rows() {
            return false;
        }
        match self.policy {
            None => !new_table.has_rows(),
            Some(policy) => {
                !policy.ignores_table(&old_table.name)
                    && policy.can_save_table(&old_table.name, old_version, new_version)
            }
        }
    }

    /// Returns `false` when the tables share no columns.
    fn copy_table(
        &self,
        session: &Session<E>,
        old_table: &TableSnapshot,
        new_table: &TableSnapshot,
        report: &mut MigrationReport,
    ) -> Result<bool> {
        let columns = old_table.migratable_columns(new_table);
        if columns.is_empty() {
            warn!(table = %old_table.name, "No shared columns; table skipped");
            return Ok(false);
        }

        let table = quote_identifier(&old_table.name);
        let column_list = join_identifiers(&columns);
        let rows = self.old.query(&format!(
            "SELECT ROWID AS {ROWID_ALIAS}, {column_list} FROM {table} ORDER BY ROWID"
        ))?;
        debug!(table = %old_table.name, rows = rows.len(), "Copying table");

        match self.policy {
            None => {
                for record in rows.iter() {
                    let values = &record.values()[1..];
                    session.execute(&insert_sql(&table, &column_list, values))?;
                    report.inserted += 1;
                }
            }
            Some(policy) => self.copy_with_policy(session, policy, &old_table.name, &rows, report)?,
        }
        Ok(true)
    }

    fn copy_with_policy(
        &self,
        session: &Session<E>,
        policy: &dyn RetentionPolicy,
        name: &str,
        rows: &RowSet,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let table = quote_identifier(name);
        let existing = row_ids(session, &table)?;
        let (old_version, new_version) = (report.old_version, report.new_version);

        for row in rows.iter() {
            let row_id = row_id(&row)?;
            let record = Record::new(&row.columns()[1..], &row.values()[1..]);

            let disposition = policy.record_disposition(name, &record, old_version, new_version);
            let overwrite = match disposition {
                Disposition::Skip => {
                    report.skipped += 1;
                    continue;
                }
                Disposition::Update => true,
                Disposition::Insert => existing.contains(&row_id),
            };

            if overwrite {
                let assignments: Vec<String> = record
                    .iter()
                    .filter(|(column, value)| {
                        !policy.ignores_column(name, column)
                            && policy.can_save_column(name, column, value, old_version, new_version)
                    })
                    .map(|(column, value)| {
                        format!("{} = {}", quote_identifier(column), value.to_sql_literal())
                    })
                    .collect();
                if assignments.is_empty() {
                    report.skipped += 1;
                    continue;
                }
                let changed = session.execute(&format!(
                    "UPDATE {table} SET {} WHERE ROWID = {row_id}",
                    assignments.join(", ")
                ))?;
                if changed > 0 {
                    report.updated += 1;
                } else {
                    report.skipped += 1;
                }
            } else {
                let (columns, values): (Vec<&str>, Vec<Value>) = record
                    .iter()
                    .filter(|(column, _)| !policy.ignores_column(name, column))
                    .map(|(column, value)| (column, value.clone()))
                    .unzip();
                if columns.is_empty() {
                    report.skipped += 1;
                    continue;
                }
                session.execute(&insert_sql(&table, &join_identifiers(&columns), &values))?;
                report.inserted += 1;
            }
        }
        Ok(())
    }
}

fn join_identifiers<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql(table: &str, column_list: &str, values: &[Value]) -> String {
    let literals: Vec<String> = values.iter().map(Value::to_sql_literal).collect();
    format!(
        "INSERT INTO {table} ({column_list}) VALUES ({})",
        literals.join(", ")
    )
}

fn row_id(record: &Record<'_>) -> Result<i64> {
    match record.value(0) {
        Some(Value::Integer(id)) => Ok(*id),
        other => Err(MapperError::MigrationError(format!(
            "row without integer ROWID: {other:?}"
        ))),
    }
}

fn row_ids<E: Engine>(session: &Session<E>, table: &str) -> Result<HashSet<i64>> {
    let rows = session.query(&format!("SELECT ROWID FROM {table}"))?;
    rows.iter().map(|r| r.long(0)).collect()
}

/// Upgrades the file at `old_path` with the schema of `new_path`.
///
/// On a committed migration the old file is replaced by the new one.
/// Otherwise the new file is deleted. See
/// [`update_database_file_with`] to keep it.
pub fn update_database_file(
    old_path: impl AsRef<Path>,
    new_path: impl AsRef<Path>,
    policy: Option<&dyn RetentionPolicy>,
) -> Result<MigrationReport> {
    update_database_file_with(old_path, new_path, policy, false)
}

/// [`update_database_file`] with control over deleting an unused new file.
pub fn update_database_file_with(
    old_path: impl AsRef<Path>,
    new_path: impl AsRef<Path>,
    policy: Option<&dyn RetentionPolicy>,
    keep_new: bool,
) -> Result<MigrationReport> {
    let old_path = old_path.as_ref();
    let new_path = new_path.as_ref();

    let result = migrate_files(old_path, new_path, policy);
    match &result {
        Ok(report) if report.committed => {
            replace_file(new_path, old_path)?;
            info!(path = %old_path.display(), "Replaced database with upgraded file");
        }
        _ if keep_new => {
            debug!(path = %new_path.display(), "Keeping unused database file");
        }
        _ => {
            if let Err(e) = fs::remove_file(new_path) {
                warn!(path = %new_path.display(), error = %e, "Failed to delete unused database file");
            }
        }
    }
    result
}

/// Moves `from` over `to`. The target is replaced in one step, so a failed
/// move leaves `to` untouched.
fn replace_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)?;
    Ok(())
}

fn migrate_files(
    old_path: &Path,
    new_path: &Path,
    policy: Option<&dyn RetentionPolicy>,
) -> Result<MigrationReport> {
    let timeout = Duration::from_millis(sqlstencil_db::DEFAULT_BUSY_TIMEOUT_MS);
    let old = open_session(old_path, true, timeout)?;
    let new = open_session(new_path, false, timeout)?;

    let migrator = Migrator::new(&old, &new);
    let report = match policy {
        Some(policy) => migrator.with_policy(policy).run()?,
        None => migrator.run()?,
    };
    new.close()?;
    old.close()?;
    Ok(report)
}

/// Compacts the database file with `VACUUM`.
///
/// # Errors
///
/// Returns [`MapperError::MigrationError`] if a transaction is open on
/// the session.
pub fn optimize<E: Engine>(session: &Session<E>) -> Result<()> {
    if session.in_transaction() {
        return Err(MapperError::MigrationError(
            "cannot optimize inside a transaction".into(),
        ));
    }
    session.execute_raw(SQL_OPTIMIZE)?;
    info!("Optimized database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use sqlstencil_core::FromValue;

    fn session(schema: &str, version: i64) -> Session {
        let session = Session::new(Connection::open_in_memory().unwrap());
        session.execute_raw(schema).unwrap();
        session.set_user_version(version).unwrap();
        session
    }

    fn rows(session: &Session, sql: &str) -> Vec<Vec<Value>> {
        let set = session.query(sql).unwrap();
        set.iter().map(|r| r.values().to_vec()).collect()
    }

    fn count(session: &Session, table: &str) -> i64 {
        let set = session.query(&format!("SELECT COUNT(*) FROM {table}")).unwrap();
        i64::from_value("count", set.scalar().unwrap()).unwrap()
    }

    #[test]
    fn test_added_column_takes_default() {
        let old = session(
            "CREATE TABLE t (a INTEGER, b TEXT);
             INSERT INTO t VALUES (1, 'x'), (2, NULL);",
            1,
        );
        let new = session("CREATE TABLE t (a INTEGER, b TEXT, c INTEGER DEFAULT 7)", 2);

        let report = Migrator::new(&old, &new).run().unwrap();
        assert_eq!(report.status, MigrationStatus::Migrated);
        assert!(report.committed);
        assert_eq!(report.tables, 1);
        assert_eq!(report.inserted, 2);
        assert_eq!(
            rows(&new, "SELECT a, b, c FROM t ORDER BY a"),
            vec![
                vec![Value::Integer(1), Value::Text("x".into()), Value::Integer(7)],
                vec![Value::Integer(2), Value::Null, Value::Integer(7)],
            ]
        );
    }

    #[test]
    fn test_same_version_is_noop() {
        let old = session("CREATE TABLE t (a); INSERT INTO t VALUES (1);", 3);
        let new = session("CREATE TABLE t (a)", 3);

        let migrator = Migrator::new(&old, &new);
        assert!(!migrator.needs_update().unwrap());
        let report = migrator.run().unwrap();
        assert_eq!(report.status, MigrationStatus::UpToDate);
        assert!(!report.committed);
        assert_eq!(count(&new, "t"), 0);
    }

    #[test]
    fn test_without_policy_populated_tables_are_skipped() {
        let old = session("CREATE TABLE t (a); INSERT INTO t VALUES (1);", 1);
        let new = session("CREATE TABLE t (a); INSERT INTO t VALUES (9);", 2);

        let report = Migrator::new(&old, &new).run().unwrap();
        assert_eq!(report.skipped_tables, ["t"]);
        assert_eq!(count(&new, "t"), 1);
    }

    #[test]
    fn test_tables_missing_from_new_are_skipped() {
        let old = session(
            "CREATE TABLE gone (a); INSERT INTO gone VALUES (1);
             CREATE TABLE kept (a); INSERT INTO kept VALUES (2);",
            1,
        );
        let new = session("CREATE TABLE kept (a)", 2);

        let report = Migrator::new(&old, &new).run().unwrap();
        assert_eq!(report.tables, 1);
        assert_eq!(report.skipped_tables, ["gone"]);
    }

    #[test]
    fn test_skip_policy_copies_nothing() {
        struct SkipAll;
        impl RetentionPolicy for SkipAll {
            fn record_disposition(&self, _: &str, _: &Record<'_>, _: i64, _: i64) -> Disposition {
                Disposition::Skip
            }
        }

        let old = session("CREATE TABLE t (a); INSERT INTO t VALUES (1), (2);", 1);
        let new = session("CREATE TABLE t (a)", 2);

        let report = Migrator::new(&old, &new).with_policy(&SkipAll).run().unwrap();
        assert_eq!(report.skipped, 2);
        assert!(report.committed);
        assert_eq!(count(&new, "t"), 0);
    }

    #[test]
    fn test_update_policy_leaves_ignored_columns() {
        let old = session(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, token TEXT);
             INSERT INTO users VALUES (1, 'ann', 'old-token');",
            1,
        );
        let new = session(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, token TEXT);
             INSERT INTO users VALUES (1, 'seed', 'new-token');",
            2,
        );

        let mut config = RetentionConfig::default();
        config
            .ignore_columns
            .insert("users".into(), vec!["token".into()]);
        let rules = RetentionRules::new(config);

        let report = Migrator::new(&old, &new).with_policy(&rules).run().unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(
            rows(&new, "SELECT name, token FROM users"),
            vec![vec![
                Value::Text("ann".into()),
                Value::Text("new-token".into())
            ]]
        );
    }

    #[test]
    fn test_insert_disposition_appends_fresh_rows() {
        let old = session(
            "CREATE TABLE log (msg TEXT);
             INSERT INTO log VALUES ('first'), ('second');",
            1,
        );
        let new = session("CREATE TABLE log (msg TEXT); INSERT INTO log VALUES ('seed');", 2);

        let mut config = RetentionConfig::default();
        config.default_disposition = Disposition::Insert;
        let rules = RetentionRules::new(config);

        let report = Migrator::new(&old, &new).with_policy(&rules).run().unwrap();
        // ROWID 1 exists in new and is overwritten; ROWID 2 is inserted
        assert_eq!((report.updated, report.inserted), (1, 1));
        assert_eq!(
            rows(&new, "SELECT msg FROM log ORDER BY ROWID"),
            vec![
                vec![Value::Text("first".into())],
                vec![Value::Text("second".into())]
            ]
        );
    }

    #[test]
    fn test_ignored_table_is_skipped() {
        let old = session("CREATE TABLE cache (k); INSERT INTO cache VALUES (1);", 1);
        let new = session("CREATE TABLE cache (k)", 2);
        let mut config = RetentionConfig::default();
        config.ignore_tables.push("cache".into());
        let rules = RetentionRules::from(config);

        let report = Migrator::new(&old, &new).with_policy(&rules).run().unwrap();
        assert_eq!(report.skipped_tables, ["cache"]);
        assert_eq!(count(&new, "cache"), 0);
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let old = session(
            "CREATE TABLE a (x); INSERT INTO a VALUES (1);
             CREATE TABLE b (x); INSERT INTO b VALUES (NULL);",
            1,
        );
        let new = session("CREATE TABLE a (x); CREATE TABLE b (x NOT NULL);", 2);

        assert!(Migrator::new(&old, &new).run().is_err());
        assert_eq!(count(&new, "a"), 0);
        assert!(!new.in_transaction());
    }

    /// Runs SQL on a real connection and logs every statement it sees.
    struct LoggingEngine {
        conn: Connection,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl LoggingEngine {
        fn open(schema: &str, version: i64) -> (Session<LoggingEngine>, Arc<Mutex<Vec<String>>>) {
            let conn = Connection::open_in_memory().unwrap();
            conn.execute_batch(schema).unwrap();
            conn.pragma_update(None, "user_version", version).unwrap();
            let log = Arc::new(Mutex::new(Vec::new()));
            let engine = LoggingEngine {
                conn,
                log: Arc::clone(&log),
            };
            (Session::new(engine), log)
        }
    }

    impl Engine for LoggingEngine {
        fn execute_batch(&mut self, sql: &str) -> Result<()> {
            self.log.lock().unwrap().push(sql.to_string());
            Engine::execute_batch(&mut self.conn, sql)
        }

        fn execute(&mut self, sql: &str) -> Result<usize> {
            self.log.lock().unwrap().push(sql.to_string());
            Engine::execute(&mut self.conn, sql)
        }

        fn query(&mut self, sql: &str) -> Result<RowSet> {
            self.log.lock().unwrap().push(sql.to_string());
            Engine::query(&mut self.conn, sql)
        }
    }

    #[test]
    fn test_up_to_date_issues_no_statements_on_new() {
        let (old, _) = LoggingEngine::open("CREATE TABLE t (a); INSERT INTO t VALUES (1);", 3);
        let (new, log) = LoggingEngine::open("CREATE TABLE t (a)", 3);

        let report = Migrator::new(&old, &new).run().unwrap();
        assert_eq!(report.status, MigrationStatus::UpToDate);
        assert_eq!(*log.lock().unwrap(), ["PRAGMA user_version"]);

        let (older, _) = LoggingEngine::open("CREATE TABLE t (a)", 5);
        log.lock().unwrap().clear();
        let report = Migrator::new(&older, &new).run().unwrap();
        assert_eq!(report.status, MigrationStatus::UpToDate);
        assert_eq!(*log.lock().unwrap(), ["PRAGMA user_version"]);
    }

    #[test]
    fn test_reals_keep_their_storage_class() {
        let old = session(
            "CREATE TABLE t (a, b REAL);
             INSERT INTO t VALUES (1.0, 1e999), (2.5, -1e999), (-0.0, 3.0);",
            1,
        );
        let new = session("CREATE TABLE t (a, b REAL)", 2);

        let report = Migrator::new(&old, &new).run().unwrap();
        assert_eq!(report.inserted, 3);

        let sql = "SELECT typeof(a), typeof(b) FROM t ORDER BY ROWID";
        assert_eq!(rows(&new, sql), rows(&old, sql));
        assert_eq!(
            rows(&new, "SELECT a, b FROM t ORDER BY ROWID"),
            vec![
                vec![Value::Real(1.0), Value::Real(f64::INFINITY)],
                vec![Value::Real(2.5), Value::Real(f64::NEG_INFINITY)],
                vec![Value::Real(-0.0), Value::Real(3.0)],
            ]
        );
    }

    #[test]
    fn test_failed_replace_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.db");
        fs::write(&target, b"old").unwrap();

        assert!(replace_file(&dir.path().join("missing.db"), &target).is_err());
        assert_eq!(fs::read(&target).unwrap(), b"old");

        let source = dir.path().join("app.new.db");
        fs::write(&source, b"new").unwrap();
        replace_file(&source, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!source.exists());
    }

    #[test]
    fn test_optimize_refuses_open_transaction() {
        let db = session("CREATE TABLE t (a)", 0);
        optimize(&db).unwrap();
        db.begin_default().unwrap();
        assert!(matches!(optimize(&db), Err(MapperError::MigrationError(_))));
        db.end().unwrap();
    }
}
