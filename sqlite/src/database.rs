//! A mapped database file with its templates.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use sqlstencil_core::{TemplateDocument, TemplateSource};
use sqlstencil_db::{MapperConfig, TemplateRegistry};
use tracing::debug;

use crate::error::Result;
use crate::mapper::SqlMapper;
use crate::session::Session;

/// Opens `path` as a session, read-only or read-write.
///
/// Read-write opens create the file if it is missing.
pub fn open_session(path: impl AsRef<Path>, read_only: bool, busy_timeout: Duration) -> Result<Session> {
    let path = path.as_ref();
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    };
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(busy_timeout)?;
    debug!(path = %path.display(), read_only, "Opened database");
    Ok(Session::new(conn))
}

/// One database file, its session and its template registry.
///
/// # Examples
///
/// ```
/// use sqlstencil_core::Param;
/// use sqlstencil_db::MapperConfig;
/// use sqlstencil_sqlite::Database;
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut db = Database::new(MapperConfig::new(dir.path().join("app.db"))).unwrap();
/// db.templates_mut()
///     .insert_text("notes", r#"<sqlMap>
///         <insert id="add">INSERT INTO notes (body) VALUES (#(body)#)</insert>
///         <select id="count">SELECT COUNT(*) FROM notes</select>
///     </sqlMap>"#)
///     .unwrap();
/// db.session().execute_raw("CREATE TABLE notes (body TEXT)").unwrap();
///
/// let notes = db.mapper("notes").unwrap();
/// notes.insert("add", &[Param::new("body", "hi")]).unwrap();
/// assert_eq!(notes.select_value::<i64>("count", &[]).unwrap(), Some(1));
/// ```
pub struct Database {
    config: MapperConfig,
    templates: TemplateRegistry,
    session: Session,
}

impl Database {
    /// Opens the configured file and loads its template directory.
    pub fn new(config: MapperConfig) -> Result<Self> {
        config.validate()?;
        let templates = match &config.templates {
            Some(dir) => TemplateRegistry::from_dir(dir)?,
            None => TemplateRegistry::new(),
        };
        let session = open_session(
            &config.database,
            config.read_only,
            Duration::from_millis(config.busy_timeout_ms),
        )?
        .with_default_mode(config.transaction_mode);
        Ok(Self {
            config,
            templates,
            session,
        })
    }

    /// Opens `path` read-write with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(MapperConfig::new(path.as_ref()))
    }

    /// Loads a YAML [`MapperConfig`] and opens it.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(MapperConfig::load(path)?)
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    /// A mapper over the registered template called `name`.
    pub fn mapper(&self, name: &str) -> Result<SqlMapper<'_, TemplateDocument>> {
        Ok(SqlMapper::new(&self.session, self.templates.require(name)?))
    }

    /// A mapper over any template source.
    pub fn mapper_for<'a, S: TemplateSource + ?Sized>(&'a self, source: &'a S) -> SqlMapper<'a, S> {
        SqlMapper::new(&self.session, source)
    }

    /// `PRAGMA user_version` of the file.
    pub fn version(&self) -> Result<i64> {
        self.session.user_version()
    }

    /// Rolls back any open transaction and closes the file.
    pub fn close(self) -> Result<()> {
        self.session.close()
    }
}
