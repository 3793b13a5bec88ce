//! YAML configuration for mappers and migrations.
//!
//! [`MapperConfig`] says where the database and its templates live and how
//! write transactions start. [`RetentionConfig`] is a declarative retention
//! policy: which tables and columns survive a schema upgrade and what
//! happens to each old row.
//!
//! # Example YAML
//!
//! ```yaml
//! # mapper.yml
//! database: data/app.db
//! templates: sql/
//! transaction_mode: immediate
//! busy_timeout_ms: 5000
//! ```
//!
//! ```yaml
//! # retention.yml
//! ignore_tables:
//!   - sessions
//! ignore_columns:
//!   users: [password_hash]
//!   "*": [updated_at]
//! default_disposition: update
//! table_dispositions:
//!   audit_log: insert
//!   cache: skip
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlstencil_core::{Disposition, TransactionMode};

use crate::error::{ConfigError, Result};

/// Table key in [`RetentionConfig::ignore_columns`] that applies to every table.
pub const ANY_TABLE: &str = "*";

/// Milliseconds a connection waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Connection settings for a mapped database file.
///
/// # Examples
///
/// ```
/// use sqlstencil_core::TransactionMode;
/// use sqlstencil_db::MapperConfig;
///
/// let config: MapperConfig = serde_yaml::from_str("database: app.db").unwrap();
/// assert_eq!(config.transaction_mode, TransactionMode::Immediate);
/// assert_eq!(config.busy_timeout_ms, 5000);
/// assert!(config.templates.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Path of the SQLite database file.
    pub database: PathBuf,
    /// Directory of `*.xml` template files, if any.
    #[serde(default)]
    pub templates: Option<PathBuf>,
    /// Mode used for automatic write transactions.
    #[serde(default)]
    pub transaction_mode: TransactionMode,
    /// How long a connection waits on a locked database file.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Open the database without write access.
    #[serde(default)]
    pub read_only: bool,
}

impl MapperConfig {
    /// Creates a configuration for `database` with default settings.
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            templates: None,
            transaction_mode: TransactionMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            read_only: false,
        }
    }

    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// [`YamlError`](ConfigError::YamlError) if parsing fails, or
    /// [`InvalidConfig`](ConfigError::InvalidConfig) if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, path)
    }

    /// Checks that the database path is set.
    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Declarative retention policy for schema upgrades.
///
/// # Examples
///
/// ```
/// use sqlstencil_core::Disposition;
/// use sqlstencil_db::RetentionConfig;
///
/// let yaml = r#"
/// ignore_tables: [sessions]
/// ignore_columns:
///   users: [password_hash]
///   "*": [updated_at]
/// table_dispositions:
///   cache: skip
/// "#;
/// let config: RetentionConfig = serde_yaml::from_str(yaml).unwrap();
///
/// assert!(config.is_table_ignored("sessions"));
/// assert!(config.is_column_ignored("users", "password_hash"));
/// assert!(config.is_column_ignored("orders", "updated_at"));
/// assert!(!config.is_column_ignored("orders", "total"));
/// assert_eq!(config.disposition_for("cache"), Disposition::Skip);
/// assert_eq!(config.disposition_for("users"), Disposition::Update);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Tables never migrated.
    #[serde(default)]
    pub ignore_tables: Vec<String>,
    /// Columns never migrated, keyed by table; `"*"` applies to all tables.
    #[serde(default)]
    pub ignore_columns: BTreeMap<String, Vec<String>>,
    /// Disposition for rows of tables without an explicit entry.
    #[serde(default)]
    pub default_disposition: Disposition,
    /// Per-table row dispositions.
    #[serde(default)]
    pub table_dispositions: BTreeMap<String, Disposition>,
}

impl RetentionConfig {
    /// Loads and validates a retention policy from a YAML file.
    ///
    /// # Errors
    ///
    /// Same as [`MapperConfig::load`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the policy as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, path)
    }

    /// Rejects empty table or column names.
    pub fn validate(&self) -> Result<()> {
        if self.ignore_tables.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "ignore_tables contains an empty table name".into(),
            ));
        }
        for (table, columns) in &self.ignore_columns {
            if table.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "ignore_columns contains an empty table name".into(),
                ));
            }
            if columns.iter().any(|c| c.trim().is_empty()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "ignore_columns.{table} contains an empty column name"
                )));
            }
        }
        Ok(())
    }

    /// Returns `true` if `table` is in the ignore list.
    pub fn is_table_ignored(&self, table: &str) -> bool {
        self.ignore_tables.iter().any(|t| t == table)
    }

    /// Returns `true` if `column` is ignored for `table` or for every table.
    pub fn is_column_ignored(&self, table: &str, column: &str) -> bool {
        [table, ANY_TABLE].iter().any(|key| {
            self.ignore_columns
                .get(*key)
                .is_some_and(|cols| cols.iter().any(|c| c == column))
        })
    }

    /// Row disposition for `table`.
    pub fn disposition_for(&self, table: &str) -> Disposition {
        self.table_dispositions
            .get(table)
            .copied()
            .unwrap_or(self.default_disposition)
    }
}

fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let value = serde_yaml::from_reader(reader)?;
    Ok(value)
}

fn save_yaml<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, value)?;
    Ok(())
}
