//! Error types for sessions, migrations and mapped queries.
//!
//! [`MapperError::kind`] sorts every failure into one of four groups so
//! callers can tell a broken template from a busy file or a failed
//! upgrade without matching on individual variants.

use sqlstencil_core::{BeanError, CompileError};
use sqlstencil_db::ConfigError;
use thiserror::Error;

/// Broad classification of a [`MapperError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Templates, configuration or the caller's choice of query are wrong.
    Configuration,
    /// The call does not fit the current transaction or result shape.
    State,
    /// The database engine or the file system failed.
    Io,
    /// A schema upgrade could not complete and was rolled back.
    Migration,
}

/// Errors that can occur while running mapped SQL.
#[derive(Debug, Error)]
pub enum MapperError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Template compilation failure.
    #[error(transparent)]
    CompileError(#[from] CompileError),

    /// Configuration or template loading failure.
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    /// A column value did not fit the bean field or scalar type.
    #[error(transparent)]
    BeanError(#[from] BeanError),

    /// `set_successful` or `end` was called with no open transaction.
    #[error("the transaction has not begun")]
    TransactionNotOpen,

    /// The calling thread does not own the open transaction.
    #[error("the transaction is owned by another thread")]
    TransactionNotOwned,

    /// A select returned the wrong number of rows or columns.
    #[error("the result count should be {0}")]
    ResultCount(&'static str),

    /// A select returned the wrong number of columns.
    #[error("the column count should be {0}")]
    ColumnCount(&'static str),

    /// A named column is absent from a result set.
    #[error("no such column in result: {0}")]
    ColumnNotFound(String),

    /// An `insert` carries more than one `selectKey`.
    #[error("sub query count should be one, found {0}")]
    SubQueryCount(usize),

    /// A `selectKey` directive has no `keyProperty` attribute.
    #[error("selectKey has no 'keyProperty' attribute")]
    MissingKeyProperty,

    /// Table metadata could not be read from one of the databases.
    #[error("cannot snapshot table '{table}': {source}")]
    NoSnapshot {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A migration step failed; the destination transaction rolled back.
    #[error("migration error: {0}")]
    MigrationError(String),
}

impl MapperError {
    /// Classifies the error.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlstencil_sqlite::{ErrorKind, MapperError};
    ///
    /// assert_eq!(MapperError::TransactionNotOpen.kind(), ErrorKind::State);
    /// assert_eq!(MapperError::MissingKeyProperty.kind(), ErrorKind::Configuration);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapperError::DatabaseError(_) | MapperError::IoError(_) => ErrorKind::Io,
            MapperError::CompileError(_)
            | MapperError::ConfigError(_)
            | MapperError::MissingKeyProperty
            | MapperError::SubQueryCount(_) => ErrorKind::Configuration,
            MapperError::BeanError(_)
            | MapperError::TransactionNotOpen
            | MapperError::TransactionNotOwned
            | MapperError::ResultCount(_)
            | MapperError::ColumnCount(_)
            | MapperError::ColumnNotFound(_) => ErrorKind::State,
            MapperError::NoSnapshot { .. } | MapperError::MigrationError(_) => {
                ErrorKind::Migration
            }
        }
    }
}

/// Convenience alias for results with [`MapperError`].
pub type Result<T> = std::result::Result<T, MapperError>;
