//! Error types for template markup, compilation, and bean mapping.
//!
//! Every variant of [`CompileError`] is a configuration error: the template
//! or the caller's choice of query is wrong, and retrying cannot help.

use thiserror::Error;

/// Errors raised by a markup source while producing events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// The markup text is not well formed.
    #[error("malformed markup at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },

    /// The stream was read after it was closed or exhausted.
    #[error("markup stream is closed")]
    Closed,

    /// The underlying reader failed.
    #[error("markup source I/O error: {0}")]
    Io(String),
}

/// Errors that can occur while compiling a query template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// No root statement carries the requested `id`.
    #[error("query identifier not found in template: {0}")]
    QueryNotFound(String),

    /// The markup source failed mid-stream.
    #[error("malformed template: {0}")]
    Malformed(#[from] MarkupError),

    /// A directive appeared where it cannot be resolved.
    #[error("illegal inner structure: {0}")]
    IllegalStructure(String),

    /// The rendered SQL does not start with a keyword the operation accepts.
    #[error("illegal sql statement, expected one of [{expected}]: {sql}")]
    WrongStatement { expected: String, sql: String },
}

/// Errors raised when moving values into or out of a bean.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeanError {
    /// The bean has no field with this name.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The text could not be converted to the field's type.
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl BeanError {
    /// Builds an [`BeanError::InvalidValue`] from any displayable cause.
    pub fn invalid(field: &str, cause: impl std::fmt::Display) -> Self {
        BeanError::InvalidValue {
            field: field.to_string(),
            message: cause.to_string(),
        }
    }
}

/// Convenience alias for compiler results.
pub type Result<T> = std::result::Result<T, CompileError>;
