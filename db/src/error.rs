//! Error types for configuration and template loading.
//!
//! Every variant is a configuration error in the mapper's taxonomy: the
//! files on disk are missing or wrong, and retrying will not help.

use std::path::PathBuf;

use sqlstencil_core::MarkupError;
use thiserror::Error;

/// Errors that can occur while loading configuration or templates.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A configuration value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No template is registered under the requested name.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// A template file could not be tokenized.
    #[error("malformed template {path}: {source}")]
    MalformedTemplate {
        path: PathBuf,
        #[source]
        source: MarkupError,
    },
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
