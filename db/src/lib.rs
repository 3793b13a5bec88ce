//! Configuration files and template registries for sqlstencil.
//!
//! This crate loads everything a mapper needs from disk: YAML mapper
//! settings, declarative retention policies for schema upgrades, and
//! directories of query templates.
//!
//! # Quick start
//!
//! ```no_run
//! use sqlstencil_db::{MapperConfig, RetentionConfig, TemplateRegistry};
//!
//! let config = MapperConfig::load("mapper.yml").unwrap();
//! let templates = TemplateRegistry::from_dir(config.templates.as_deref().unwrap()).unwrap();
//! let users = templates.require("users").unwrap();
//!
//! let retention = RetentionConfig::load("retention.yml").unwrap();
//! if retention.is_table_ignored("sessions") {
//!     println!("sessions will not survive the upgrade");
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{ANY_TABLE, DEFAULT_BUSY_TIMEOUT_MS, MapperConfig, RetentionConfig};
pub use error::{ConfigError, Result};
pub use loader::{RegistrySource, TEMPLATE_EXTENSION, TemplateRegistry};
