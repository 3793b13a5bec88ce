//! SQLite execution for sqlstencil templates.
//!
//! This crate runs compiled templates against SQLite and moves data
//! between schema versions of a database file.
//!
//! # Architecture
//!
//! - **`engine`** — the [`Engine`] seam and fully materialized [`RowSet`]s
//! - **`record`** — typed access to one row
//! - **`session`** — reentrant, thread-affine transactions ([`Session`])
//! - **`snapshot`** — table names, columns and row counts
//! - **`migration`** — row transfer under a [`RetentionPolicy`]
//! - **`mapper`** — template-driven selects and writes ([`SqlMapper`])
//! - **`database`** — a configured file with its templates ([`Database`])
//!
//! # Quick start — mapped queries
//!
//! ```no_run
//! use sqlstencil_core::Param;
//! use sqlstencil_sqlite::Database;
//!
//! let db = Database::from_config_file("mapper.yml").unwrap();
//! let users = db.mapper("users").unwrap();
//!
//! let id = users.insert("add", &[Param::new("name", "Ann")]).unwrap();
//! let names: Vec<String> = users.select_values("names", &[]).unwrap();
//! println!("inserted {id:?}; {} users", names.len());
//! ```
//!
//! # Quick start — schema upgrades
//!
//! ```no_run
//! use sqlstencil_sqlite::{RetentionRules, update_database_file};
//!
//! let rules = RetentionRules::load("retention.yml").unwrap();
//! let report = update_database_file("app.db", "app.new.db", Some(&rules)).unwrap();
//! println!("{} rows inserted, {} updated", report.inserted, report.updated);
//! ```

mod database;
mod engine;
mod error;
mod mapper;
mod migration;
mod record;
mod session;
mod snapshot;

pub use database::{Database, open_session};
pub use engine::{Engine, RowSet};
pub use error::{ErrorKind, MapperError, Result};
pub use mapper::SqlMapper;
pub use migration::{
    MigrationReport, MigrationStatus, Migrator, RetentionPolicy, RetentionRules, optimize,
    update_database_file, update_database_file_with,
};
pub use record::{ColumnIndex, Record};
pub use session::{Session, TransactionOutcome, TransactionState};
pub use snapshot::{TableSnapshot, is_system_table, quote_identifier, snapshot_table, snapshot_tables};
