//! Shared enums used across configuration, sessions and migrations.
//!
//! Both types serialize in lowercase so they read naturally in YAML
//! configuration files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Locking mode a transaction starts in.
///
/// # Examples
///
/// ```
/// use sqlstencil_core::TransactionMode;
///
/// assert_eq!(TransactionMode::default(), TransactionMode::Immediate);
/// assert_eq!(TransactionMode::Exclusive.begin_statement(), "BEGIN EXCLUSIVE");
/// assert_eq!("deferred".parse::<TransactionMode>(), Ok(TransactionMode::Deferred));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Locks are taken on first access.
    Deferred,
    /// A write lock is taken immediately (the default).
    #[default]
    Immediate,
    /// Readers are excluded as well.
    Exclusive,
}

impl TransactionMode {
    /// The statement that opens a transaction in this mode.
    pub fn begin_statement(self) -> &'static str {
        match self {
            TransactionMode::Deferred => "BEGIN DEFERRED",
            TransactionMode::Immediate => "BEGIN IMMEDIATE",
            TransactionMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TransactionMode::Deferred => "deferred",
            TransactionMode::Immediate => "immediate",
            TransactionMode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" => Ok(TransactionMode::Deferred),
            "immediate" => Ok(TransactionMode::Immediate),
            "exclusive" => Ok(TransactionMode::Exclusive),
            other => Err(format!("unknown transaction mode: {other}")),
        }
    }
}

/// What a retention policy decides for one old row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Drop the row.
    Skip,
    /// Insert the row, or update it when its identity already exists.
    Insert,
    /// Update the row with the same identity (the default).
    #[default]
    Update,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::Skip => "skip",
            Disposition::Insert => "insert",
            Disposition::Update => "update",
        })
    }
}
