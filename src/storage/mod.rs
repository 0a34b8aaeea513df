//! Storage Layer - transactional row store
//!
//! A `Transaction` loads one consistent snapshot from a `Backend`, buffers
//! every insert, set and delete, and hands the change set back to the
//! backend on commit. Backends:
//! - `MemoryStore`: in-process rows (tests, dry runs)
//! - `SqliteStore`: rows(uuid, table_name, columns) plus a commit log

pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod transaction;

pub use memory::MemoryStore;
pub use sqlite::{DbStats, SqliteStore};
pub use transaction::{ChangeSummary, Transaction};

use crate::value::{Datum, RowId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub table: String,
    pub columns: BTreeMap<String, Datum>,
}

impl Row {
    pub fn new(id: RowId, table: impl Into<String>) -> Self {
        Self {
            id,
            table: table.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.columns.get(column)
    }
}

/// A buffered mutation, as handed to a backend on commit
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsert(Row),
    Delete { id: RowId, table: String },
}

/// Outcome of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    /// Mutations were applied
    Success,
    /// Nothing to apply
    Unchanged,
}

impl CommitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStatus::Success => "success",
            CommitStatus::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable target of a transaction.
pub trait Backend {
    /// Every stored row, in stable insertion order
    fn load(&self) -> Result<Vec<Row>>;

    /// Apply a change set atomically: either every change lands or none
    fn apply(&mut self, changes: &[Change]) -> Result<()>;
}
