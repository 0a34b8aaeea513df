//! Write Engine - reconciles the store with a desired document
//!
//! A write runs in two phases inside one transaction:
//! 1. Row synchronization over every root table (`sync`), which creates,
//!    updates and cascade-deletes rows along containment edges
//! 2. Reference linking (`linker`), which resolves Plain associations once
//!    every row exists
//!
//! The transaction commits once, after both phases succeed.

pub mod delete;
pub mod linker;
pub mod resolver;
pub mod sync;

pub use delete::{cascade_delete, cascade_delete_retaining};
pub use linker::{LinkerStats, ReferenceLinker};
pub use resolver::{index_to_row, row_to_index};
pub use sync::{RowSynchronizer, SyncStats, SyncedRow, SyncedTable, SyncedTree};

use crate::schema::{Schema, TableSchema};
use crate::storage::{Backend, ChangeSummary, CommitStatus, Transaction};
use crate::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// What to do when a document asks to change an immutable column of an
/// existing row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImmutablePolicy {
    /// Keep the stored value
    #[default]
    Lenient,
    /// Fail the write with `Error::ImmutableColumn`
    Strict,
}

impl ImmutablePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImmutablePolicy::Lenient => "lenient",
            ImmutablePolicy::Strict => "strict",
        }
    }
}

impl FromStr for ImmutablePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(ImmutablePolicy::Lenient),
            "strict" => Ok(ImmutablePolicy::Strict),
            _ => Err(Error::Parse(format!("Unknown immutable policy: {}", s))),
        }
    }
}

impl std::fmt::Display for ImmutablePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub immutable: ImmutablePolicy,
}

impl WriteOptions {
    pub fn strict() -> Self {
        Self {
            immutable: ImmutablePolicy::Strict,
        }
    }
}

/// Result of both phases, before commit
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub tree: SyncedTree,
    pub rows: SyncStats,
    pub links: LinkerStats,
    pub changes: ChangeSummary,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub status: CommitStatus,
    pub report: SyncReport,
}

pub(crate) fn guard_immutable(
    policy: ImmutablePolicy,
    table: &TableSchema,
    column: &str,
    differs: bool,
) -> Result<()> {
    if !differs {
        return Ok(());
    }
    match policy {
        ImmutablePolicy::Strict => Err(Error::ImmutableColumn {
            table: table.name.clone(),
            column: column.to_string(),
        }),
        ImmutablePolicy::Lenient => {
            tracing::debug!("Keeping stored value of immutable column {}.{}", table.name, column);
            Ok(())
        }
    }
}

/// Run both phases against an open transaction without committing
pub fn synchronize(
    document: &Document,
    schema: &Schema,
    txn: &mut Transaction,
    options: &WriteOptions,
) -> Result<SyncReport> {
    for (name, _) in document.tables() {
        if !schema.table(name)?.is_root() {
            tracing::warn!("Ignoring non-root table {} at document top level", name);
        }
    }

    let mut tree = SyncedTree::new();
    let mut synchronizer = RowSynchronizer::new(schema, txn, options.immutable);
    for table in schema.root_tables() {
        let synced = synchronizer.sync_table(table, document.table(&table.name))?;
        tree.insert(table.name.clone(), synced);
    }
    let rows = synchronizer.finish()?;

    let links = ReferenceLinker::new(schema, txn, options.immutable).run(document, &tree)?;

    Ok(SyncReport {
        tree,
        rows,
        links,
        changes: txn.summary(),
    })
}

/// Apply a desired document to a backend in one atomic commit
pub fn apply(
    value: Value,
    schema: &Schema,
    backend: &mut dyn Backend,
    options: &WriteOptions,
) -> Result<ApplyOutcome> {
    let mut txn = Transaction::begin(backend)?;
    let document = Document::from_value(value, schema, &txn)?;
    let report = synchronize(&document, schema, &mut txn, options)?;
    let status = txn.commit()?;
    Ok(ApplyOutcome { status, report })
}

/// Compute what `apply` would change, then discard the transaction
pub fn plan(
    value: Value,
    schema: &Schema,
    backend: &mut dyn Backend,
    options: &WriteOptions,
) -> Result<SyncReport> {
    let mut txn = Transaction::begin(backend)?;
    let document = Document::from_value(value, schema, &txn)?;
    synchronize(&document, schema, &mut txn, options)
}
