//! Transaction driver
//!
//! Holds the working copy of every row for the duration of one write.
//! Nothing becomes visible outside the transaction until `commit`; dropping
//! an uncommitted transaction discards its changes.

use super::{Backend, Change, CommitStatus, Row};
use crate::value::{Datum, RowId};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Counts of buffered mutations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted",
            self.inserted, self.updated, self.deleted
        )
    }
}

pub struct Transaction<'a> {
    backend: &'a mut dyn Backend,
    rows: HashMap<RowId, Row>,
    /// Row ids per table in store order
    tables: BTreeMap<String, Vec<RowId>>,
    inserted: HashSet<RowId>,
    updated: HashSet<RowId>,
    /// Pre-existing rows deleted in this transaction
    deleted: Vec<(RowId, String)>,
}

impl<'a> Transaction<'a> {
    /// Begin a transaction over a snapshot of the backend
    pub fn begin(backend: &'a mut dyn Backend) -> Result<Self> {
        let mut rows = HashMap::new();
        let mut tables: BTreeMap<String, Vec<RowId>> = BTreeMap::new();
        for row in backend.load()? {
            tables.entry(row.table.clone()).or_default().push(row.id);
            rows.insert(row.id, row);
        }
        tracing::debug!("Transaction started over {} rows", rows.len());

        Ok(Self {
            backend,
            rows,
            tables,
            inserted: HashSet::new(),
            updated: HashSet::new(),
            deleted: Vec::new(),
        })
    }

    // ========== Row Access ==========

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Rows of a table in store order
    pub fn rows<'t>(&'t self, table: &str) -> impl Iterator<Item = &'t Row> + use<'t, 'a> {
        self.tables
            .get(table)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|id| self.rows.get(id))
    }

    /// Snapshot of a table's row ids, safe to hold across mutations
    pub fn row_ids(&self, table: &str) -> Vec<RowId> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    pub fn get(&self, id: RowId, column: &str) -> Option<&Datum> {
        self.rows.get(&id).and_then(|row| row.get(column))
    }

    // ========== Mutations ==========

    /// Insert an empty row and return its new identifier
    pub fn insert(&mut self, table: &str) -> RowId {
        let id = RowId::new_v4();
        self.rows.insert(id, Row::new(id, table));
        self.tables.entry(table.to_string()).or_default().push(id);
        self.inserted.insert(id);
        tracing::trace!("insert {} {}", table, id);
        id
    }

    /// Set a column; returns whether the stored value changed
    pub fn set(&mut self, id: RowId, column: &str, value: Datum) -> Result<bool> {
        let row = self.rows.get_mut(&id).ok_or(Error::RowNotFound(id))?;
        if row.columns.get(column) == Some(&value) {
            return Ok(false);
        }
        tracing::trace!("set {}.{} on {}", row.table, column, id);
        row.columns.insert(column.to_string(), value);
        if !self.inserted.contains(&id) {
            self.updated.insert(id);
        }
        Ok(true)
    }

    pub fn delete(&mut self, id: RowId) -> Result<()> {
        let row = self.rows.remove(&id).ok_or(Error::RowNotFound(id))?;
        if let Some(ids) = self.tables.get_mut(&row.table) {
            ids.retain(|r| *r != id);
        }
        self.updated.remove(&id);
        // A row inserted and deleted in the same transaction never reaches the backend
        if !self.inserted.remove(&id) {
            self.deleted.push((id, row.table.clone()));
        }
        tracing::trace!("delete {} {}", row.table, id);
        Ok(())
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            inserted: self.inserted.len(),
            updated: self.updated.len(),
            deleted: self.deleted.len(),
        }
    }

    /// Buffered mutations: deletes first, then upserts in store order
    fn changes(&self) -> Vec<Change> {
        let mut changes: Vec<Change> = self
            .deleted
            .iter()
            .map(|(id, table)| Change::Delete {
                id: *id,
                table: table.clone(),
            })
            .collect();

        for ids in self.tables.values() {
            for id in ids {
                if self.inserted.contains(id) || self.updated.contains(id) {
                    if let Some(row) = self.rows.get(id) {
                        changes.push(Change::Upsert(row.clone()));
                    }
                }
            }
        }
        changes
    }

    /// Commit all buffered mutations atomically
    pub fn commit(mut self) -> Result<CommitStatus> {
        let summary = self.summary();
        if summary.is_empty() {
            tracing::info!("Commit: no changes");
            return Ok(CommitStatus::Unchanged);
        }

        let changes = self.changes();
        self.backend.apply(&changes)?;
        tracing::info!("Commit: {}", summary);
        Ok(CommitStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_insert_set_commit() {
        let mut store = MemoryStore::new();
        let id = {
            let mut txn = Transaction::begin(&mut store).unwrap();
            let id = txn.insert("Bridge");
            txn.set(id, "name", Datum::Scalar(json!("br0"))).unwrap();
            assert_eq!(txn.summary(), ChangeSummary { inserted: 1, updated: 0, deleted: 0 });
            assert_eq!(txn.commit().unwrap(), CommitStatus::Success);
            id
        };

        let rows = store.load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].get("name"), Some(&Datum::Scalar(json!("br0"))));
    }

    #[test]
    fn test_setting_same_value_is_not_a_change() {
        let mut store = MemoryStore::new();
        let id = {
            let mut txn = Transaction::begin(&mut store).unwrap();
            let id = txn.insert("Bridge");
            txn.set(id, "name", Datum::Scalar(json!("br0"))).unwrap();
            txn.commit().unwrap();
            id
        };

        let mut txn = Transaction::begin(&mut store).unwrap();
        assert!(!txn.set(id, "name", Datum::Scalar(json!("br0"))).unwrap());
        assert!(txn.summary().is_empty());
        assert_eq!(txn.commit().unwrap(), CommitStatus::Unchanged);
    }

    #[test]
    fn test_insert_then_delete_cancels_out() {
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        let id = txn.insert("VLAN");
        txn.delete(id).unwrap();
        assert!(!txn.contains(id));
        assert_eq!(txn.rows("VLAN").count(), 0);
        assert_eq!(txn.commit().unwrap(), CommitStatus::Unchanged);
    }

    #[test]
    fn test_uncommitted_changes_are_discarded() {
        let mut store = MemoryStore::new();
        {
            let mut txn = Transaction::begin(&mut store).unwrap();
            txn.insert("Bridge");
        }
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_missing_rows() {
        let mut store = MemoryStore::new();
        let id = {
            let mut txn = Transaction::begin(&mut store).unwrap();
            let id = txn.insert("Bridge");
            txn.commit().unwrap();
            id
        };

        let mut txn = Transaction::begin(&mut store).unwrap();
        txn.delete(id).unwrap();
        assert!(matches!(txn.delete(id), Err(Error::RowNotFound(_))));
        assert!(matches!(
            txn.set(id, "name", Datum::Scalar(json!("x"))),
            Err(Error::RowNotFound(_))
        ));
        assert_eq!(txn.summary().deleted, 1);
        txn.commit().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_rows_keep_insertion_order() {
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        let a = txn.insert("Port");
        let b = txn.insert("Port");
        let c = txn.insert("Port");
        txn.delete(b).unwrap();
        let ids: Vec<RowId> = txn.rows("Port").map(|r| r.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(txn.row_ids("Port"), vec![a, c]);
    }
}
