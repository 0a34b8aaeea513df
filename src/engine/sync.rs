//! Row Synchronizer - phase one of a write
//!
//! Reconciles each row's full containment subtree against its entry in the
//! document: config columns, index columns of new rows, forward children
//! (owned reference columns) and backward children (rows pointing back).
//! Plain references are left to the linker, which consumes the returned
//! `SyncedTree`.
//!
//! Rows are matched by token across the whole table, so a document may move
//! a contained row to another owner. Deletes of rows that fell out of the
//! document are therefore held back until [`RowSynchronizer::finish`], which
//! skips every row some owner claimed during the pass.
//!
//! A new row whose index values do not spell its token (`"VLAN_1"` holding
//! `{"id": 1}`) cannot be found by that token again: every later write
//! replaces it with a fresh row. This is logged as a warning.

use super::delete::cascade_delete_retaining;
use super::resolver::{index_to_row, resolve_all, row_to_index};
use super::{guard_immutable, ImmutablePolicy};
use crate::document::{field, row_data, RowData, TableData};
use crate::schema::{KeyType, ReferenceSpec, Schema, TableSchema};
use crate::storage::Transaction;
use crate::value::{Datum, MapKey, RowId};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use serde_json::Value;
use std::fmt;

/// Outcome of synchronizing one document entry
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedRow {
    pub row: RowId,
    /// Inserted by this write
    pub created: bool,
    /// Effective token; the row identifier for tables without natural index columns
    pub token: String,
    /// Synced children by forward column or backward child table name
    pub children: BTreeMap<String, SyncedTable>,
}

/// Document token → synced row
pub type SyncedTable = BTreeMap<String, SyncedRow>;

/// Root table name → synced rows
pub type SyncedTree = BTreeMap<String, SyncedTable>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncStats {
    pub synced: usize,
    pub created: usize,
    pub deleted: usize,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Row Sync Stats:")?;
        writeln!(f, "  Rows Synced: {}", self.synced)?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Deleted: {}", self.deleted)
    }
}

pub struct RowSynchronizer<'a, 'b> {
    schema: &'a Schema,
    txn: &'a mut Transaction<'b>,
    policy: ImmutablePolicy,
    stats: SyncStats,
    /// Rows matched or created by this pass
    claimed: HashSet<RowId>,
    /// Rows that fell out of the document, deleted by `finish`
    stale: Vec<(String, RowId)>,
}

impl<'a, 'b> RowSynchronizer<'a, 'b> {
    pub fn new(schema: &'a Schema, txn: &'a mut Transaction<'b>, policy: ImmutablePolicy) -> Self {
        Self {
            schema,
            txn,
            policy,
            stats: SyncStats::default(),
            claimed: HashSet::new(),
            stale: Vec::new(),
        }
    }

    /// Cascade-delete every stale row nobody claimed, ending the pass
    pub fn finish(mut self) -> Result<SyncStats> {
        let mut stats = self.stats;
        for (table, row) in &self.stale {
            stats.deleted += cascade_delete_retaining(self.schema, self.txn, table, *row, &self.claimed)?;
        }
        tracing::info!(
            "Synchronized {} rows ({} created, {} deleted)",
            stats.synced,
            stats.created,
            stats.deleted
        );
        Ok(stats)
    }

    /// Synchronize a root table; a table absent from the document loses all its rows
    pub fn sync_table(&mut self, table: &TableSchema, data: Option<&TableData>) -> Result<SyncedTable> {
        let Some(entries) = data else {
            let rows = self.txn.row_ids(&table.name);
            if !rows.is_empty() {
                tracing::info!("Table {} absent from document: deleting {} rows", table.name, rows.len());
            }
            for row in rows {
                self.defer_delete(&table.name, row);
            }
            return Ok(SyncedTable::new());
        };

        let mut synced = SyncedTable::new();
        for (token, value) in entries {
            let path = format!("{}/{}", table.name, token);
            let row = self.sync_row(table, token, row_data(&path, value)?)?;
            synced.insert(token.clone(), row);
        }
        Ok(synced)
    }

    /// Reconcile one row and its containment subtree
    pub fn sync_row(&mut self, table: &TableSchema, token: &str, data: &RowData) -> Result<SyncedRow> {
        let (row, created) = match index_to_row(self.txn, table, token)? {
            Some(id) => (id, false),
            None => (self.txn.insert(&table.name), true),
        };
        self.stats.synced += 1;
        self.claimed.insert(row);
        if created {
            self.stats.created += 1;
            tracing::debug!("Created {} '{}' as {}", table.name, token, row);
        } else {
            tracing::debug!("Matched {} '{}' to {}", table.name, token, row);
        }

        self.sync_config(table, row, created, data)?;
        if created {
            self.sync_index_columns(table, row, token, data)?;
            self.warn_unmatchable_token(table, row, token);
        }

        let schema = self.schema;
        let mut children = BTreeMap::new();
        for (column, spec) in table.forward_children() {
            if let Some(synced) = self.sync_forward(table, column, spec, row, created, data)? {
                children.insert(column.to_string(), synced);
            }
        }
        for child_table in table.backward_children() {
            let child_schema = schema.table(child_table)?;
            let synced = self.sync_backward(child_schema, row, created, data)?;
            children.insert(child_table.to_string(), synced);
        }

        let token = if table.has_natural_index() {
            token.to_string()
        } else {
            row.to_string()
        };
        Ok(SyncedRow { row, created, token, children })
    }

    fn defer_delete(&mut self, table: &str, row: RowId) {
        self.stale.push((table.to_string(), row));
    }

    fn warn_unmatchable_token(&self, table: &TableSchema, row: RowId, token: &str) {
        if !table.has_natural_index() {
            return;
        }
        if let Some(stored) = self.txn.row(row).map(|r| row_to_index(table, r)) {
            if stored != token {
                tracing::warn!(
                    "{} '{}' is stored with index '{}'; the token will not match it on the next write",
                    table.name,
                    token,
                    stored
                );
            }
        }
    }

    fn sync_config(&mut self, table: &TableSchema, row: RowId, created: bool, data: &RowData) -> Result<()> {
        for (column, spec) in &table.config {
            let desired = field(data, column);

            if !created && !spec.mutable {
                let differs = desired.is_some_and(|value| {
                    self.txn.get(row, column).and_then(Datum::as_scalar) != Some(value)
                });
                guard_immutable(self.policy, table, column, differs)?;
                continue;
            }

            match desired {
                Some(value) => {
                    self.txn.set(row, column, Datum::Scalar(value.clone()))?;
                }
                None if created => {}
                None => {
                    if let Some(empty) = self.txn.get(row, column).map(Datum::empty_like) {
                        self.txn.set(row, column, empty)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn sync_index_columns(&mut self, table: &TableSchema, row: RowId, token: &str, data: &RowData) -> Result<()> {
        for column in table.index_columns() {
            let value = field(data, column).ok_or_else(|| Error::MissingIndexColumn {
                table: table.name.clone(),
                column: column.to_string(),
                token: token.to_string(),
            })?;
            self.txn.set(row, column, Datum::Scalar(value.clone()))?;
        }
        Ok(())
    }

    fn sync_forward(
        &mut self,
        table: &TableSchema,
        column: &str,
        spec: &ReferenceSpec,
        row: RowId,
        created: bool,
        data: &RowData,
    ) -> Result<Option<SyncedTable>> {
        let schema = self.schema;
        let child_schema = schema.table(&spec.table)?;
        let path = format!("{}.{}", table.name, column);
        let desired = field(data, column)
            .map(|value| {
                value
                    .as_object()
                    .ok_or_else(|| Error::invalid_document(&path, "child entries must be an object"))
            })
            .transpose()?;
        let current = self.txn.get(row, column).cloned();

        if !created && !spec.mutable {
            let differs = match desired {
                Some(entries) => {
                    let resolved = resolve_all(self.txn, child_schema, entries.keys())?;
                    let linked: HashSet<RowId> = current.iter().flat_map(Datum::referenced_rows).collect();
                    resolved.len() != entries.len()
                        || resolved.len() != linked.len()
                        || resolved.iter().any(|id| !linked.contains(id))
                }
                None => false,
            };
            guard_immutable(self.policy, table, column, differs)?;
            let Some(entries) = desired else {
                return Ok(None);
            };
            let owned: HashSet<RowId> = current.iter().flat_map(Datum::referenced_rows).collect();
            return self.existing_children(child_schema, &path, entries, &owned).map(Some);
        }

        let Some(entries) = desired else {
            if let Some(current) = current {
                for child in current.referenced_rows() {
                    self.defer_delete(&spec.table, child);
                }
                self.txn.set(row, column, current.empty_like())?;
            }
            return Ok(None);
        };

        if let Some(current) = &current {
            let keep: HashSet<RowId> = resolve_all(self.txn, child_schema, entries.keys())?
                .into_iter()
                .collect();
            for child in current.referenced_rows() {
                if !keep.contains(&child) {
                    self.defer_delete(&spec.table, child);
                }
            }
        }

        let mut synced = SyncedTable::new();
        for (token, value) in entries {
            let child_path = format!("{}/{}", path, token);
            let child = self.sync_row(child_schema, token, row_data(&child_path, value)?)?;
            synced.insert(token.clone(), child);
        }

        let datum = match spec.key_type {
            None => {
                // Retained children keep their position; new ones are appended
                let desired: HashSet<RowId> = synced.values().map(|child| child.row).collect();
                let mut rows: Vec<RowId> = current
                    .iter()
                    .flat_map(Datum::referenced_rows)
                    .filter(|id| desired.contains(id))
                    .collect();
                for child in synced.values() {
                    if !rows.contains(&child.row) {
                        rows.push(child.row);
                    }
                }
                Datum::ReferenceList(rows)
            }
            Some(key_type) => {
                let mut map = BTreeMap::new();
                for (token, child) in &synced {
                    let key = self.map_key(table, column, key_type, child_schema, token, child.row, current.as_ref())?;
                    map.insert(key, child.row);
                }
                Datum::ReferenceMap(map)
            }
        };
        self.txn.set(row, column, datum)?;
        Ok(Some(synced))
    }

    /// Key of a child in a key-value typed column. The child's natural index
    /// token (or the document token) is cast to the key type; when that fails
    /// the child's existing key is kept.
    #[allow(clippy::too_many_arguments)]
    fn map_key(
        &self,
        table: &TableSchema,
        column: &str,
        key_type: KeyType,
        child_schema: &TableSchema,
        token: &str,
        child: RowId,
        current: Option<&Datum>,
    ) -> Result<MapKey> {
        let source = match self.txn.row(child) {
            Some(row) if child_schema.has_natural_index() => row_to_index(child_schema, row),
            _ => token.to_string(),
        };
        if let Some(key) = key_type.cast(&source) {
            return Ok(key);
        }

        if let Some(Datum::ReferenceMap(map)) = current {
            if let Some((key, _)) = map.iter().find(|(_, id)| **id == child) {
                return Ok(key.clone());
            }
        }

        Err(Error::KeyCast {
            table: table.name.clone(),
            column: column.to_string(),
            key: source,
            key_type: key_type.as_str().to_string(),
        })
    }

    fn sync_backward(
        &mut self,
        child_schema: &TableSchema,
        row: RowId,
        created: bool,
        data: &RowData,
    ) -> Result<SyncedTable> {
        let child_table = child_schema.name.as_str();
        let parent_column = child_schema.parent_column().ok_or_else(|| {
            Error::Schema(format!("{}: child table has no parent column", child_table))
        })?;
        let desired = field(data, child_table)
            .map(|value| {
                value.as_object().ok_or_else(|| {
                    Error::invalid_document(child_table, "child entries must be an object")
                })
            })
            .transpose()?;

        if !created {
            let keep: HashSet<RowId> = match desired {
                Some(entries) => resolve_all(self.txn, child_schema, entries.keys())?
                    .into_iter()
                    .collect(),
                None => HashSet::new(),
            };
            let stale: Vec<RowId> = self
                .txn
                .rows(child_table)
                .filter(|child| child.get(parent_column).and_then(Datum::as_reference) == Some(row))
                .map(|child| child.id)
                .filter(|id| !keep.contains(id))
                .collect();
            for child in stale {
                self.defer_delete(child_table, child);
            }
        }

        let mut synced = SyncedTable::new();
        let Some(entries) = desired else {
            return Ok(synced);
        };
        for (token, value) in entries {
            let path = format!("{}/{}", child_table, token);
            let child = self.sync_row(child_schema, token, row_data(&path, value)?)?;
            self.txn.set(child.row, parent_column, Datum::Reference(Some(row)))?;
            synced.insert(token.clone(), child);
        }
        Ok(synced)
    }

    /// Match document entries below an immutable forward column against the
    /// rows it already owns, without writing. The matched rows are recorded
    /// so the linker still reaches their Plain columns.
    fn existing_children(
        &mut self,
        table: &TableSchema,
        path: &str,
        entries: &TableData,
        owned: &HashSet<RowId>,
    ) -> Result<SyncedTable> {
        let mut synced = SyncedTable::new();
        for (token, value) in entries {
            let Some(row) = index_to_row(self.txn, table, token)?.filter(|id| owned.contains(id)) else {
                continue;
            };
            let child_path = format!("{}/{}", path, token);
            let child = self.existing_row(table, token, row, row_data(&child_path, value)?)?;
            synced.insert(token.clone(), child);
        }
        Ok(synced)
    }

    fn existing_row(&mut self, table: &TableSchema, token: &str, row: RowId, data: &RowData) -> Result<SyncedRow> {
        self.claimed.insert(row);
        let schema = self.schema;
        let mut children = BTreeMap::new();

        for (column, spec) in table.forward_children() {
            let Some(entries) = field(data, column).and_then(Value::as_object) else {
                continue;
            };
            let owned: HashSet<RowId> = self
                .txn
                .get(row, column)
                .map(Datum::referenced_rows)
                .unwrap_or_default()
                .into_iter()
                .collect();
            let path = format!("{}.{}", table.name, column);
            let synced = self.existing_children(schema.table(&spec.table)?, &path, entries, &owned)?;
            children.insert(column.to_string(), synced);
        }

        for child_table in table.backward_children() {
            let child_schema = schema.table(child_table)?;
            let (Some(parent_column), Some(entries)) =
                (child_schema.parent_column(), field(data, child_table).and_then(Value::as_object))
            else {
                continue;
            };
            let owned: HashSet<RowId> = self
                .txn
                .rows(child_table)
                .filter(|child| child.get(parent_column).and_then(Datum::as_reference) == Some(row))
                .map(|child| child.id)
                .collect();
            let synced = self.existing_children(child_schema, child_table, entries, &owned)?;
            children.insert(child_table.to_string(), synced);
        }

        let token = if table.has_natural_index() {
            token.to_string()
        } else {
            row.to_string()
        };
        Ok(SyncedRow {
            row,
            created: false,
            token,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing;
    use serde_json::{json, Value};

    fn sync(
        schema: &Schema,
        txn: &mut Transaction,
        policy: ImmutablePolicy,
        table: &str,
        data: Value,
    ) -> Result<SyncedTable> {
        let table = schema.table(table)?;
        let data = data.as_object().cloned().unwrap_or_default();
        let mut synchronizer = RowSynchronizer::new(schema, txn, policy);
        let synced = synchronizer.sync_table(table, Some(&data))?;
        synchronizer.finish()?;
        Ok(synced)
    }

    #[test]
    fn test_bridge_with_keyed_vlan() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let synced = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            json!({"br0": {"name": "br0", "vlans": {"VLAN_1": {"id": 1}}}}),
        )
        .unwrap();

        let bridge = &synced["br0"];
        assert!(bridge.created);
        assert_eq!(txn.rows("Bridge").count(), 1);
        assert_eq!(txn.get(bridge.row, "name"), Some(&Datum::Scalar(json!("br0"))));

        let vlan = &bridge.children["vlans"]["VLAN_1"];
        assert_eq!(txn.get(vlan.row, "id"), Some(&Datum::Scalar(json!(1))));
        let mut expected = BTreeMap::new();
        expected.insert(MapKey::Integer(1), vlan.row);
        assert_eq!(txn.get(bridge.row, "vlans"), Some(&Datum::ReferenceMap(expected)));
    }

    #[test]
    fn test_existing_rows_are_matched() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        let doc = json!({"br0": {"name": "br0", "datapath_type": "system", "vlans": {"10": {"id": 10}}}});

        let first = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", doc.clone()).unwrap();
        let second = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", doc).unwrap();

        assert!(!second["br0"].created);
        assert_eq!(first["br0"].row, second["br0"].row);
        assert_eq!(
            first["br0"].children["vlans"]["10"].row,
            second["br0"].children["vlans"]["10"].row
        );
        assert_eq!(txn.rows("VLAN").count(), 1);
    }

    #[test]
    fn test_omitted_config_is_reset() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let first = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            json!({"br0": {"name": "br0", "datapath_type": "netdev"}}),
        )
        .unwrap();
        sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0"}})).unwrap();

        assert_eq!(
            txn.get(first["br0"].row, "datapath_type"),
            Some(&Datum::Scalar(json!("")))
        );
    }

    #[test]
    fn test_immutable_config_is_kept() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let port = json!({"p1": {"name": "p1", "interfaces": {"eth0": {"name": "eth0", "type": "system"}}}});
        let first = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "Port": port}})).unwrap();
        let interface = first["br0"].children["Port"]["p1"].children["interfaces"]["eth0"].row;

        let changed = json!({"p1": {"name": "p1", "interfaces": {"eth0": {"name": "eth0", "type": "internal"}}}});
        sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "Port": changed.clone()}})).unwrap();
        assert_eq!(txn.get(interface, "type"), Some(&Datum::Scalar(json!("system"))));

        let err = sync(&schema, &mut txn, ImmutablePolicy::Strict, "Bridge", json!({"br0": {"name": "br0", "Port": changed}})).unwrap_err();
        assert!(matches!(err, Error::ImmutableColumn { ref column, .. } if column == "type"));
    }

    #[test]
    fn test_missing_index_column() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let err = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Neighbor",
            json!({"10.0.0.1/aa:aa": {"ip": "10.0.0.1"}}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingIndexColumn { ref column, .. } if column == "mac"));
    }

    #[test]
    fn test_backward_children_point_at_owner() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let synced = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            json!({"br0": {"name": "br0", "Port": {"p1": {"name": "p1"}, "p2": {"name": "p2"}}}}),
        )
        .unwrap();
        let bridge = synced["br0"].row;
        for port in synced["br0"].children["Port"].values() {
            assert_eq!(txn.get(port.row, "bridge"), Some(&Datum::Reference(Some(bridge))));
        }

        // Ports dropped from the document are deleted
        sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            json!({"br0": {"name": "br0", "Port": {"p1": {"name": "p1"}}}}),
        )
        .unwrap();
        let names: Vec<String> = txn.rows("Port").map(|r| r.get("name").unwrap().index_string()).collect();
        assert_eq!(names, vec!["p1"]);
    }

    #[test]
    fn test_forward_child_removal_cascades() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let ports = json!({
            "p1": {"name": "p1", "interfaces": {"eth0": {"name": "eth0"}, "eth1": {"name": "eth1"}}}
        });
        sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "Port": ports}})).unwrap();
        assert_eq!(txn.rows("Interface").count(), 2);

        let ports = json!({"p1": {"name": "p1", "interfaces": {"eth1": {"name": "eth1"}}}});
        let synced = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "Port": ports}})).unwrap();
        assert_eq!(txn.rows("Interface").count(), 1);
        let port = &synced["br0"].children["Port"]["p1"];
        let eth1 = port.children["interfaces"]["eth1"].row;
        assert_eq!(txn.get(port.row, "interfaces"), Some(&Datum::ReferenceList(vec![eth1])));

        // An absent forward column clears it
        let ports = json!({"p1": {"name": "p1"}});
        sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "Port": ports}})).unwrap();
        assert_eq!(txn.rows("Interface").count(), 0);
        assert_eq!(txn.get(port.row, "interfaces"), Some(&Datum::ReferenceList(vec![])));
    }

    #[test]
    fn test_tokens_rewritten_for_tables_without_natural_index() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let synced = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "ACL",
            json!({"a1": {"name": "a1", "entries": {"e1": {"sequence": 10, "action": "permit"}}}}),
        )
        .unwrap();
        let entry = &synced["a1"].children["entries"]["e1"];
        assert_eq!(entry.token, entry.row.to_string());
        assert_eq!(synced["a1"].token, "a1");

        // Re-applying with the identifier token keeps the row
        let doc = json!({"a1": {"name": "a1", "entries": {entry.token.clone(): {"sequence": 20, "action": "permit"}}}});
        let again = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "ACL", doc).unwrap();
        assert_eq!(again["a1"].children["entries"][&entry.token].row, entry.row);
        assert_eq!(txn.get(entry.row, "sequence"), Some(&Datum::Scalar(json!(20))));
    }

    #[test]
    fn test_absent_table_deletes_rows() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", json!({"br0": {"name": "br0", "vlans": {"1": {"id": 1}}}})).unwrap();

        let mut synchronizer = RowSynchronizer::new(&schema, &mut txn, ImmutablePolicy::Lenient);
        let synced = synchronizer.sync_table(schema.table("Bridge").unwrap(), None).unwrap();
        assert!(synced.is_empty());
        assert_eq!(synchronizer.finish().unwrap().deleted, 2);
        assert_eq!(txn.rows("VLAN").count(), 0);
    }

    #[test]
    fn test_key_cast_failure() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let err = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            json!({"br0": {"name": "br0", "vlans": {"ten": {"id": "ten"}}}}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::KeyCast { .. }));
    }

    #[test]
    fn test_moved_child_keeps_its_row() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        let bridge = |ports: Value| json!({"br0": {"name": "br0", "Port": ports}});

        let first = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            bridge(json!({"p1": {"name": "p1"}, "p2": {"name": "p2", "interfaces": {"eth0": {"name": "eth0"}}}})),
        )
        .unwrap();
        let eth0 = first["br0"].children["Port"]["p2"].children["interfaces"]["eth0"].row;

        // p2 -> p1: the new owner is synced before the old one lets go
        let moved = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            bridge(json!({"p1": {"name": "p1", "interfaces": {"eth0": {"name": "eth0"}}}, "p2": {"name": "p2", "interfaces": {}}})),
        )
        .unwrap();
        let ports = &moved["br0"].children["Port"];
        assert!(txn.contains(eth0));
        assert_eq!(txn.get(ports["p1"].row, "interfaces"), Some(&Datum::ReferenceList(vec![eth0])));
        assert_eq!(txn.get(ports["p2"].row, "interfaces"), Some(&Datum::ReferenceList(vec![])));

        // p1 -> p2: the old owner lets go first
        sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            bridge(json!({"p1": {"name": "p1"}, "p2": {"name": "p2", "interfaces": {"eth0": {"name": "eth0"}}}})),
        )
        .unwrap();
        assert!(txn.contains(eth0));
        assert_eq!(txn.get(ports["p2"].row, "interfaces"), Some(&Datum::ReferenceList(vec![eth0])));

        // The old owner disappears entirely
        sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Bridge",
            bridge(json!({"p1": {"name": "p1", "interfaces": {"eth0": {"name": "eth0"}}}})),
        )
        .unwrap();
        assert!(txn.contains(eth0));
        assert!(!txn.contains(ports["p2"].row));
        assert_eq!(txn.rows("Interface").count(), 1);
        assert_eq!(txn.get(ports["p1"].row, "interfaces"), Some(&Datum::ReferenceList(vec![eth0])));
    }

    #[test]
    fn test_immutable_child_column() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();

        let first = sync(
            &schema,
            &mut txn,
            ImmutablePolicy::Lenient,
            "Lag",
            json!({"lag1": {"name": "lag1", "members": {"m1": {"name": "m1"}}}}),
        )
        .unwrap();
        let lag = first["lag1"].row;
        let m1 = first["lag1"].children["members"]["m1"].row;

        let grown = json!({"lag1": {"name": "lag1", "members": {"m1": {"name": "m1"}, "m2": {"name": "m2"}}}});
        let again = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Lag", grown.clone()).unwrap();
        assert_eq!(txn.rows("LagMember").count(), 1);
        assert_eq!(txn.get(lag, "members"), Some(&Datum::ReferenceList(vec![m1])));
        // Existing children are still reported, new ones are not created
        assert_eq!(again["lag1"].children["members"].len(), 1);
        assert!(!again["lag1"].children["members"]["m1"].created);

        let err = sync(&schema, &mut txn, ImmutablePolicy::Strict, "Lag", grown).unwrap_err();
        assert!(matches!(err, Error::ImmutableColumn { ref column, .. } if column == "members"));

        let same = json!({"lag1": {"name": "lag1", "members": {"m1": {"name": "m1"}}}});
        assert!(sync(&schema, &mut txn, ImmutablePolicy::Strict, "Lag", same).is_ok());
    }

    #[test]
    fn test_mismatched_token_is_replaced_on_rewrite() {
        let schema = testing::schema();
        let mut store = MemoryStore::new();
        let mut txn = Transaction::begin(&mut store).unwrap();
        let doc = json!({"br0": {"name": "br0", "vlans": {"VLAN_1": {"id": 1}}}});

        let first = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", doc.clone()).unwrap();
        let second = sync(&schema, &mut txn, ImmutablePolicy::Lenient, "Bridge", doc).unwrap();

        let old = first["br0"].children["vlans"]["VLAN_1"].row;
        let new = second["br0"].children["vlans"]["VLAN_1"].row;
        assert_ne!(old, new);
        assert!(second["br0"].children["vlans"]["VLAN_1"].created);
        assert!(!txn.contains(old));
        assert_eq!(txn.rows("VLAN").count(), 1);
    }
}
