//! Reference Linker - phase two of a write
//!
//! Walks the document alongside the `SyncedTree` and overwrites every Plain
//! association column. Runs once all root tables are synchronized, so a
//! token may name any row of the target table, wherever it lives.

use super::resolver::index_to_row;
use super::sync::{SyncedRow, SyncedTree};
use super::{guard_immutable, ImmutablePolicy};
use crate::document::{field, row_data, RowData};
use crate::schema::{ReferenceSpec, Schema, TableSchema};
use crate::storage::Transaction;
use crate::value::{Datum, RowId};
use crate::{Document, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LinkerStats {
    /// Rows whose Plain columns were visited
    pub rows: usize,
    /// Tokens resolved to target rows
    pub resolved: usize,
    /// Columns whose stored value changed
    pub linked: usize,
}

impl fmt::Display for LinkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reference Linker Stats:")?;
        writeln!(f, "  Rows Visited: {}", self.rows)?;
        writeln!(f, "  Resolved: {}", self.resolved)?;
        writeln!(f, "  Columns Changed: {}", self.linked)
    }
}

pub struct ReferenceLinker<'a, 'b> {
    schema: &'a Schema,
    txn: &'a mut Transaction<'b>,
    policy: ImmutablePolicy,
    stats: LinkerStats,
}

impl<'a, 'b> ReferenceLinker<'a, 'b> {
    pub fn new(schema: &'a Schema, txn: &'a mut Transaction<'b>, policy: ImmutablePolicy) -> Self {
        Self {
            schema,
            txn,
            policy,
            stats: LinkerStats::default(),
        }
    }

    pub fn run(mut self, document: &Document, tree: &SyncedTree) -> Result<LinkerStats> {
        let schema = self.schema;
        for (name, synced) in tree {
            let table = schema.table(name)?;
            let Some(entries) = document.table(name) else {
                continue;
            };
            for (token, row) in synced {
                let Some(value) = entries.get(token) else {
                    continue;
                };
                let path = format!("{}/{}", name, token);
                self.link_subtree(table, row, row_data(&path, value)?)?;
            }
        }

        tracing::info!(
            "Linked {} rows ({} references resolved, {} columns changed)",
            self.stats.rows,
            self.stats.resolved,
            self.stats.linked
        );
        Ok(self.stats)
    }

    fn link_subtree(&mut self, table: &TableSchema, synced: &SyncedRow, data: &RowData) -> Result<()> {
        self.link_row(table, synced, data)?;

        let schema = self.schema;
        for (name, children) in &synced.children {
            let child_schema = match table.references.get(name) {
                Some(spec) => schema.table(&spec.table)?,
                None => schema.table(name)?,
            };
            let Some(entries) = field(data, name).and_then(Value::as_object) else {
                continue;
            };
            for (token, child) in children {
                if let Some(value) = entries.get(token) {
                    let path = format!("{}.{}/{}", table.name, name, token);
                    self.link_subtree(child_schema, child, row_data(&path, value)?)?;
                }
            }
        }
        Ok(())
    }

    fn link_row(&mut self, table: &TableSchema, synced: &SyncedRow, data: &RowData) -> Result<()> {
        self.stats.rows += 1;
        let schema = self.schema;

        for (column, spec) in table.plain_references() {
            let target = schema.table(&spec.table)?;
            let desired = field(data, column)
                .map(|value| self.resolve(table, column, spec, target, value))
                .transpose()?;

            if !synced.created && !spec.mutable {
                let differs = desired
                    .as_ref()
                    .is_some_and(|datum| self.txn.get(synced.row, column) != Some(datum));
                guard_immutable(self.policy, table, column, differs)?;
                continue;
            }

            let datum = desired.unwrap_or_else(|| empty_reference(spec));
            if self.txn.set(synced.row, column, datum)? {
                self.stats.linked += 1;
                tracing::debug!("Linked {}.{} on {}", table.name, column, synced.row);
            }
        }
        Ok(())
    }

    /// Resolve a document value into a reference datum: a token list, or a
    /// key → token map for key-value typed columns
    fn resolve(
        &mut self,
        table: &TableSchema,
        column: &str,
        spec: &ReferenceSpec,
        target: &TableSchema,
        value: &Value,
    ) -> Result<Datum> {
        let path = format!("{}.{}", table.name, column);
        match (spec.key_type, value) {
            (None, Value::Array(tokens)) => {
                let mut rows = Vec::with_capacity(tokens.len());
                for token in tokens {
                    rows.push(self.resolve_token(table, column, target, &path, token)?);
                }
                Ok(Datum::ReferenceList(rows))
            }
            (Some(key_type), Value::Object(entries)) => {
                let mut map = BTreeMap::new();
                for (key, token) in entries {
                    let map_key = key_type.cast(key).ok_or_else(|| Error::KeyCast {
                        table: table.name.clone(),
                        column: column.to_string(),
                        key: key.clone(),
                        key_type: key_type.as_str().to_string(),
                    })?;
                    map.insert(map_key, self.resolve_token(table, column, target, &path, token)?);
                }
                Ok(Datum::ReferenceMap(map))
            }
            (None, _) => Err(Error::invalid_document(path, "expected a list of tokens")),
            (Some(_), _) => Err(Error::invalid_document(path, "expected a map of key to token")),
        }
    }

    fn resolve_token(
        &mut self,
        table: &TableSchema,
        column: &str,
        target: &TableSchema,
        path: &str,
        value: &Value,
    ) -> Result<RowId> {
        let token = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(Error::invalid_document(path, "reference token must be a string")),
        };

        let row = index_to_row(self.txn, target, &token)?.ok_or_else(|| Error::UnresolvedReference {
            table: table.name.clone(),
            column: column.to_string(),
            token,
        })?;
        self.stats.resolved += 1;
        Ok(row)
    }
}

fn empty_reference(spec: &ReferenceSpec) -> Datum {
    if spec.is_kv() {
        Datum::ReferenceMap(BTreeMap::new())
    } else {
        Datum::ReferenceList(Vec::new())
    }
}
