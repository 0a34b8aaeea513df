//! Config Tree - the desired (or materialized) configuration document
//!
//! Shape: table name → { index token → row-data }. Singleton tables are
//! written degenerately as the row-data itself and normalized here.

use crate::schema::Schema;
use crate::storage::Transaction;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Row data: column name → scalar, nested token map, or reference tokens
pub type RowData = Map<String, Value>;

/// Token-keyed entries of one table
pub type TableData = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    tables: BTreeMap<String, TableData>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from JSON, normalizing singleton tables to the
    /// token-keyed form. A singleton's token is its existing row identifier,
    /// or the table name while the table is still empty.
    pub fn from_value(value: Value, schema: &Schema, txn: &Transaction) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::invalid_document("/", "document must be an object"));
        };

        let mut tables = BTreeMap::new();
        for (name, table_value) in map {
            let table = schema.table(&name)?;
            let Value::Object(entries) = table_value else {
                return Err(Error::invalid_document(name, "table data must be an object"));
            };

            let entries = if table.singleton {
                let token = txn
                    .rows(&name)
                    .next()
                    .map(|row| row.id.to_string())
                    .unwrap_or_else(|| name.clone());
                let mut wrapped = Map::new();
                wrapped.insert(token, Value::Object(entries));
                wrapped
            } else {
                entries
            };
            tables.insert(name, entries);
        }

        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableData)> {
        self.tables.iter().map(|(name, data)| (name.as_str(), data))
    }

    pub fn insert_table(&mut self, name: impl Into<String>, data: TableData) {
        self.tables.insert(name.into(), data);
    }

    /// Convert back to JSON, collapsing singleton tables to their row data
    pub fn to_value(&self, schema: &Schema) -> Value {
        let mut out = Map::new();
        for (name, entries) in &self.tables {
            let singleton = schema.table(name).map(|t| t.singleton).unwrap_or(false);
            if singleton {
                if let Some(row) = entries.values().next() {
                    out.insert(name.clone(), row.clone());
                }
            } else {
                out.insert(name.clone(), Value::Object(entries.clone()));
            }
        }
        Value::Object(out)
    }
}

/// Row data of one entry, or a structural error naming its path
pub(crate) fn row_data<'v>(path: &str, value: &'v Value) -> Result<&'v RowData> {
    value
        .as_object()
        .ok_or_else(|| Error::invalid_document(path, "row data must be an object"))
}

/// Value of a column, treating JSON null as absent
pub(crate) fn field<'v>(data: &'v RowData, column: &str) -> Option<&'v Value> {
    data.get(column).filter(|v| !v.is_null())
}
