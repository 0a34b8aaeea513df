//! Reader - materializes the store as a document
//!
//! The output has the same shape `apply` accepts, so reading and applying
//! it again is a no-op.

use crate::document::{Document, RowData, TableData};
use crate::engine::row_to_index;
use crate::schema::{Schema, TableSchema};
use crate::storage::{Row, Transaction};
use crate::value::{Datum, RowId};
use crate::Result;
use serde_json::{Map, Value};

/// Read every root table into a document value
pub fn read(schema: &Schema, txn: &Transaction) -> Result<Value> {
    let mut document = Document::new();
    for table in schema.root_tables() {
        let mut entries = TableData::new();
        for row in txn.rows(&table.name) {
            let data = read_row(schema, txn, table, row)?;
            entries.insert(row_to_index(table, row), Value::Object(data));
        }
        if !entries.is_empty() {
            document.insert_table(table.name.clone(), entries);
        }
    }
    Ok(document.to_value(schema))
}

fn read_row(schema: &Schema, txn: &Transaction, table: &TableSchema, row: &Row) -> Result<RowData> {
    let mut data = RowData::new();

    let scalar_columns = table
        .config
        .keys()
        .map(String::as_str)
        .chain(table.index_columns());
    for column in scalar_columns {
        if let Some(Datum::Scalar(value)) = row.get(column) {
            data.insert(column.to_string(), value.clone());
        }
    }

    for (column, spec) in table.forward_children() {
        let Some(datum) = row.get(column) else {
            continue;
        };
        let child_schema = schema.table(&spec.table)?;
        let mut children = Map::new();
        for child in datum.referenced_rows() {
            if let Some(child_row) = txn.row(child) {
                let child_data = read_row(schema, txn, child_schema, child_row)?;
                children.insert(row_to_index(child_schema, child_row), Value::Object(child_data));
            }
        }
        data.insert(column.to_string(), Value::Object(children));
    }

    for child_table in table.backward_children() {
        let child_schema = schema.table(child_table)?;
        let Some(parent_column) = child_schema.parent_column() else {
            continue;
        };
        let mut children = Map::new();
        let owned = txn
            .rows(child_table)
            .filter(|child| child.get(parent_column).and_then(Datum::as_reference) == Some(row.id));
        for child_row in owned {
            let child_data = read_row(schema, txn, child_schema, child_row)?;
            children.insert(row_to_index(child_schema, child_row), Value::Object(child_data));
        }
        if !children.is_empty() {
            data.insert(child_table.to_string(), Value::Object(children));
        }
    }

    for (column, spec) in table.plain_references() {
        let target = schema.table(&spec.table)?;
        let token = |id: &RowId| txn.row(*id).map(|r| Value::String(row_to_index(target, r)));
        match row.get(column) {
            Some(Datum::ReferenceList(ids)) if !ids.is_empty() => {
                data.insert(column.to_string(), Value::Array(ids.iter().filter_map(token).collect()));
            }
            Some(Datum::ReferenceMap(map)) if !map.is_empty() => {
                let entries: Map<String, Value> = map
                    .iter()
                    .filter_map(|(key, id)| token(id).map(|t| (key.to_string(), t)))
                    .collect();
                data.insert(column.to_string(), Value::Object(entries));
            }
            _ => {}
        }
    }

    Ok(data)
}
