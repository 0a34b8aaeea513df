//! Cascade Deleter - removes a row together with the rows it contains

use crate::schema::Schema;
use crate::storage::Transaction;
use crate::value::RowId;
use crate::Result;
use std::collections::HashSet;

/// Delete `row` of `table` and, depth-first, every row it contains.
///
/// Forward children (rows referenced through this table's child columns)
/// go first, then backward children (rows whose parent pointer is `row`),
/// then the row itself. Plain references and the row's own parent pointer
/// are never followed. Returns the number of rows deleted.
pub fn cascade_delete(schema: &Schema, txn: &mut Transaction, table: &str, row: RowId) -> Result<usize> {
    cascade_delete_retaining(schema, txn, table, row, &HashSet::new())
}

/// Like [`cascade_delete`], but rows in `retain` survive together with
/// everything below them. A row the current write attached to another owner
/// is retained this way.
pub fn cascade_delete_retaining(
    schema: &Schema,
    txn: &mut Transaction,
    table: &str,
    row: RowId,
    retain: &HashSet<RowId>,
) -> Result<usize> {
    if retain.contains(&row) || !txn.contains(row) {
        return Ok(0);
    }
    let table_schema = schema.table(table)?;
    let mut deleted = 0;

    for (column, spec) in table_schema.forward_children() {
        let children = txn
            .get(row, column)
            .map(|datum| datum.referenced_rows())
            .unwrap_or_default();
        for child in children {
            deleted += cascade_delete_retaining(schema, txn, &spec.table, child, retain)?;
        }
    }

    for child_table in table_schema.backward_children() {
        let Some(parent_column) = schema.table(child_table)?.parent_column() else {
            continue;
        };
        let children: Vec<RowId> = txn
            .rows(child_table)
            .filter(|child| child.get(parent_column).and_then(|d| d.as_reference()) == Some(row))
            .map(|child| child.id)
            .collect();
        for child in children {
            deleted += cascade_delete_retaining(schema, txn, child_table, child, retain)?;
        }
    }

    txn.delete(row)?;
    tracing::debug!("Deleted {} {}", table, row);
    Ok(deleted + 1)
}
