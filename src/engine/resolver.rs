//! Index Resolver - maps index tokens to rows and back
//!
//! Resolution order:
//! 1. A token that reads as a row identifier is looked up directly
//! 2. A composite token on a table without natural index columns never matches
//! 3. A composite token must carry one value per declared index column
//! 4. Rows are scanned in store order; the first full match wins

use crate::schema::{TableSchema, UUID_COLUMN};
use crate::storage::{Row, Transaction};
use crate::token::{escaped_join, IndexToken};
use crate::value::RowId;
use crate::{Error, Result};

/// Resolve a token to an existing row of `table`.
///
/// Not-found is `Ok(None)`: the caller creates the row. A composite token
/// with the wrong number of values is a `CompositeIndex` error.
pub fn index_to_row(txn: &Transaction, table: &TableSchema, token: &str) -> Result<Option<RowId>> {
    let values = match IndexToken::parse(token) {
        IndexToken::Row(id) => {
            return Ok(txn.row(id).filter(|row| row.table == table.name).map(|row| row.id));
        }
        IndexToken::Composite(values) => values,
    };

    if !table.has_natural_index() {
        return Ok(None);
    }

    if values.len() != table.indexes.len() {
        return Err(Error::CompositeIndex {
            table: table.name.clone(),
            token: token.to_string(),
            expected: table.indexes.len(),
            actual: values.len(),
        });
    }

    let found = txn
        .rows(&table.name)
        .find(|row| row_matches(row, &table.indexes, &values))
        .map(|row| row.id);

    if found.is_none() {
        tracing::trace!("{} '{}' not found", table.name, token);
    }
    Ok(found)
}

fn row_matches(row: &Row, columns: &[String], values: &[String]) -> bool {
    columns.iter().zip(values).all(|(column, value)| {
        if column == UUID_COLUMN {
            row.id.to_string() == *value
        } else {
            row.get(column).is_some_and(|datum| datum.index_string() == *value)
        }
    })
}

/// The external token of a row: its escaped index values when the table has
/// natural index columns, otherwise its identifier.
pub fn row_to_index(table: &TableSchema, row: &Row) -> String {
    if !table.has_natural_index() {
        return row.id.to_string();
    }

    let values: Vec<String> = table
        .indexes
        .iter()
        .map(|column| {
            if column == UUID_COLUMN {
                row.id.to_string()
            } else {
                row.get(column).map(|d| d.index_string()).unwrap_or_default()
            }
        })
        .collect();
    escaped_join(&values)
}

/// Resolve every token of a desired set; tokens that match nothing are skipped
pub fn resolve_all<'t, I>(txn: &Transaction, table: &TableSchema, tokens: I) -> Result<Vec<RowId>>
where
    I: IntoIterator<Item = &'t String>,
{
    let mut rows = Vec::new();
    for token in tokens {
        if let Some(id) = index_to_row(txn, table, token)? {
            rows.push(id);
        }
    }
    Ok(rows)
}
