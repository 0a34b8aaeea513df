//! # cfgsync - Declarative configuration reconciliation
//!
//! Applies a full desired-state configuration document to a schema-typed
//! row/reference store inside one atomic transaction, and reads the store
//! back into the same document shape.
//!
//! cfgsync provides:
//! - A schema model describing tables, containment and association references
//! - Index token resolution (row identifiers and escaped composite keys)
//! - A two-phase write engine: recursive row upsert, then reference linking
//! - Cascading delete along containment edges
//! - In-memory and SQLite-backed transaction backends
//! - A reader that materializes the store as a document

pub mod token;
pub mod value;
pub mod schema;
pub mod document;
pub mod storage;
pub mod engine;
pub mod read;
pub mod output;
pub mod config;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use token::IndexToken;
pub use value::{Datum, MapKey, RowId};
pub use schema::{RelationKind, Schema, TableSchema};
pub use document::Document;
pub use storage::{Backend, CommitStatus, MemoryStore, SqliteStore, Transaction};
pub use engine::{apply, synchronize, ImmutablePolicy, WriteOptions};

/// Result type alias for cfgsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cfgsync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Composite index error for table {table}: token '{token}' has {actual} values, expected {expected}")]
    CompositeIndex {
        table: String,
        token: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Invalid document at {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("Missing index column {column} for new {table} row '{token}'")]
    MissingIndexColumn {
        table: String,
        column: String,
        token: String,
    },

    #[error("Cannot cast key '{key}' to {key_type} for {table}.{column}")]
    KeyCast {
        table: String,
        column: String,
        key: String,
        key_type: String,
    },

    #[error("Unresolved reference '{token}' in {table}.{column}")]
    UnresolvedReference {
        table: String,
        column: String,
        token: String,
    },

    #[error("Column {table}.{column} is immutable")]
    ImmutableColumn { table: String, column: String },

    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_document(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
