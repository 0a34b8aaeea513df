//! Database schema definitions

/// SQL to create the rows table
///
/// `columns` holds the JSON encoding of the row's column → datum map.
/// `seq` keeps rows in insertion order across upserts.
pub const CREATE_ROWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rows (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    table_name TEXT NOT NULL,
    columns TEXT NOT NULL
)
"#;

/// SQL to create the commits table
pub const CREATE_COMMITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    committed_at INTEGER NOT NULL,
    inserted INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_rows_table ON rows(table_name)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_ROWS_TABLE, CREATE_COMMITS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
