//! SQLite storage implementation

use super::{schema, Backend, Change, Row};
use crate::value::{Datum, RowId};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-backed row store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Row Operations ==========

    /// Get a row by identifier
    pub fn get_row(&self, id: RowId) -> Result<Option<Row>> {
        self.conn
            .query_row(
                "SELECT uuid, table_name, columns FROM rows WHERE uuid = ?1",
                [id.to_string()],
                |row| self.row_to_stored(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Count all rows
    pub fn count_rows(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM rows", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Row counts grouped by table
    pub fn rows_per_table(&self) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name, COUNT(*) FROM rows GROUP BY table_name")?;

        let counts = stmt
            .query_map([], |row| {
                let table: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((table, count as usize))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(counts)
    }

    /// Count applied commits
    pub fn count_commits(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            rows: self.count_rows()?,
            commits: self.count_commits()?,
            tables: self.rows_per_table()?,
        })
    }

    /// Helper to convert a SQL row to a stored Row
    fn row_to_stored(&self, row: &rusqlite::Row) -> rusqlite::Result<Row> {
        let uuid_str: String = row.get(0)?;
        let columns_str: String = row.get(2)?;

        let id = RowId::parse_str(&uuid_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let columns: BTreeMap<String, Datum> = serde_json::from_str(&columns_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Row {
            id,
            table: row.get(1)?,
            columns,
        })
    }
}

impl Backend for SqliteStore {
    fn load(&self) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, table_name, columns FROM rows ORDER BY seq")?;

        let rows = stmt
            .query_map([], |row| self.row_to_stored(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn apply(&mut self, changes: &[Change]) -> Result<()> {
        let tx = self.conn.transaction()?;
        let (mut inserted, mut updated, mut deleted) = (0i64, 0i64, 0i64);

        for change in changes {
            match change {
                Change::Delete { id, .. } => {
                    deleted += tx.execute("DELETE FROM rows WHERE uuid = ?1", [id.to_string()])? as i64;
                }
                Change::Upsert(row) => {
                    let columns = serde_json::to_string(&row.columns)?;
                    let exists = tx
                        .query_row(
                            "SELECT 1 FROM rows WHERE uuid = ?1",
                            [row.id.to_string()],
                            |_| Ok(()),
                        )
                        .optional()?
                        .is_some();

                    if exists {
                        tx.execute(
                            "UPDATE rows SET columns = ?2 WHERE uuid = ?1",
                            params![row.id.to_string(), columns],
                        )?;
                        updated += 1;
                    } else {
                        tx.execute(
                            "INSERT INTO rows (uuid, table_name, columns) VALUES (?1, ?2, ?3)",
                            params![row.id.to_string(), row.table, columns],
                        )?;
                        inserted += 1;
                    }
                }
            }
        }

        let committed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        tx.execute(
            "INSERT INTO commits (committed_at, inserted, updated, deleted) VALUES (?1, ?2, ?3, ?4)",
            params![committed_at, inserted, updated, deleted],
        )?;

        tx.commit()?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub rows: usize,
    pub commits: usize,
    pub tables: BTreeMap<String, usize>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Rows: {}", self.rows)?;
        writeln!(f, "  Commits: {}", self.commits)?;
        for (table, count) in &self.tables {
            writeln!(f, "  {}: {}", table, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CommitStatus, Transaction};
    use serde_json::json;

    #[test]
    fn test_commit_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let (bridge, vlan) = {
            let mut txn = Transaction::begin(&mut store).unwrap();
            let bridge = txn.insert("Bridge");
            let vlan = txn.insert("VLAN");
            txn.set(bridge, "name", Datum::Scalar(json!("br0"))).unwrap();
            txn.set(vlan, "id", Datum::Scalar(json!(10))).unwrap();
            let mut map = BTreeMap::new();
            map.insert(crate::MapKey::Integer(10), vlan);
            txn.set(bridge, "vlans", Datum::ReferenceMap(map)).unwrap();
            assert_eq!(txn.commit().unwrap(), CommitStatus::Success);
            (bridge, vlan)
        };

        let rows = store.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, bridge);
        assert_eq!(rows[1].id, vlan);
        assert_eq!(
            rows[0].get("vlans").map(|d| d.referenced_rows()),
            Some(vec![vlan])
        );

        let stored = store.get_row(vlan).unwrap().unwrap();
        assert_eq!(stored.table, "VLAN");
        assert_eq!(stored.get("id"), Some(&Datum::Scalar(json!(10))));
    }

    #[test]
    fn test_update_and_delete() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let (a, b) = {
            let mut txn = Transaction::begin(&mut store).unwrap();
            let a = txn.insert("Port");
            let b = txn.insert("Port");
            txn.commit().unwrap();
            (a, b)
        };

        {
            let mut txn = Transaction::begin(&mut store).unwrap();
            txn.set(a, "admin", Datum::Scalar(json!("up"))).unwrap();
            txn.delete(b).unwrap();
            txn.commit().unwrap();
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.tables.get("Port"), Some(&1));
        assert!(store.get_row(b).unwrap().is_none());
        assert_eq!(
            store.get_row(a).unwrap().unwrap().get("admin"),
            Some(&Datum::Scalar(json!("up")))
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let id = {
            let mut store = SqliteStore::open(&path).unwrap();
            let mut txn = Transaction::begin(&mut store).unwrap();
            let id = txn.insert("System");
            txn.set(id, "hostname", Datum::Scalar(json!("switch"))).unwrap();
            txn.commit().unwrap();
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        let rows = store.load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
    }

    #[test]
    fn test_unchanged_commit_is_not_logged() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let txn = Transaction::begin(&mut store).unwrap();
        assert_eq!(txn.commit().unwrap(), CommitStatus::Unchanged);
        assert_eq!(store.count_commits().unwrap(), 0);
    }
}
