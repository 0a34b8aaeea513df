//! In-memory backend

use super::{Backend, Change, Row};
use crate::Result;

/// Rows kept in process memory, in insertion order
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: Vec<Row>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits applied so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Backend for MemoryStore {
    fn load(&self) -> Result<Vec<Row>> {
        Ok(self.rows.clone())
    }

    fn apply(&mut self, changes: &[Change]) -> Result<()> {
        for change in changes {
            match change {
                Change::Delete { id, .. } => self.rows.retain(|r| r.id != *id),
                Change::Upsert(row) => match self.rows.iter_mut().find(|r| r.id == row.id) {
                    Some(existing) => *existing = row.clone(),
                    None => self.rows.push(row.clone()),
                },
            }
        }
        self.commits += 1;
        Ok(())
    }
}
