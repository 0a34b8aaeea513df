//! Schema model - per-table metadata driving reconciliation
//!
//! Tables form a containment tree. Every reference column has one of three
//! relation kinds:
//! - `Child`: the owning row holds references to rows it contains
//! - `Parent`: the contained row points back at its owner
//! - `Plain`: a non-owning association between independently rooted rows

use crate::{Error, MapKey, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

/// Name of the implicit row identifier column
pub const UUID_COLUMN: &str = "uuid";

/// Relation kind of a reference column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Containment, owner → contained row
    Child,
    /// Containment, contained row → owner
    Parent,
    /// Association between independently rooted rows
    #[serde(alias = "reference")]
    Plain,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Child => "child",
            RelationKind::Parent => "parent",
            RelationKind::Plain => "plain",
        }
    }

}

impl FromStr for RelationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "child" => Ok(RelationKind::Child),
            "parent" => Ok(RelationKind::Parent),
            "plain" | "reference" => Ok(RelationKind::Plain),
            _ => Err(Error::Schema(format!("Unknown relation kind: {}", s))),
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared key type of a key-value typed reference column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Integer,
    String,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Integer => "integer",
            KeyType::String => "string",
        }
    }

    /// Cast a raw key to this type
    pub fn cast(&self, raw: &str) -> Option<MapKey> {
        match self {
            KeyType::Integer => raw.trim().parse::<i64>().ok().map(MapKey::Integer),
            KeyType::String => Some(MapKey::String(raw.to_string())),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Reference column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Target table
    pub table: String,
    pub relation: RelationKind,
    #[serde(default = "default_true")]
    pub mutable: bool,
    /// Set for key-value typed columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
}

impl ReferenceSpec {
    pub fn new(table: impl Into<String>, relation: RelationKind) -> Self {
        Self {
            table: table.into(),
            relation,
            mutable: true,
            key_type: None,
        }
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn keyed(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    pub fn is_kv(&self) -> bool {
        self.key_type.is_some()
    }
}

/// Config column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(default = "default_true")]
    pub mutable: bool,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self { mutable: true }
    }
}

fn default_indexes() -> Vec<String> {
    vec![UUID_COLUMN.to_string()]
}

/// Static metadata of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Filled from the key of the schema's table map
    #[serde(skip)]
    pub name: String,
    /// Owning table; `None` for root tables
    #[serde(default)]
    pub parent: Option<String>,
    /// Child relationship names: forward reference columns, or names of
    /// child tables holding a parent pointer (backward)
    #[serde(default)]
    pub children: BTreeSet<String>,
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceSpec>,
    /// Ordered index columns; `uuid` stands for the row identifier
    #[serde(default = "default_indexes")]
    pub indexes: Vec<String>,
    #[serde(default)]
    pub config: BTreeMap<String, ColumnSpec>,
    /// Root table with a single implicit row, written without a token
    #[serde(default)]
    pub singleton: bool,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: BTreeSet::new(),
            references: BTreeMap::new(),
            indexes: default_indexes(),
            config: BTreeMap::new(),
            singleton: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Index columns other than the row identifier
    pub fn index_columns(&self) -> impl Iterator<Item = &str> {
        self.indexes
            .iter()
            .map(String::as_str)
            .filter(|c| *c != UUID_COLUMN)
    }

    /// Whether rows have an external key besides their identifier
    pub fn has_natural_index(&self) -> bool {
        self.index_columns().next().is_some()
    }

    /// Forward children: reference columns owned by this table
    pub fn forward_children(&self) -> impl Iterator<Item = (&str, &ReferenceSpec)> {
        self.children
            .iter()
            .filter_map(|name| self.references.get(name).map(|spec| (name.as_str(), spec)))
    }

    /// Backward children: child tables holding a pointer to this table
    pub fn backward_children(&self) -> impl Iterator<Item = &str> {
        self.children
            .iter()
            .filter(|name| !self.references.contains_key(*name))
            .map(String::as_str)
    }

    /// Plain association columns
    pub fn plain_references(&self) -> impl Iterator<Item = (&str, &ReferenceSpec)> {
        self.references
            .iter()
            .filter(|(_, spec)| spec.relation == RelationKind::Plain)
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// The column pointing at this table's owner, if any
    pub fn parent_column(&self) -> Option<&str> {
        self.references
            .iter()
            .find(|(_, spec)| spec.relation == RelationKind::Parent)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Build a schema from tables, naming and validating them
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Result<Self> {
        let schema = Self {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(contents)?;
        schema.named().validated()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let schema: Schema = toml::from_str(contents).map_err(|e| Error::Parse(e.to_string()))?;
        schema.named().validated()
    }

    /// Load a schema file; `.toml` files are parsed as TOML, anything else as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    fn named(mut self) -> Self {
        for (name, table) in self.tables.iter_mut() {
            table.name = name.clone();
        }
        self
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Tables synchronized directly from the document root
    pub fn root_tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values().filter(|t| t.is_root())
    }

    /// Check the structural invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            self.validate_table(table)?;
        }
        self.check_containment_cycles()
    }

    fn validate_table(&self, table: &TableSchema) -> Result<()> {
        let name = &table.name;

        if let Some(parent) = &table.parent {
            if !self.tables.contains_key(parent) {
                return Err(Error::Schema(format!("{}: unknown parent table {}", name, parent)));
            }
        }
        if table.singleton && !table.is_root() {
            return Err(Error::Schema(format!("{}: singleton table must be a root table", name)));
        }

        for (column, spec) in &table.references {
            if !self.tables.contains_key(&spec.table) {
                return Err(Error::Schema(format!(
                    "{}.{}: unknown target table {}",
                    name, column, spec.table
                )));
            }
            if table.config.contains_key(column) {
                return Err(Error::Schema(format!(
                    "{}.{}: column is both config and reference",
                    name, column
                )));
            }
            match spec.relation {
                RelationKind::Child if !table.children.contains(column) => {
                    return Err(Error::Schema(format!(
                        "{}.{}: child reference is not listed in children",
                        name, column
                    )));
                }
                RelationKind::Parent | RelationKind::Plain if table.children.contains(column) => {
                    return Err(Error::Schema(format!(
                        "{}.{}: {} reference cannot be a child relationship",
                        name, column, spec.relation
                    )));
                }
                _ => {}
            }
        }
        let parents = table
            .references
            .values()
            .filter(|spec| spec.relation == RelationKind::Parent)
            .count();
        if parents > 1 {
            return Err(Error::Schema(format!("{}: more than one parent column", name)));
        }

        for child in table.backward_children() {
            let child_table = self.tables.get(child).ok_or_else(|| {
                Error::Schema(format!("{}: unknown child table {}", name, child))
            })?;
            if table.config.contains_key(child) {
                return Err(Error::Schema(format!(
                    "{}.{}: column is both config and child table",
                    name, child
                )));
            }
            let points_back = child_table
                .parent_column()
                .and_then(|col| child_table.references.get(col))
                .is_some_and(|spec| spec.table == *name);
            if !points_back {
                return Err(Error::Schema(format!(
                    "{}: child table {} has no parent column pointing at it",
                    name, child
                )));
            }
        }

        for column in table.index_columns() {
            if table.config.contains_key(column) {
                return Err(Error::Schema(format!(
                    "{}.{}: column is both config and index",
                    name, column
                )));
            }
            if table.references.contains_key(column) || table.children.contains(column) {
                return Err(Error::Schema(format!(
                    "{}.{}: index column cannot be a reference",
                    name, column
                )));
            }
        }

        Ok(())
    }

    fn check_containment_cycles(&self) -> Result<()> {
        fn visit<'s>(
            schema: &'s Schema,
            table: &'s str,
            path: &mut Vec<&'s str>,
            done: &mut HashSet<&'s str>,
        ) -> Result<()> {
            if done.contains(table) {
                return Ok(());
            }
            if path.contains(&table) {
                return Err(Error::Schema(format!(
                    "containment cycle: {} -> {}",
                    path.join(" -> "),
                    table
                )));
            }
            path.push(table);
            if let Some(t) = schema.tables.get(table) {
                for (_, spec) in t.forward_children() {
                    visit(schema, &spec.table, path, done)?;
                }
                for child in t.backward_children() {
                    visit(schema, child, path, done)?;
                }
            }
            path.pop();
            done.insert(table);
            Ok(())
        }

        let mut done = HashSet::new();
        for name in self.tables.keys() {
            visit(self, name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }
}
