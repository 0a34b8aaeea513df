//! Column values - typed contents of a row
//!
//! Every stored column holds one `Datum`:
//! - `Scalar`: config data (string, number, boolean, set, map)
//! - `Reference`: a single optional row (parent pointers)
//! - `ReferenceList`: an ordered list of rows
//! - `ReferenceMap`: key → row, for key-value typed reference columns

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Store-assigned unique identifier of a row
pub type RowId = uuid::Uuid;

/// Key of a key-value typed reference column
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapKey {
    Integer(i64),
    String(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Integer(i) => write!(f, "{}", i),
            MapKey::String(s) => write!(f, "{}", s),
        }
    }
}

/// Value stored in one column of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Datum {
    Scalar(Value),
    Reference(Option<RowId>),
    ReferenceList(Vec<RowId>),
    ReferenceMap(#[serde(with = "map_entries")] BTreeMap<MapKey, RowId>),
}

impl Datum {
    /// The type-appropriate empty value for this datum
    pub fn empty_like(&self) -> Datum {
        match self {
            Datum::Scalar(v) => Datum::Scalar(empty_scalar(v)),
            Datum::Reference(_) => Datum::Reference(None),
            Datum::ReferenceList(_) => Datum::ReferenceList(Vec::new()),
            Datum::ReferenceMap(_) => Datum::ReferenceMap(BTreeMap::new()),
        }
    }

    /// All rows this datum points at, in stored order
    pub fn referenced_rows(&self) -> Vec<RowId> {
        match self {
            Datum::Scalar(_) => Vec::new(),
            Datum::Reference(r) => r.iter().copied().collect(),
            Datum::ReferenceList(list) => list.clone(),
            Datum::ReferenceMap(map) => map.values().copied().collect(),
        }
    }

    /// String form used when matching index tokens
    pub fn index_string(&self) -> String {
        match self {
            Datum::Scalar(Value::String(s)) => s.clone(),
            Datum::Scalar(v) => v.to_string(),
            Datum::Reference(Some(id)) => id.to_string(),
            Datum::Reference(None) => String::new(),
            Datum::ReferenceList(list) => list
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            Datum::ReferenceMap(map) => map
                .iter()
                .map(|(k, id)| format!("{}={}", k, id))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Datum::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<RowId> {
        match self {
            Datum::Reference(r) => *r,
            _ => None,
        }
    }
}

fn empty_scalar(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) => Value::Bool(false),
        Value::Number(n) if n.is_f64() => Value::from(0.0),
        Value::Number(_) => Value::from(0),
        Value::String(_) => Value::String(String::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(serde_json::Map::new()),
    }
}

/// Key-value maps are stored as `[key, row]` pairs since JSON object keys
/// must be strings.
mod map_entries {
    use super::{MapKey, RowId};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<MapKey, RowId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<MapKey, RowId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs: Vec<(MapKey, RowId)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
