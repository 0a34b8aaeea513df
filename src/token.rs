//! Index tokens - external identity for rows
//!
//! A token is either a row identifier or an escaped composite key:
//!
//! - `6f1c2a9e-3b7d-4c1e-9a55-0d8f2b7e4c10` (row identifier)
//! - `br0` (single index column)
//! - `10.0.0.1/aa%3Abb%3Acc%3A00%3A11%3A22` (two index columns)
//!
//! Composite values are percent-encoded and joined with `/`, in the order
//! the table schema declares its index columns.

use crate::value::RowId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between composite key components
pub const COMPONENT_SEPARATOR: char = '/';

/// External identifier for a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexToken {
    /// The store-assigned row identifier
    Row(RowId),
    /// One unescaped value per index column
    Composite(Vec<String>),
}

impl IndexToken {
    /// Parse a raw token. Anything that reads as a UUID is a row identifier.
    pub fn parse(raw: &str) -> Self {
        match RowId::parse_str(raw) {
            Ok(id) => IndexToken::Row(id),
            Err(_) => IndexToken::Composite(escaped_split(raw)),
        }
    }

    /// Build a composite token from unescaped column values
    pub fn composite<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexToken::Composite(values.into_iter().map(Into::into).collect())
    }

    /// Convert to the escaped string form used as a document key
    pub fn to_token_string(&self) -> String {
        match self {
            IndexToken::Row(id) => id.to_string(),
            IndexToken::Composite(values) => escaped_join(values),
        }
    }

    pub fn as_row(&self) -> Option<RowId> {
        match self {
            IndexToken::Row(id) => Some(*id),
            IndexToken::Composite(_) => None,
        }
    }
}

/// Split an escaped composite string into its unescaped components.
///
/// Components that are not valid percent-encoding are kept verbatim.
pub fn escaped_split(raw: &str) -> Vec<String> {
    raw.split(COMPONENT_SEPARATOR)
        .map(|part| {
            urlencoding::decode(part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| part.to_string())
        })
        .collect()
}

/// Escape and join column values into a composite string
pub fn escaped_join<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| urlencoding::encode(v.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(COMPONENT_SEPARATOR.to_string().as_str())
}

impl fmt::Display for IndexToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_token_string())
    }
}

impl FromStr for IndexToken {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for IndexToken {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_token_string())
    }
}

impl<'de> Deserialize<'de> for IndexToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(IndexToken::parse(&s))
    }
}
