//! Query-related data models.
//!
//! This module defines the arguments an operation is called with and the
//! output it produces.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One result row: column name to decoded value, in the order the query
/// selected the columns.
pub type Record = serde_json::Map<String, JsonValue>;

/// Name of the argument holding the query text.
pub const QUERY_ARG: &str = "query";

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Arguments an operation is invoked with: positional parameters plus named
/// arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    pub positional: Vec<QueryParam>,
    #[serde(default)]
    pub named: BTreeMap<String, QueryParam>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments carrying only the query text.
    pub fn query(sql: impl Into<String>) -> Self {
        Self::new().with_named(QUERY_ARG, sql.into())
    }

    /// Add a positional parameter.
    pub fn with_param(mut self, param: impl Into<QueryParam>) -> Self {
        self.positional.push(param.into());
        self
    }

    /// Add or replace a named argument.
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.named.get(name)
    }

    /// The query text, when supplied as the `query` named argument.
    pub fn query_text(&self) -> Option<&str> {
        self.get(QUERY_ARG).and_then(QueryParam::as_str)
    }
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    /// All rows of a result set
    Rows(Vec<Record>),
    /// At most one row
    Row(Option<Record>),
    /// Rows touched by a write
    Affected(u64),
}

impl Output {
    /// Row count for reads, affected count for writes.
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Row(row) => usize::from(row.is_some()),
            Self::Affected(n) => *n as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapse into a row list. A single row becomes a one-element list.
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            Self::Rows(rows) => rows,
            Self::Row(row) => row.into_iter().collect(),
            Self::Affected(_) => Vec::new(),
        }
    }

    /// First row of the output, if any.
    pub fn into_row(self) -> Option<Record> {
        match self {
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Row(row) => row,
            Self::Affected(_) => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Affected(n) => Some(*n),
            _ => None,
        }
    }
}
