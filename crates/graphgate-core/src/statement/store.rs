//! Persisted statements and allow list.
//!
//! Statements are keyed by the big-endian bytes of their id so that the
//! same (query, role) pair maps to the same key across restarts.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::prepared::{query_name, PreparedStatement};
use crate::error::{Error, Result};

const STATEMENT_TREE_NAME: &[u8] = b"graphgate:statements";
const ALLOW_LIST_TREE_NAME: &[u8] = b"graphgate:allow_list";

/// A query approved for preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedQuery {
    /// Normalized query name.
    pub name: String,
    pub query: String,
    /// Example variables as JSON text, used by compilers that derive
    /// statement shape from them.
    #[serde(default)]
    pub variables: Option<String>,
}

impl AllowedQuery {
    pub fn new(query: impl Into<String>, variables: Option<&[u8]>) -> Result<Self> {
        let query = query.into();
        let variables = match variables {
            Some(v) if !v.is_empty() => {
                serde_json::from_slice::<IgnoredAny>(v)
                    .map_err(|e| Error::InvalidRequest(format!("variables: {}", e)))?;
                Some(String::from_utf8_lossy(v).into_owned())
            }
            _ => None,
        };
        Ok(Self {
            name: query_name(&query),
            query,
            variables,
        })
    }

    pub fn variables(&self) -> Option<&[u8]> {
        self.variables.as_deref().map(str::as_bytes)
    }
}

/// sled-backed store of prepared statements and allowed queries.
#[derive(Clone)]
pub struct StatementStore {
    statements: sled::Tree,
    allow_list: sled::Tree,
}

impl StatementStore {
    /// Open the store's trees in `db`.
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            statements: db.open_tree(STATEMENT_TREE_NAME)?,
            allow_list: db.open_tree(ALLOW_LIST_TREE_NAME)?,
        })
    }

    pub fn put_statement(&self, statement: &PreparedStatement) -> Result<()> {
        let value = serialize(statement)?;
        self.statements.insert(statement.id.to_be_bytes(), value)?;
        Ok(())
    }

    pub fn get_statement(&self, id: u64) -> Result<Option<PreparedStatement>> {
        match self.statements.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All statements, ordered by id.
    pub fn statements(&self) -> Result<Vec<PreparedStatement>> {
        self.statements
            .iter()
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }

    pub fn remove_statement(&self, id: u64) -> Result<bool> {
        Ok(self.statements.remove(id.to_be_bytes())?.is_some())
    }

    /// Record a query in the allow list, replacing any entry with the same
    /// normalized name.
    pub fn allow(&self, query: &AllowedQuery) -> Result<()> {
        let value = serialize(query)?;
        self.allow_list.insert(query.name.as_bytes(), value)?;
        Ok(())
    }

    pub fn allowed(&self, name: &str) -> Result<Option<AllowedQuery>> {
        match self.allow_list.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All allowed queries, ordered by name.
    pub fn allow_list(&self) -> Result<Vec<AllowedQuery>> {
        self.allow_list
            .iter()
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.statements.flush()?;
        self.allow_list.flush()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.statements.clear()?;
        self.allow_list.clear()?;
        Ok(())
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Store(format!("serialization error: {}", e)))
}

fn deserialize<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Store(format!("deserialization error: {}", e)))
}
