//! Storage engine abstraction.
//!
//! The engine only needs a handful of primitives from the backing store:
//! beginning a transaction, running a statement that yields exactly one row,
//! executing a statement, and committing or rolling back. Backends implement
//! [`Database`] and [`Transaction`]; the PostgreSQL backend lives behind the
//! `postgres` feature.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The statement returned no rows.
    #[error("no rows in result set")]
    NoRows,

    /// The statement returned more than one row.
    #[error("statement returned more than one row")]
    TooManyRows,

    /// A column index past the end of the row was requested.
    #[error("column {index} out of range for row with {len} columns")]
    ColumnOutOfRange { index: usize, len: usize },

    /// A column held a value of an unexpected type.
    #[error("column {index}: {message}")]
    Decode { index: usize, message: String },

    /// Error reported by the backend.
    #[error("{0}")]
    Backend(String),
}

/// A bound statement argument or a scanned column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Text(String),
    Json(JsonValue),
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Text(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Text(s)
    }
}

impl From<Option<String>> for ArgValue {
    fn from(s: Option<String>) -> Self {
        s.map(ArgValue::Text).unwrap_or(ArgValue::Null)
    }
}

impl From<JsonValue> for ArgValue {
    fn from(v: JsonValue) -> Self {
        ArgValue::Json(v)
    }
}

/// A single result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub columns: Vec<ArgValue>,
}

impl Row {
    pub fn new(columns: Vec<ArgValue>) -> Self {
        Self { columns }
    }

    fn column(&self, index: usize) -> Result<&ArgValue, StorageError> {
        self.columns.get(index).ok_or(StorageError::ColumnOutOfRange {
            index,
            len: self.columns.len(),
        })
    }

    /// Read a column as text. NULL reads as `None`.
    pub fn text(&self, index: usize) -> Result<Option<String>, StorageError> {
        match self.column(index)? {
            ArgValue::Null => Ok(None),
            ArgValue::Text(s) => Ok(Some(s.clone())),
            ArgValue::Json(JsonValue::String(s)) => Ok(Some(s.clone())),
            ArgValue::Json(v) => Ok(Some(v.to_string())),
        }
    }

    /// Read a column as raw JSON bytes. NULL reads as an empty document.
    ///
    /// Text columns are returned byte for byte. `Json` values are
    /// re-serialized, so backends return result documents as text.
    pub fn json_bytes(&self, index: usize) -> Result<Vec<u8>, StorageError> {
        match self.column(index)? {
            ArgValue::Null => Ok(Vec::new()),
            ArgValue::Text(s) => Ok(s.as_bytes().to_vec()),
            ArgValue::Json(v) => serde_json::to_vec(v).map_err(|e| StorageError::Decode {
                index,
                message: e.to_string(),
            }),
        }
    }
}

/// A connection pool or client able to run statements and open transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Run a statement outside a transaction; it must return exactly one row.
    async fn query_row(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError>;

    /// Execute a statement outside a transaction, returning rows affected.
    async fn exec(&self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError>;
}

/// An open transaction, exclusively owned by one request.
#[async_trait]
pub trait Transaction: Send {
    /// Run a statement; it must return exactly one row.
    async fn query_row(&mut self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError>;

    /// Execute a statement, returning rows affected.
    async fn exec(&mut self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
