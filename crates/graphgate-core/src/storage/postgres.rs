//! PostgreSQL backend over an `sqlx` connection pool.

use async_trait::async_trait;
use serde_json::value::RawValue;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};

use super::{ArgValue, Database, Row, StorageError, Transaction};

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NoRows,
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// [`Database`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn query_row(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        let rows = bind(sqlx::query(sql), args).fetch_all(&self.pool).await?;
        single_row(rows)
    }

    async fn exec(&self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError> {
        let result = bind(sqlx::query(sql), args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// [`Transaction`] over a pooled PostgreSQL connection.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn query_row(&mut self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        let rows = bind(sqlx::query(sql), args).fetch_all(&mut *self.tx).await?;
        single_row(rows)
    }

    async fn exec(&mut self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError> {
        let result = bind(sqlx::query(sql), args).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &'q [ArgValue],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            ArgValue::Null => query.bind(None::<String>),
            ArgValue::Text(s) => query.bind(s.as_str()),
            ArgValue::Json(v) => query.bind(sqlx::types::Json(v.clone())),
        };
    }
    query
}

fn single_row(rows: Vec<PgRow>) -> Result<Row, StorageError> {
    match rows.as_slice() {
        [] => Err(StorageError::NoRows),
        [row] => decode(row),
        _ => Err(StorageError::TooManyRows),
    }
}

/// Every column decodes as text. JSON and JSONB columns keep the exact
/// bytes the server sent, so key order and number formatting survive.
fn decode(row: &PgRow) -> Result<Row, StorageError> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "JSON" | "JSONB" => row
                .try_get::<Option<sqlx::types::Json<Box<RawValue>>>, _>(index)?
                .map(|json| raw_column(json.0)),
            _ => row.try_get::<Option<String>, _>(index)?.map(ArgValue::Text),
        };
        columns.push(value.unwrap_or(ArgValue::Null));
    }
    Ok(Row::new(columns))
}

fn raw_column(raw: Box<RawValue>) -> ArgValue {
    ArgValue::Text(String::from(raw.get()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_column_kept_verbatim() {
        let text = r#"{"products":[{"name":"x","id":12345678901234567890123,"price":1.10}]}"#;
        let raw: Box<RawValue> = serde_json::from_str(text).unwrap();

        let row = Row::new(vec![raw_column(raw)]);
        assert_eq!(row.json_bytes(0).unwrap(), text.as_bytes());
    }
}
