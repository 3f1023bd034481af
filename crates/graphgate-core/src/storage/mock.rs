//! Recording storage double for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ArgValue, Database, Row, StorageError, Transaction};

type Handler = dyn Fn(&str, &[ArgValue]) -> Result<Row, StorageError> + Send + Sync;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Calls {
    pub begin: usize,
    pub commit: usize,
    pub rollback: usize,
    pub queries: Vec<(String, Vec<ArgValue>)>,
    pub execs: Vec<(String, Vec<ArgValue>)>,
}

#[derive(Clone)]
pub(crate) struct MockDatabase {
    calls: Arc<Mutex<Calls>>,
    handler: Arc<Handler>,
    delay: Option<Duration>,
}

impl MockDatabase {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[ArgValue]) -> Result<Row, StorageError> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            handler: Arc::new(handler),
            delay: None,
        }
    }

    /// Every query returns a single row with these columns.
    pub fn returning(columns: Vec<ArgValue>) -> Self {
        Self::new(move |_, _| Ok(Row::new(columns.clone())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    async fn run_query(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .queries
            .push((sql.to_string(), args.to_vec()));
        (self.handler)(sql, args)
    }

    fn record_exec(&self, sql: &str, args: &[ArgValue]) -> u64 {
        self.calls
            .lock()
            .unwrap()
            .execs
            .push((sql.to_string(), args.to_vec()));
        1
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        self.calls.lock().unwrap().begin += 1;
        Ok(Box::new(MockTransaction { db: self.clone() }))
    }

    async fn query_row(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        self.run_query(sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError> {
        Ok(self.record_exec(sql, args))
    }
}

struct MockTransaction {
    db: MockDatabase,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query_row(&mut self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        self.db.run_query(sql, args).await
    }

    async fn exec(&mut self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError> {
        Ok(self.db.record_exec(sql, args))
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.db.calls.lock().unwrap().commit += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.db.calls.lock().unwrap().rollback += 1;
        Ok(())
    }
}
