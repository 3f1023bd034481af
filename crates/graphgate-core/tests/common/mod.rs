//! Shared test doubles for pipeline tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use graphgate_core::security::OperationKind;
use graphgate_core::statement::{CompileError, QueryCompiler, SelectionNode, SelectionTree, Statement};
use graphgate_core::{ArgValue, Database, Role, Row, StorageError, Transaction};

pub const ROLE_QUERY: &str = "SELECT role FROM user_roles WHERE user_id = $1";

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub begin: usize,
    pub commit: usize,
    pub rollback: usize,
    pub queries: Vec<(String, Vec<ArgValue>)>,
    pub execs: Vec<(String, Vec<ArgValue>)>,
}

type Handler = dyn Fn(&str, &[ArgValue]) -> Result<Row, StorageError> + Send + Sync;

/// In-memory database that records every call.
#[derive(Clone)]
pub struct RecordingDatabase {
    calls: Arc<Mutex<Calls>>,
    handler: Arc<Handler>,
    delay: Option<Duration>,
}

impl RecordingDatabase {
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

    /// The role query returns `role`; every other query returns `data`.
    pub fn with_role(role: &'static str, data: &'static str) -> Self {
        Self::new(move |sql, _| {
            if sql == ROLE_QUERY {
                Ok(Row::new(vec![ArgValue::from(role)]))
            } else {
                Ok(Row::new(vec![ArgValue::from(data)]))
            }
        })
    }

    /// Every query returns a single JSON column.
    pub fn returning(data: &'static str) -> Self {
        Self::new(move |_, _| Ok(Row::new(vec![ArgValue::from(data)])))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    async fn query(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
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
impl Database for RecordingDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        self.calls.lock().unwrap().begin += 1;
        Ok(Box::new(RecordingTransaction { db: self.clone() }))
    }

    async fn query_row(&self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        self.query(sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[ArgValue]) -> Result<u64, StorageError> {
        Ok(self.record_exec(sql, args))
    }
}

struct RecordingTransaction {
    db: RecordingDatabase,
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn query_row(&mut self, sql: &str, args: &[ArgValue]) -> Result<Row, StorageError> {
        self.db.query(sql, args).await
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

/// `products` with a paginated root and an `owner` child on `users`.
pub fn products_selection() -> SelectionTree {
    SelectionTree::new(vec![
        SelectionNode::root(0, "products", "products").with_cursor(),
        SelectionNode::child(1, 0, "owner", "users"),
    ])
    .unwrap()
}

pub fn statement(role: &str, kind: OperationKind, text: &str) -> Statement {
    Statement {
        role: Role::new(role),
        kind,
        text: text.to_string(),
        selection: products_selection(),
        role_branching: false,
    }
}

/// Compiler that returns canned statements for every query.
pub struct FakeCompiler {
    statements: Vec<Statement>,
}

impl FakeCompiler {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

impl QueryCompiler for FakeCompiler {
    fn compile(
        &self,
        query: &str,
        _variables: Option<&[u8]>,
        role: &Role,
    ) -> Result<Vec<Statement>, CompileError> {
        if query.contains("secret") {
            return Err(CompileError::new("column 'secret' is not allowed"));
        }
        if self.statements.len() > 1 {
            return Ok(self.statements.clone());
        }
        Ok(self
            .statements
            .iter()
            .cloned()
            .map(|mut s| {
                s.role = role.clone();
                s
            })
            .collect())
    }
}
