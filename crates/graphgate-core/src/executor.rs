//! Transactional execution.
//!
//! A [`Session`] is the single owner of a request's storage work. It may or
//! may not hold a transaction; either way every blocking call is bounded by
//! the request deadline, and [`Session::finish`] settles the transaction:
//! commit on success, exactly one rollback on failure.

use std::future::Future;

use tokio::time::Instant;
use tracing::warn;

use crate::error::{Error, Result};
use crate::storage::{ArgValue, Database, Row, StorageError, Transaction};

/// Statement that publishes the caller's user id to row-level policies for
/// the rest of the transaction.
pub const SET_USER_ID_SQL: &str = "SELECT set_config('user.id', $1, true)";

/// Storage access for one request.
pub struct Session<'a> {
    db: &'a dyn Database,
    tx: Option<Box<dyn Transaction>>,
    deadline: Option<Instant>,
}

impl<'a> Session<'a> {
    /// Open a session, beginning a transaction if `transactional` is set.
    pub async fn open(
        db: &'a dyn Database,
        transactional: bool,
        deadline: Option<Instant>,
    ) -> Result<Session<'a>> {
        let tx = if transactional {
            Some(bounded(deadline, db.begin()).await?)
        } else {
            None
        };
        Ok(Self { db, tx, deadline })
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Set the transaction-local `user.id` setting.
    pub async fn set_user_id(&mut self, user_id: &str) -> Result<()> {
        self.exec(SET_USER_ID_SQL, &[ArgValue::Text(user_id.to_string())])
            .await
            .map(|_| ())
    }

    /// Run a statement that must return exactly one row.
    pub async fn query_row(&mut self, sql: &str, args: &[ArgValue]) -> Result<Row> {
        match self.tx.as_mut() {
            Some(tx) => bounded(self.deadline, tx.query_row(sql, args)).await,
            None => bounded(self.deadline, self.db.query_row(sql, args)).await,
        }
    }

    pub async fn exec(&mut self, sql: &str, args: &[ArgValue]) -> Result<u64> {
        match self.tx.as_mut() {
            Some(tx) => bounded(self.deadline, tx.exec(sql, args)).await,
            None => bounded(self.deadline, self.db.exec(sql, args)).await,
        }
    }

    /// Settle the session with the outcome of the request.
    ///
    /// On `Ok` the transaction is committed; a failed commit becomes the
    /// result. On `Err` it is rolled back and the original error is
    /// returned even if the rollback fails.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        let Some(tx) = self.tx else {
            return result;
        };

        match result {
            Ok(value) => {
                bounded(self.deadline, tx.commit()).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, original = %e, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn bounded<T, F>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StorageError>>,
{
    match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::DeadlineExceeded),
        },
        None => fut.await.map_err(Error::from),
    }
}
