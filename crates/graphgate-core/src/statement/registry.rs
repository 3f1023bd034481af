//! Immutable registry of pre-approved statements for locked mode.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::compiler::QueryCompiler;
use super::prepared::{query_name, statement_id, PreparedStatement};
use super::store::{AllowedQuery, StatementStore};
use crate::error::Result;
use crate::security::{QueryType, Role};

/// Prepared statements keyed by [`statement_id`].
///
/// Built once and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: HashMap<u64, Arc<PreparedStatement>>,
}

impl StatementRegistry {
    pub fn new(statements: impl IntoIterator<Item = PreparedStatement>) -> Self {
        Self {
            statements: statements
                .into_iter()
                .map(|s| (s.id, Arc::new(s)))
                .collect(),
        }
    }

    /// Load every statement persisted in `store`.
    pub fn from_store(store: &StatementStore) -> Result<Self> {
        let registry = Self::new(store.statements()?);
        info!(statements = registry.len(), "loaded prepared statements");
        Ok(registry)
    }

    /// Compile every allowed query.
    ///
    /// Queries are compiled for the `user` role, which may yield one branch
    /// per role, and for `anon`. Mutations are compiled once per role in
    /// `roles`. Queries that fail to compile are logged and left out.
    pub fn prepare(compiler: &dyn QueryCompiler, queries: &[AllowedQuery], roles: &[Role]) -> Self {
        let mut statements = Vec::new();

        for allowed in queries {
            let targets: Vec<Role> = match QueryType::detect(&allowed.query) {
                QueryType::Query => vec![Role::user(), Role::anon()],
                QueryType::Mutation => roles.to_vec(),
            };

            for role in targets {
                let compiled = compiler
                    .compile(&allowed.query, allowed.variables(), &role)
                    .map_err(crate::Error::from)
                    .and_then(|s| PreparedStatement::from_statements(&allowed.query, role.clone(), s));

                match compiled {
                    Ok(statement) => statements.push(statement),
                    Err(e) => warn!(
                        query = %allowed.name,
                        role = %role,
                        error = %e,
                        "failed to prepare statement"
                    ),
                }
            }
        }

        let registry = Self::new(statements);
        info!(
            queries = queries.len(),
            statements = registry.len(),
            "prepared statements"
        );
        registry
    }

    /// Write every statement to `store`.
    pub fn persist(&self, store: &StatementStore) -> Result<()> {
        for statement in self.statements.values() {
            store.put_statement(statement)?;
        }
        store.flush()
    }

    /// Statement for a query text and role.
    ///
    /// The stored name and role must match exactly; an id hit alone is not
    /// an approval.
    pub fn get(&self, query: &str, role: &str) -> Option<Arc<PreparedStatement>> {
        let name = query_name(query);
        self.get_by_id(statement_id(&name, role))
            .filter(|s| s.name == name && s.role.as_str() == role)
    }

    pub fn get_by_id(&self, id: u64) -> Option<Arc<PreparedStatement>> {
        self.statements.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PreparedStatement>> {
        self.statements.values()
    }
}
