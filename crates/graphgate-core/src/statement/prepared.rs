//! Prepared statements and their identifiers.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use super::compiler::{CompileError, Statement};
use super::selection::SelectionTree;
use super::template;
use crate::error::{Error, Result};
use crate::security::{OperationKind, Role};

/// How a bound argument gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// Read from the request variables.
    Value,
    /// Read from the request variables and decrypted.
    Cursor,
    /// The caller's user id.
    UserId,
    /// The caller's identity provider.
    UserIdProvider,
}

impl ArgKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "cursor" => ArgKind::Cursor,
            "user_id" => ArgKind::UserId,
            "user_id_provider" => ArgKind::UserIdProvider,
            _ => ArgKind::Value,
        }
    }
}

/// A positional statement argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescriptor {
    pub name: String,
    pub kind: ArgKind,
}

impl ArgDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = ArgKind::from_name(&name);
        Self { name, kind }
    }
}

/// A role branch of a prepared statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub role: Role,
    pub kind: OperationKind,
    pub selection: SelectionTree,
}

/// A pre-approved, parameterized statement for one (query, role) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedStatement {
    /// [`statement_id`] of the normalized query name and role.
    pub id: u64,
    /// Normalized query name.
    pub name: String,
    pub role: Role,
    /// SQL text with positional parameters.
    pub text: String,
    pub args: Vec<ArgDescriptor>,
    /// Whether the SQL returns a leading role column.
    pub role_column: bool,
    pub branches: Vec<Branch>,
}

impl PreparedStatement {
    /// Build from compiler output for `query` compiled as `role`.
    pub fn from_statements(query: &str, role: Role, statements: Vec<Statement>) -> Result<Self> {
        let first = statements
            .first()
            .ok_or_else(|| Error::CompileFailed(CompileError::new("compiler returned no statements")))?;

        let name = query_name(query);
        let (text, args) = template::parameterize(&first.text);
        let role_column = statements.len() > 1;
        let branches = statements
            .into_iter()
            .map(|s| Branch {
                role: s.role,
                kind: s.kind,
                selection: s.selection,
            })
            .collect();

        Ok(Self {
            id: statement_id(&name, role.as_str()),
            name,
            role,
            text,
            args,
            role_column,
            branches,
        })
    }

    /// The branch to use for a database-returned role.
    ///
    /// Single-branch statements always use their only branch.
    pub fn branch(&self, role: Option<&str>) -> Option<&Branch> {
        select_branch(&self.branches, self.role_column, role)
    }
}

pub(crate) fn select_branch<'a>(
    branches: &'a [Branch],
    role_column: bool,
    role: Option<&str>,
) -> Option<&'a Branch> {
    if !role_column {
        return branches.first();
    }
    let role = role?;
    branches.iter().find(|b| b.role.as_str() == role)
}

/// Normalize a query to the identifier used for statement lookup.
///
/// Named operations (`query getUser { ... }`) normalize to their lowercased
/// name; anonymous ones to their text with whitespace runs collapsed.
pub fn query_name(query: &str) -> String {
    let mut words = query.split(|c: char| c.is_whitespace() || c == '{' || c == '(');
    let first = words.find(|w| !w.is_empty());

    if let Some(op) = first {
        let is_operation =
            matches!(op.to_ascii_lowercase().as_str(), "query" | "mutation" | "subscription");
        if let Some(after) = query.trim_start().strip_prefix(op).filter(|_| is_operation) {
            let name: String = after
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                return name.to_lowercase();
            }
        }
    }

    collapse_whitespace(query)
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identifier of the statement for a normalized query name and role.
///
/// The name is length-prefixed so no (name, role) pair hashes the same
/// bytes as another.
pub fn statement_id(name: &str, role: &str) -> u64 {
    let mut buf = Vec::with_capacity(8 + name.len() + role.len());
    buf.extend_from_slice(&(name.len() as u64).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(role.as_bytes());
    xxh64(&buf, 0)
}
