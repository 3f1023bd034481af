//! Query compiler seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::selection::SelectionTree;
use crate::security::{OperationKind, Role};

/// The compiler rejected a query.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One statement variant produced by the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Role this variant is valid for.
    pub role: Role,
    /// Operation performed on the root tables.
    pub kind: OperationKind,
    /// SQL text, possibly with `{{name}}` placeholders.
    pub text: String,
    /// Selection tree of the result.
    pub selection: SelectionTree,
    /// Whether the SQL returns a leading role column.
    pub role_branching: bool,
}

/// Translates a query into SQL statements.
///
/// More than one statement is returned only when the compiler branched per
/// role; all branches then share the SQL text of the first, which returns a
/// leading role column.
pub trait QueryCompiler: Send + Sync {
    fn compile(
        &self,
        query: &str,
        variables: Option<&[u8]>,
        role: &Role,
    ) -> Result<Vec<Statement>, CompileError>;
}
