//! GraphGate Core - role-aware query resolution and result shaping.
//!
//! Resolves a caller's role, picks an approved (or freshly compiled)
//! statement, runs it transactionally against the backing store, and
//! reshapes the JSON result: cursors are encrypted, fields the role may not
//! see are removed, and per-field timing is attached on request.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod json;
pub mod response;
pub mod security;
pub mod statement;
pub mod storage;
pub mod trace;

pub use config::{EngineConfig, RoleConfig, RolesFile, TableConfig};
pub use cursor::{CursorCodec, CursorError};
pub use engine::Engine;
pub use error::{Error, Result};
pub use executor::Session;
pub use response::{render, render_error, Redactor};
pub use security::{AuthorizationProfiles, OperationKind, QueryType, RequestContext, Role, RoleResolver};
pub use statement::{
    AllowedQuery, CompileError, PreparedStatement, QueryCompiler, SelectionNode, SelectionTree,
    Statement, StatementRegistry, StatementSelector, StatementStore,
};
pub use storage::{ArgValue, Database, Row, StorageError, Transaction};
pub use trace::{Trace, Tracer};
