//! Statements: compilation seam, preparation, storage and selection.

mod cache;
mod compiler;
mod prepared;
mod registry;
mod selection;
mod selector;
mod store;
pub mod template;

pub use cache::{CacheKey, CacheStats, StatementCache};
pub use compiler::{CompileError, QueryCompiler, Statement};
pub use prepared::{
    collapse_whitespace, query_name, statement_id, ArgDescriptor, ArgKind, Branch,
    PreparedStatement,
};
pub use registry::StatementRegistry;
pub use selection::{SelectionNode, SelectionTree, ROOT_PARENT};
pub use selector::{BranchRef, SelectedStatement, StatementSelector};
pub use store::{AllowedQuery, StatementStore};
