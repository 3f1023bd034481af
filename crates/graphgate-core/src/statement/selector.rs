//! Statement selection and argument binding.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::cache::{CacheKey, CacheStats, StatementCache};
use super::compiler::{CompileError, QueryCompiler, Statement};
use super::prepared::{query_name, select_branch, ArgDescriptor, ArgKind, PreparedStatement};
use super::registry::StatementRegistry;
use super::selection::SelectionTree;
use super::template;
use crate::cursor::CursorCodec;
use crate::error::{Error, Result};
use crate::json;
use crate::security::{OperationKind, RequestContext, Role};
use crate::storage::ArgValue;

enum Mode {
    Locked(Arc<StatementRegistry>),
    Open {
        compiler: Arc<dyn QueryCompiler>,
        cache: StatementCache,
    },
}

/// Chooses the statement to run for a request.
///
/// In locked mode only statements in the registry can run and a miss is an
/// authorization failure. In open mode the query is compiled on demand,
/// with compiled candidates cached.
pub struct StatementSelector {
    mode: Mode,
    cursors: CursorCodec,
}

#[derive(Debug, Clone)]
enum Source {
    Prepared(Arc<PreparedStatement>),
    Compiled(Arc<Vec<Statement>>),
}

/// A statement ready to execute.
#[derive(Debug, Clone)]
pub struct SelectedStatement {
    /// Statement text. Prepared statements use positional parameters;
    /// compiled ones have their values inlined.
    pub text: String,
    /// Positional arguments.
    pub args: Vec<ArgValue>,
    /// Whether the result carries a leading role column.
    pub role_column: bool,
    source: Source,
}

/// The statement variant chosen for a database-returned role.
#[derive(Debug, Clone, Copy)]
pub struct BranchRef<'a> {
    pub role: &'a Role,
    pub kind: OperationKind,
    pub selection: &'a SelectionTree,
}

impl SelectedStatement {
    /// The branch matching `role`. Without a role column the only branch
    /// is returned regardless of `role`.
    pub fn branch(&self, role: Option<&str>) -> Option<BranchRef<'_>> {
        match &self.source {
            Source::Prepared(ps) => {
                select_branch(&ps.branches, self.role_column, role).map(|b| BranchRef {
                    role: &b.role,
                    kind: b.kind,
                    selection: &b.selection,
                })
            }
            Source::Compiled(statements) => {
                let statement = if self.role_column {
                    let role = role?;
                    statements.iter().find(|s| s.role.as_str() == role)?
                } else {
                    statements.first()?
                };
                Some(BranchRef {
                    role: &statement.role,
                    kind: statement.kind,
                    selection: &statement.selection,
                })
            }
        }
    }
}

impl StatementSelector {
    pub fn locked(registry: Arc<StatementRegistry>, cursors: CursorCodec) -> Self {
        Self {
            mode: Mode::Locked(registry),
            cursors,
        }
    }

    pub fn open(compiler: Arc<dyn QueryCompiler>, cache_size: usize, cursors: CursorCodec) -> Self {
        Self {
            mode: Mode::Open {
                compiler,
                cache: StatementCache::new(cache_size),
            },
            cursors,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.mode, Mode::Locked(_))
    }

    /// Statistics of the open-mode cache.
    pub fn cache_stats(&self) -> Option<&CacheStats> {
        match &self.mode {
            Mode::Open { cache, .. } => Some(cache.stats()),
            Mode::Locked(_) => None,
        }
    }

    pub fn cursors(&self) -> &CursorCodec {
        &self.cursors
    }

    /// Select and bind the statement for `query` running as `role`.
    ///
    /// Variables of `{}` are treated as absent.
    pub fn select(
        &self,
        query: &str,
        variables: Option<&[u8]>,
        role: &Role,
        ctx: &RequestContext,
    ) -> Result<SelectedStatement> {
        let variables = variables.filter(|v| !is_empty_object(v));

        match &self.mode {
            Mode::Locked(registry) => {
                let ps = registry.get(query, role.as_str()).ok_or_else(|| {
                    Error::Unauthorized(format!(
                        "query '{}' is not allowed for role '{}'",
                        query_name(query),
                        role
                    ))
                })?;

                let args = ps
                    .args
                    .iter()
                    .map(|arg| self.bind(arg, variables, ctx))
                    .collect::<Result<Vec<_>>>()?;

                Ok(SelectedStatement {
                    text: ps.text.clone(),
                    args,
                    role_column: ps.role_column,
                    source: Source::Prepared(ps),
                })
            }
            Mode::Open { compiler, cache } => {
                let key = CacheKey::new(query, role.as_str(), variables);
                let statements = match cache.get(&key) {
                    Some(statements) => statements,
                    None => {
                        let compiled = compiler.compile(query, variables, role)?;
                        if compiled.is_empty() {
                            return Err(CompileError::new("compiler returned no statements").into());
                        }
                        let compiled = Arc::new(compiled);
                        cache.insert(key, Arc::clone(&compiled));
                        compiled
                    }
                };

                let text = template::render(&statements[0].text, |arg| {
                    self.bind(arg, variables, ctx).map(|value| match value {
                        ArgValue::Null => None,
                        ArgValue::Text(s) => Some(s),
                        ArgValue::Json(v) => Some(v.to_string()),
                    })
                })?;

                Ok(SelectedStatement {
                    text,
                    args: Vec::new(),
                    role_column: statements.len() > 1,
                    source: Source::Compiled(statements),
                })
            }
        }
    }

    fn bind(
        &self,
        arg: &ArgDescriptor,
        variables: Option<&[u8]>,
        ctx: &RequestContext,
    ) -> Result<ArgValue> {
        match arg.kind {
            ArgKind::UserId => ctx
                .user_id
                .clone()
                .map(ArgValue::Text)
                .ok_or_else(|| missing(&arg.name)),
            ArgKind::UserIdProvider => ctx
                .identity_provider
                .clone()
                .map(ArgValue::Text)
                .ok_or_else(|| missing(&arg.name)),
            ArgKind::Cursor => match variable(variables, &arg.name)? {
                Some(ArgValue::Text(token)) => Ok(ArgValue::Text(self.cursors.decrypt(&token)?)),
                _ => Ok(ArgValue::Null),
            },
            ArgKind::Value => variable(variables, &arg.name)?.ok_or_else(|| missing(&arg.name)),
        }
    }
}

fn missing(name: &str) -> Error {
    Error::InvalidRequest(format!("query requires variable ${}", name))
}

/// Read a top-level variable as a statement argument.
fn variable(variables: Option<&[u8]>, name: &str) -> Result<Option<ArgValue>> {
    let Some(doc) = variables else {
        return Ok(None);
    };
    let Some(field) = json::lookup(doc, name) else {
        return Ok(None);
    };

    let raw = field.value.slice(doc);
    let value = match raw.first() {
        Some(b'"') => ArgValue::Text(
            serde_json::from_slice::<String>(raw)
                .map_err(|e| Error::InvalidRequest(format!("variable ${}: {}", name, e)))?,
        ),
        Some(b'{') | Some(b'[') => ArgValue::Json(
            serde_json::from_slice::<JsonValue>(raw)
                .map_err(|e| Error::InvalidRequest(format!("variable ${}: {}", name, e)))?,
        ),
        Some(b'n') => ArgValue::Null,
        _ => ArgValue::Text(String::from_utf8_lossy(raw).into_owned()),
    };
    Ok(Some(value))
}

fn is_empty_object(doc: &[u8]) -> bool {
    let mut significant = doc.iter().filter(|b| !b.is_ascii_whitespace());
    matches!(
        (significant.next(), significant.next(), significant.next()),
        (Some(b'{'), Some(b'}'), None)
    ) || doc.iter().all(|b| b.is_ascii_whitespace())
}
