//! Request pipeline.
//!
//! role resolution → statement selection → execution → commit →
//! cursor encryption → redaction → tracing → rendering.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor::Session;
use crate::response::{self, Redactor};
use crate::security::{AuthorizationProfiles, QueryType, RequestContext, Role, RoleResolver};
use crate::statement::{AllowedQuery, BranchRef, SelectedStatement, StatementSelector, StatementStore};
use crate::storage::Database;
use crate::trace::Tracer;

/// Executes queries on behalf of callers.
///
/// Shared across concurrent requests; all state is read-only apart from the
/// open-mode statement cache and the allow list.
pub struct Engine {
    config: EngineConfig,
    db: Arc<dyn Database>,
    selector: StatementSelector,
    roles: RoleResolver,
    profiles: AuthorizationProfiles,
    allow_list: Option<StatementStore>,
}

struct Executed {
    data: Vec<u8>,
    selected: SelectedStatement,
    db_role: Option<String>,
}

impl Engine {
    pub fn new(config: EngineConfig, db: Arc<dyn Database>, selector: StatementSelector) -> Result<Self> {
        if config.locked != selector.is_locked() {
            return Err(Error::Config(format!(
                "engine is configured {} but the statement selector is {}",
                mode_name(config.locked),
                mode_name(selector.is_locked())
            )));
        }

        let profiles = AuthorizationProfiles::from_config(&config.roles)?;
        let roles = RoleResolver::new(config.role_query.clone());

        Ok(Self {
            config,
            db,
            selector,
            roles,
            profiles,
            allow_list: None,
        })
    }

    /// Record successfully executed queries in `store` when
    /// `persist_allow_list` is enabled.
    pub fn with_allow_list(mut self, store: StatementStore) -> Self {
        self.allow_list = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn selector(&self) -> &StatementSelector {
        &self.selector
    }

    pub fn profiles(&self) -> &AuthorizationProfiles {
        &self.profiles
    }

    /// Run `query` for the caller described by `ctx` and render the
    /// response body.
    pub async fn execute(
        &self,
        query: &str,
        variables: Option<&[u8]>,
        ctx: &RequestContext,
    ) -> Result<Bytes> {
        match self.resolve(query, variables, ctx).await {
            Ok(body) => Ok(body),
            Err(e) => {
                error!(
                    error = %e,
                    code = e.code(),
                    default_role = %ctx.default_role(),
                    query = %query,
                    "query failed"
                );
                Err(e)
            }
        }
    }

    /// Render an error for the caller, hiding server-side detail in
    /// production.
    pub fn render_error(&self, err: &Error) -> Bytes {
        response::render_error(err, self.config.production)
    }

    async fn resolve(
        &self,
        query: &str,
        variables: Option<&[u8]>,
        ctx: &RequestContext,
    ) -> Result<Bytes> {
        let tracer = self.config.enable_tracing.then(Tracer::start);
        let deadline = ctx
            .deadline
            .or_else(|| self.config.request_timeout.map(|t| Instant::now() + t));

        let qtype = QueryType::detect(query);
        let transactional = self.roles.requires_query(qtype) || self.config.set_user_id;

        let mut session = Session::open(self.db.as_ref(), transactional, deadline).await?;
        let outcome = self.run(&mut session, query, variables, ctx, qtype).await;
        let executed = session.finish(outcome).await?;

        let branch = branch_for(&executed.selected, executed.db_role.as_deref())?;
        let data = self
            .selector
            .cursors()
            .encrypt_cursors(&executed.data, branch.selection)?;

        self.record_allowed(query, variables);

        let data = Redactor::new(&self.profiles, branch.role.as_str(), branch.kind, branch.selection)
            .redact(&data)?;

        let trace = tracer.and_then(|mut tracer| {
            tracer.record_roots(branch.selection);
            tracer.finish()
        });

        response::render(&data, trace.as_ref())
    }

    async fn run(
        &self,
        session: &mut Session<'_>,
        query: &str,
        variables: Option<&[u8]>,
        ctx: &RequestContext,
        qtype: QueryType,
    ) -> Result<Executed> {
        if self.config.set_user_id {
            if let Some(user_id) = &ctx.user_id {
                session.set_user_id(user_id).await?;
            }
        }

        let role: Role = self.roles.resolve(ctx, qtype, session).await?;
        let selected = self.selector.select(query, variables, &role, ctx)?;

        let row = session.query_row(&selected.text, &selected.args).await?;
        let (db_role, data) = if selected.role_column {
            (row.text(0)?, row.json_bytes(1)?)
        } else {
            (None, row.json_bytes(0)?)
        };

        match &db_role {
            Some(db_role) => debug!(
                default_role = %ctx.default_role(),
                role = %db_role,
                query = %query,
                "executed"
            ),
            None => debug!(default_role = %ctx.default_role(), role = %role, query = %query, "executed"),
        }

        // An unknown database role must fail before commit.
        branch_for(&selected, db_role.as_deref())?;

        Ok(Executed {
            data,
            selected,
            db_role,
        })
    }

    fn record_allowed(&self, query: &str, variables: Option<&[u8]>) {
        if self.config.locked || !self.config.persist_allow_list {
            return;
        }
        let Some(store) = &self.allow_list else {
            return;
        };

        let recorded = AllowedQuery::new(query, variables).and_then(|allowed| store.allow(&allowed));
        if let Err(e) = recorded {
            warn!(error = %e, query = %query, "failed to record allowed query");
        }
    }
}

fn branch_for<'a>(selected: &'a SelectedStatement, db_role: Option<&str>) -> Result<BranchRef<'a>> {
    selected.branch(db_role).ok_or_else(|| {
        Error::Unauthorized(format!(
            "invalid role '{}' returned",
            db_role.unwrap_or_default()
        ))
    })
}

fn mode_name(locked: bool) -> &'static str {
    if locked {
        "locked"
    } else {
        "open"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorCodec;
    use crate::statement::StatementRegistry;
    use crate::storage::mock::MockDatabase;
    use crate::storage::ArgValue;

    fn locked_engine(config: EngineConfig, db: MockDatabase) -> Result<Engine> {
        let selector = StatementSelector::locked(
            Arc::new(StatementRegistry::default()),
            CursorCodec::random(),
        );
        Engine::new(config, Arc::new(db), selector)
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        let db = MockDatabase::returning(vec![ArgValue::Null]);
        let err = locked_engine(EngineConfig::new(), db.clone()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(locked_engine(EngineConfig::new().with_locked(true), db).is_ok());
    }

    #[tokio::test]
    async fn test_locked_miss_runs_nothing() {
        let db = MockDatabase::returning(vec![ArgValue::Null]);
        let engine = locked_engine(EngineConfig::production().with_locked(true), db.clone()).unwrap();

        let err = engine
            .execute("query getProducts { products { id } }", None, &RequestContext::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(db.calls().queries.is_empty());
        let body: serde_json::Value = serde_json::from_slice(&engine.render_error(&err)).unwrap();
        assert_eq!(body["errors"][0]["code"], "UNAUTHORIZED");
    }
}
