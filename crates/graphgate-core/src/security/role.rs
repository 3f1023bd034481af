//! Role names and request role resolution.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::context::RequestContext;
use super::profile::QueryType;
use crate::error::{Error, Result};
use crate::executor::Session;
use crate::storage::ArgValue;

/// An authorization role name. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role(Arc<str>);

impl Role {
    pub const ANON: &'static str = "anon";
    pub const USER: &'static str = "user";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Role of callers without a user id.
    pub fn anon() -> Self {
        Self::new(Self::ANON)
    }

    /// Default role of authenticated callers.
    pub fn user() -> Self {
        Self::new(Self::USER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anon(&self) -> bool {
        &*self.0 == Self::ANON
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self.0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Role {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::new(s)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role(Arc::from(s))
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Role::from)
    }
}

/// Decides the role a request runs as.
///
/// With a role-policy query configured, mutations run the query inside the
/// request's transaction with `$1` bound to the user id and `$2` to the
/// default role. Everything else uses the pre-resolved role from the
/// authentication layer, falling back to the default role.
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    role_query: Option<String>,
}

impl RoleResolver {
    pub fn new(role_query: Option<String>) -> Self {
        Self { role_query }
    }

    /// Whether attribute-based access control is enabled.
    pub fn is_abac_enabled(&self) -> bool {
        self.role_query.is_some()
    }

    /// Whether resolving a request of this type needs the policy query.
    pub fn requires_query(&self, qtype: QueryType) -> bool {
        self.is_abac_enabled() && qtype == QueryType::Mutation
    }

    /// Resolve the role for a request.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        qtype: QueryType,
        session: &mut Session<'_>,
    ) -> Result<Role> {
        let query = match &self.role_query {
            Some(query) if qtype == QueryType::Mutation => query,
            _ => return Ok(ctx.effective_role()),
        };

        let Some(user_id) = &ctx.user_id else {
            return Ok(Role::anon());
        };

        let default_role = ctx.default_role();
        let args = [
            ArgValue::Text(user_id.clone()),
            ArgValue::Text(default_role.to_string()),
        ];

        let row = session.query_row(query, &args).await.map_err(|e| match e {
            Error::ExecutionFailed(e) => Error::PolicyResolutionFailed(e.to_string()),
            other => other,
        })?;

        let role = row
            .text(0)
            .map_err(|e| Error::PolicyResolutionFailed(e.to_string()))?
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                Error::PolicyResolutionFailed("role query returned no role".to_string())
            })?;

        debug!(user_id = %user_id, default_role = %default_role, role = %role, "resolved role");

        Ok(Role::from(role))
    }
}
