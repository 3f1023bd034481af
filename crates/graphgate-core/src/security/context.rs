//! Request-scoped identity that flows through the pipeline.

use std::time::Duration;

use tokio::time::Instant;

use super::role::Role;

/// Identity and limits for one request.
///
/// Built by the authentication layer and passed by reference through role
/// resolution, statement selection and execution. Nothing in the pipeline
/// reads identity from anywhere else.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Authenticated user id, if any.
    pub user_id: Option<String>,
    /// Identity provider tag that issued the user id.
    pub identity_provider: Option<String>,
    /// Role already decided by the authentication layer.
    pub preresolved_role: Option<Role>,
    /// Point in time after which blocking calls are abandoned.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Create a context for an anonymous caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create a context for an authenticated user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_identity_provider(mut self, provider: impl Into<String>) -> Self {
        self.identity_provider = Some(provider.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.preresolved_role = Some(role.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether the caller has a user id.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The authentication-layer default role: `user` for callers with a
    /// user id, `anon` otherwise.
    pub fn default_role(&self) -> Role {
        if self.is_authenticated() {
            Role::user()
        } else {
            Role::anon()
        }
    }

    /// The role to use when no policy query runs: the pre-resolved role if
    /// present, else the default.
    pub fn effective_role(&self) -> Role {
        self.preresolved_role
            .clone()
            .unwrap_or_else(|| self.default_role())
    }
}
