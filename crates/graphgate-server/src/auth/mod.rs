//! Caller authentication.
//!
//! Authenticators turn an optional bearer token into an [`Identity`].
//! Authentication never fails a request: a missing or invalid token yields
//! an anonymous identity, and the engine decides what anonymous callers may
//! run.
//!
//! # Environment Variables
//!
//! ```text
//! GRAPHGATE_JWT_SECRET="your-secret-key"
//! GRAPHGATE_JWT_RSA_PUBLIC_KEY="-----BEGIN PUBLIC KEY-----..."
//! GRAPHGATE_JWT_EC_PUBLIC_KEY="-----BEGIN PUBLIC KEY-----..."
//! ```

mod jwt_authenticator;

pub use jwt_authenticator::{JwtAuthenticator, JwtClaims, JwtProvider};

use graphgate_core::RequestContext;

/// Who is calling, as established by an authenticator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub identity_provider: Option<String>,
    /// Role asserted by the credentials, used instead of the default role.
    pub role: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    /// Request context for this identity.
    pub fn into_context(self) -> RequestContext {
        let mut ctx = RequestContext::anonymous();
        ctx.user_id = self.user_id;
        ctx.identity_provider = self.identity_provider;
        ctx.preresolved_role = self.role.map(Into::into);
        ctx
    }
}

/// Establishes the identity behind a request.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: Option<&str>) -> Identity;
}

/// Treats every caller as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

impl Authenticator for AnonymousAuthenticator {
    fn authenticate(&self, _token: Option<&str>) -> Identity {
        Identity::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_into_context() {
        let ctx = Identity {
            user_id: Some("42".into()),
            identity_provider: Some("auth0".into()),
            role: Some("admin".into()),
        }
        .into_context();

        assert_eq!(ctx.user_id.as_deref(), Some("42"));
        assert_eq!(ctx.identity_provider.as_deref(), Some("auth0"));
        assert_eq!(ctx.effective_role().as_str(), "admin");
        assert_eq!(ctx.default_role().as_str(), "user");
    }

    #[test]
    fn test_anonymous_authenticator() {
        let identity = AnonymousAuthenticator.authenticate(Some("Bearer abc"));
        assert!(identity.is_anonymous());
        assert_eq!(identity.into_context().default_role().as_str(), "anon");
    }
}
