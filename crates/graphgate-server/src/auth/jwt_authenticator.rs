//! JWT (JSON Web Token) based authentication.
//!
//! # Configuration
//!
//! Set `GRAPHGATE_JWT_SECRET` with the HMAC secret key, or use
//! `GRAPHGATE_JWT_RSA_PUBLIC_KEY` / `GRAPHGATE_JWT_EC_PUBLIC_KEY` for public
//! key verification.
//!
//! # JWT Claims
//!
//! - `sub`: Subject (user identifier)
//! - `exp`: Expiration timestamp (Unix timestamp)
//!
//! Optional claims:
//! - `iss`: Issuer
//! - `aud`: Audience
//! - `role`: Role to use instead of the default `user` role
//!
//! With the `auth0` provider a subject of the form `provider|id` is split
//! into identity provider and user id.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Authenticator, Identity};

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user identifier).
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// How the subject claim is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JwtProvider {
    /// The subject is the user id.
    #[default]
    Generic,
    /// The subject is `provider|user id`.
    Auth0,
}

impl JwtProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "" | "generic" | "jwt" => Some(JwtProvider::Generic),
            "auth0" => Some(JwtProvider::Auth0),
            _ => None,
        }
    }

    fn identity(self, claims: JwtClaims) -> Identity {
        let (identity_provider, user_id) = match self {
            JwtProvider::Auth0 => {
                let split = claims
                    .sub
                    .split_once('|')
                    .filter(|(_, id)| !id.contains('|'))
                    .map(|(provider, id)| (provider.to_string(), id.to_string()));
                match split {
                    Some((provider, id)) => (Some(provider), id),
                    None => (None, claims.sub),
                }
            }
            JwtProvider::Generic => (None, claims.sub),
        };

        Identity {
            user_id: Some(user_id),
            identity_provider,
            role: claims.role.filter(|r| !r.is_empty()),
        }
    }
}

/// JWT verification settings.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: Algorithm,
    pub provider: JwtProvider,
    pub required_issuer: Option<String>,
    pub required_audience: Option<String>,
    /// Leeway in seconds for the expiration check.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            provider: JwtProvider::Generic,
            required_issuer: None,
            required_audience: None,
            leeway_secs: 60,
        }
    }
}

/// Verifies bearer tokens and maps their claims to an [`Identity`].
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtAuthenticator {
    /// Create an authenticator with an HMAC secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            config: JwtConfig::default(),
        }
    }

    pub fn with_secret_str(secret: &str) -> Self {
        Self::with_secret(secret.as_bytes())
    }

    /// Create an authenticator with an RSA public key (PEM format).
    pub fn with_rsa_pem(public_key_pem: &[u8]) -> Result<Self, String> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| format!("invalid RSA public key: {}", e))?;

        Ok(Self {
            decoding_key: key,
            config: JwtConfig {
                algorithm: Algorithm::RS256,
                ..Default::default()
            },
        })
    }

    /// Create an authenticator with an EC public key (PEM format).
    pub fn with_ec_pem(public_key_pem: &[u8]) -> Result<Self, String> {
        let key = DecodingKey::from_ec_pem(public_key_pem)
            .map_err(|e| format!("invalid EC public key: {}", e))?;

        Ok(Self {
            decoding_key: key,
            config: JwtConfig {
                algorithm: Algorithm::ES256,
                ..Default::default()
            },
        })
    }

    /// Load from environment variables.
    ///
    /// Checks in order:
    /// 1. `GRAPHGATE_JWT_SECRET` - HMAC secret
    /// 2. `GRAPHGATE_JWT_RSA_PUBLIC_KEY` - RSA public key (PEM)
    /// 3. `GRAPHGATE_JWT_EC_PUBLIC_KEY` - EC public key (PEM)
    ///
    /// Returns `Ok(None)` when none is set.
    pub fn from_env() -> Result<Option<Self>, String> {
        if let Ok(secret) = std::env::var("GRAPHGATE_JWT_SECRET") {
            return Ok(Some(Self::with_secret_str(&secret)));
        }

        if let Ok(rsa_key) = std::env::var("GRAPHGATE_JWT_RSA_PUBLIC_KEY") {
            return Self::with_rsa_pem(rsa_key.as_bytes()).map(Some);
        }

        if let Ok(ec_key) = std::env::var("GRAPHGATE_JWT_EC_PUBLIC_KEY") {
            return Self::with_ec_pem(ec_key.as_bytes()).map(Some);
        }

        Ok(None)
    }

    pub fn with_provider(mut self, provider: JwtProvider) -> Self {
        self.config.provider = provider;
        self
    }

    /// Set the required issuer for validation.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.required_issuer = Some(issuer.into());
        self
    }

    /// Set the required audience for validation.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.config.required_audience = Some(audience.into());
        self
    }

    /// Set the leeway for the expiration check.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Verify a token and extract its claims.
    pub fn verify_token(&self, token: &str) -> Result<JwtClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.leeway = self.config.leeway_secs;

        if let Some(ref iss) = self.config.required_issuer {
            validation.set_issuer(&[iss]);
        }

        if let Some(ref aud) = self.config.required_audience {
            validation.set_audience(&[aud]);
        }

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: Option<&str>) -> Identity {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Identity::anonymous();
        };

        let token = token
            .strip_prefix("Bearer ")
            .or_else(|| token.strip_prefix("bearer "))
            .unwrap_or(token);

        match self.verify_token(token) {
            Ok(claims) if !claims.sub.is_empty() => self.config.provider.identity(claims),
            Ok(_) => {
                debug!("token has an empty subject, continuing anonymously");
                Identity::anonymous()
            }
            Err(e) => {
                debug!(error = %e, "token rejected, continuing anonymously");
                Identity::anonymous()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key";

    fn create_test_token(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn test_claims(sub: &str) -> JwtClaims {
        JwtClaims {
            sub: sub.to_string(),
            exp: (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + 3600),
            iss: None,
            aud: None,
            role: None,
        }
    }

    #[test]
    fn test_valid_token() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        let token = create_test_token(SECRET, &test_claims("user-123"));

        let identity = auth.authenticate(Some(&token));
        assert_eq!(identity.user_id.as_deref(), Some("user-123"));
        assert!(identity.identity_provider.is_none());
        assert!(identity.role.is_none());
    }

    #[test]
    fn test_bearer_prefix() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        let token = create_test_token(SECRET, &test_claims("user-123"));

        for header in [format!("Bearer {}", token), format!("bearer {}", token)] {
            let identity = auth.authenticate(Some(&header));
            assert_eq!(identity.user_id.as_deref(), Some("user-123"));
        }
    }

    #[test]
    fn test_invalid_token_is_anonymous() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        let token = create_test_token("wrong-secret", &test_claims("user-123"));

        assert!(auth.authenticate(Some(&token)).is_anonymous());
        assert!(auth.authenticate(Some("not-a-jwt")).is_anonymous());
    }

    #[test]
    fn test_missing_token_is_anonymous() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        assert!(auth.authenticate(None).is_anonymous());
        assert!(auth.authenticate(Some("  ")).is_anonymous());
    }

    #[test]
    fn test_expired_token() {
        let auth = JwtAuthenticator::with_secret_str(SECRET).with_leeway(0);
        let mut claims = test_claims("user-123");
        claims.exp = 1000;
        let token = create_test_token(SECRET, &claims);

        assert!(auth.verify_token(&token).is_err());
        assert!(auth.authenticate(Some(&token)).is_anonymous());
    }

    #[test]
    fn test_issuer_validation() {
        let auth = JwtAuthenticator::with_secret_str(SECRET).with_issuer("graphgate-auth");

        let mut claims = test_claims("user-123");
        claims.iss = Some("graphgate-auth".to_string());
        let token = create_test_token(SECRET, &claims);
        assert!(auth.verify_token(&token).is_ok());

        claims.iss = Some("other".to_string());
        let token = create_test_token(SECRET, &claims);
        assert!(auth.verify_token(&token).is_err());
    }

    #[test]
    fn test_audience_validation() {
        let auth = JwtAuthenticator::with_secret_str(SECRET).with_audience("graphgate");

        let mut claims = test_claims("user-123");
        claims.aud = Some("graphgate".to_string());
        let token = create_test_token(SECRET, &claims);
        assert!(!auth.authenticate(Some(&token)).is_anonymous());

        claims.aud = Some("elsewhere".to_string());
        let token = create_test_token(SECRET, &claims);
        assert!(auth.authenticate(Some(&token)).is_anonymous());
    }

    #[test]
    fn test_auth0_subject_split() {
        let auth = JwtAuthenticator::with_secret_str(SECRET).with_provider(JwtProvider::Auth0);

        let token = create_test_token(SECRET, &test_claims("google-oauth2|1234"));
        let identity = auth.authenticate(Some(&token));
        assert_eq!(identity.identity_provider.as_deref(), Some("google-oauth2"));
        assert_eq!(identity.user_id.as_deref(), Some("1234"));

        let token = create_test_token(SECRET, &test_claims("a|b|c"));
        let identity = auth.authenticate(Some(&token));
        assert!(identity.identity_provider.is_none());
        assert_eq!(identity.user_id.as_deref(), Some("a|b|c"));
    }

    #[test]
    fn test_generic_subject_not_split() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        let token = create_test_token(SECRET, &test_claims("google-oauth2|1234"));
        let identity = auth.authenticate(Some(&token));
        assert_eq!(identity.user_id.as_deref(), Some("google-oauth2|1234"));
    }

    #[test]
    fn test_role_claim() {
        let auth = JwtAuthenticator::with_secret_str(SECRET);
        let mut claims = test_claims("user-123");
        claims.role = Some("admin".to_string());
        let token = create_test_token(SECRET, &claims);

        let identity = auth.authenticate(Some(&token));
        assert_eq!(identity.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_provider_from_name() {
        assert_eq!(JwtProvider::from_name("Auth0"), Some(JwtProvider::Auth0));
        assert_eq!(JwtProvider::from_name("jwt"), Some(JwtProvider::Generic));
        assert_eq!(JwtProvider::from_name("firebase"), None);
    }
}
