//! Server configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use graphgate_core::{CursorCodec, EngineConfig, RolesFile};
use tracing::warn;

use crate::auth::{AnonymousAuthenticator, Authenticator, JwtAuthenticator, JwtProvider};
use crate::error::Error;

/// Default PostgreSQL connection string.
pub const DEFAULT_DATABASE_URL: &str = "postgres://postgres@localhost:5432/postgres";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Environment variable holding the cursor encryption secret.
pub const CURSOR_SECRET_ENV: &str = "GRAPHGATE_CURSOR_SECRET";

/// GraphGate server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Path to the statement store directory.
    pub data_path: PathBuf,

    /// Role definitions and role-policy query (JSON).
    pub roles_file: Option<PathBuf>,

    pub request_timeout: Duration,

    /// Maximum pooled database connections.
    pub max_connections: u32,

    /// Hide server-side error detail from callers.
    pub production: bool,

    /// Propagate the caller's user id into the transaction.
    pub set_user_id: bool,

    /// Attach per-field timing to responses.
    pub enable_tracing: bool,

    pub jwt_provider: JwtProvider,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,

    /// Secret the cursor key is derived from. A random key is used if unset.
    pub cursor_secret: Option<String>,
}

impl ServerConfig {
    /// Create a new server configuration with the given data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            data_path: data_path.into(),
            roles_file: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            production: false,
            set_user_id: false,
            enable_tracing: false,
            jwt_provider: JwtProvider::Generic,
            jwt_issuer: None,
            jwt_audience: None,
            cursor_secret: None,
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_roles_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.roles_file = Some(path.into());
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_set_user_id(mut self, set_user_id: bool) -> Self {
        self.set_user_id = set_user_id;
        self
    }

    pub fn with_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    pub fn with_jwt_provider(mut self, provider: JwtProvider) -> Self {
        self.jwt_provider = provider;
        self
    }

    pub fn with_jwt_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.jwt_issuer = Some(issuer.into());
        self
    }

    pub fn with_jwt_audience(mut self, audience: impl Into<String>) -> Self {
        self.jwt_audience = Some(audience.into());
        self
    }

    pub fn with_cursor_secret(mut self, secret: impl Into<String>) -> Self {
        self.cursor_secret = Some(secret.into());
        self
    }

    /// Engine configuration for locked-mode serving. Loads the roles file if
    /// one is configured.
    pub fn engine_config(&self) -> Result<EngineConfig, Error> {
        let mut config = EngineConfig::new()
            .with_locked(true)
            .with_production(self.production)
            .with_set_user_id(self.set_user_id)
            .with_tracing(self.enable_tracing)
            .with_request_timeout(self.request_timeout);

        if let Some(path) = &self.roles_file {
            config = config.with_roles_file(RolesFile::load(path)?);
        }

        Ok(config)
    }

    /// Cursor codec keyed by the configured secret, or by a random key that
    /// only lives as long as the process.
    pub fn cursor_codec(&self) -> CursorCodec {
        match self.cursor_secret.as_deref() {
            Some(secret) if !secret.is_empty() => CursorCodec::from_secret(secret),
            _ => {
                warn!(
                    "no cursor secret configured (set {}), cursors will not survive a restart",
                    CURSOR_SECRET_ENV
                );
                CursorCodec::random()
            }
        }
    }

    /// Authenticator from the JWT environment variables. Without a key every
    /// caller is anonymous.
    pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>, Error> {
        let Some(mut jwt) = JwtAuthenticator::from_env().map_err(Error::Auth)? else {
            warn!("no JWT key configured (set GRAPHGATE_JWT_SECRET), all requests are anonymous");
            return Ok(Arc::new(AnonymousAuthenticator));
        };

        jwt = jwt.with_provider(self.jwt_provider);
        if let Some(issuer) = &self.jwt_issuer {
            jwt = jwt.with_issuer(issuer.clone());
        }
        if let Some(audience) = &self.jwt_audience {
            jwt = jwt.with_audience(audience.clone());
        }

        Ok(Arc::new(jwt))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

fn parse_provider(name: &str) -> Result<JwtProvider, String> {
    JwtProvider::from_name(name).ok_or_else(|| format!("unknown JWT provider '{}'", name))
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "graphgate-server")]
#[command(version, about = "GraphGate authorizing GraphQL gateway", long_about = None)]
pub struct Args {
    /// Path to the statement store directory.
    #[arg(short, long, default_value = "./data", global = true)]
    pub data_path: PathBuf,

    /// PostgreSQL connection string.
    #[arg(long, default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    /// Role definitions (JSON).
    #[arg(long, global = true)]
    pub roles_file: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, global = true)]
    pub timeout: u64,

    /// Maximum pooled database connections.
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, global = true)]
    pub max_connections: u32,

    /// Hide server-side error detail from callers.
    #[arg(long, global = true)]
    pub production: bool,

    /// Set `user.id` in every transaction.
    #[arg(long, global = true)]
    pub set_user_id: bool,

    /// Attach tracing extensions to responses.
    #[arg(long, global = true)]
    pub enable_tracing: bool,

    /// How the JWT subject is interpreted (generic, auth0).
    #[arg(long, default_value = "generic", value_parser = parse_provider, global = true)]
    pub jwt_provider: JwtProvider,

    /// Required JWT issuer.
    #[arg(long, global = true)]
    pub jwt_issuer: Option<String>,

    /// Required JWT audience.
    #[arg(long, global = true)]
    pub jwt_audience: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Server subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve approved statements over stdio (default).
    Serve,
    /// Load prepared statements from a JSON file into the store.
    Import {
        /// JSON array of prepared statements.
        file: PathBuf,
    },
    /// Print the stored statements.
    List,
}

impl Args {
    /// The subcommand to run.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            database_url: self.database_url,
            data_path: self.data_path,
            roles_file: self.roles_file,
            request_timeout: Duration::from_secs(self.timeout),
            max_connections: self.max_connections.max(1),
            production: self.production,
            set_user_id: self.set_user_id,
            enable_tracing: self.enable_tracing,
            jwt_provider: self.jwt_provider,
            jwt_issuer: self.jwt_issuer,
            jwt_audience: self.jwt_audience,
            cursor_secret: std::env::var(CURSOR_SECRET_ENV).ok(),
        }
    }
}
