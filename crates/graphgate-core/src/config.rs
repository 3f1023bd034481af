//! Engine configuration and role definitions.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Default number of compiled statements kept in open mode.
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 1000;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hide server-side error detail from callers.
    pub production: bool,

    /// Only run pre-approved statements.
    pub locked: bool,

    /// Propagate the caller's user id into a transaction-local setting.
    pub set_user_id: bool,

    /// Role-policy query for mutations. ABAC is enabled iff set.
    pub role_query: Option<String>,

    /// Attach per-field timing to responses.
    pub enable_tracing: bool,

    /// Default per-request deadline.
    pub request_timeout: Option<Duration>,

    /// Record executed queries in the allow list (open mode).
    pub persist_allow_list: bool,

    /// Capacity of the open-mode statement cache. Zero disables caching.
    pub statement_cache_size: usize,

    /// Role definitions.
    pub roles: Vec<RoleConfig>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            production: false,
            locked: false,
            set_user_id: false,
            role_query: None,
            enable_tracing: false,
            request_timeout: None,
            persist_allow_list: false,
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            roles: Vec::new(),
        }
    }

    /// Production profile: locked and without error detail.
    pub fn production() -> Self {
        Self::new().with_production(true).with_locked(true)
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_set_user_id(mut self, set_user_id: bool) -> Self {
        self.set_user_id = set_user_id;
        self
    }

    pub fn with_role_query(mut self, query: impl Into<String>) -> Self {
        self.role_query = Some(query.into());
        self
    }

    pub fn with_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_persist_allow_list(mut self, persist: bool) -> Self {
        self.persist_allow_list = persist;
        self
    }

    pub fn with_statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    pub fn with_roles(mut self, roles: Vec<RoleConfig>) -> Self {
        self.roles = roles;
        self
    }

    /// Apply a roles file: its role definitions and role query.
    pub fn with_roles_file(mut self, file: RolesFile) -> Self {
        if file.roles_query.is_some() {
            self.role_query = file.roles_query;
        }
        self.roles = file.roles;
        self
    }

    /// Whether attribute-based access control is enabled.
    pub fn is_abac_enabled(&self) -> bool {
        self.role_query.is_some()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Role definitions as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesFile {
    pub roles_query: Option<String>,
    pub roles: Vec<RoleConfig>,
}

impl RolesFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid roles file: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

/// Permissions of one role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub name: String,
    pub tables: Vec<TableConfig>,
}

/// Per-table permissions of a role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub name: String,
    pub query: QueryConfig,
    pub insert: InsertConfig,
    pub update: UpdateConfig,
    pub delete: DeleteConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows returned.
    pub limit: Option<u32>,
    /// Row filters, combined with AND.
    pub filters: Vec<JsonValue>,
    /// Allowed columns. Empty means unrestricted.
    pub columns: Vec<String>,
    pub disable_functions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertConfig {
    pub filters: Vec<JsonValue>,
    pub columns: Vec<String>,
    /// Column defaults. `$name` references become placeholders.
    pub presets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub filters: Vec<JsonValue>,
    pub columns: Vec<String>,
    pub presets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteConfig {
    pub filters: Vec<JsonValue>,
    pub columns: Vec<String>,
}
