//! Per-role, per-table authorization profiles.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::filter_expr::RowFilter;
use super::role::Role;
use crate::config::{DeleteConfig, InsertConfig, QueryConfig, RoleConfig, UpdateConfig};
use crate::error::Result;
use crate::statement::template;

/// Kind of operation performed on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Insert,
    Update,
    Delete,
    Upsert,
}

/// Top-level request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Query,
    Mutation,
}

impl QueryType {
    /// Detect the request type from the leading operation keyword.
    pub fn detect(query: &str) -> Self {
        let word: String = query
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        if word.eq_ignore_ascii_case("mutation") {
            QueryType::Mutation
        } else {
            QueryType::Query
        }
    }
}

/// Query permissions on a table.
#[derive(Debug, Clone, Default)]
pub struct QueryProfile {
    /// Row limit a [`QueryCompiler`](crate::QueryCompiler) applies to
    /// statements for this role.
    pub limit: Option<u32>,
    pub filter: Option<RowFilter>,
    pub filter_not_null: bool,
    pub columns: Option<HashSet<String>>,
    /// Read by a [`QueryCompiler`](crate::QueryCompiler): function calls in
    /// the selection are rejected when set.
    pub disable_functions: bool,
}

/// Insert or update permissions on a table.
#[derive(Debug, Clone, Default)]
pub struct MutationProfile {
    pub filter: Option<RowFilter>,
    pub filter_not_null: bool,
    pub columns: Option<HashSet<String>>,
    /// Column default templates, keyed by lowercased column.
    pub presets: HashMap<String, String>,
    /// Preset columns, sorted.
    pub preset_columns: Vec<String>,
}

/// Delete permissions on a table.
#[derive(Debug, Clone, Default)]
pub struct DeleteProfile {
    pub filter: Option<RowFilter>,
    pub filter_not_null: bool,
    pub columns: Option<HashSet<String>>,
}

/// All permissions of one role on one table.
#[derive(Debug, Clone, Default)]
pub struct TableProfile {
    pub query: QueryProfile,
    pub insert: MutationProfile,
    pub update: MutationProfile,
    pub delete: DeleteProfile,
}

impl TableProfile {
    /// Allowed columns for an operation. `None` means unrestricted.
    pub fn allowed_columns(&self, kind: OperationKind) -> Option<&HashSet<String>> {
        match kind {
            OperationKind::Query => self.query.columns.as_ref(),
            OperationKind::Insert | OperationKind::Upsert => self.insert.columns.as_ref(),
            OperationKind::Update => self.update.columns.as_ref(),
            OperationKind::Delete => self.delete.columns.as_ref(),
        }
    }

    /// Row filter for an operation and whether it needs request variables.
    ///
    /// Exposed for [`QueryCompiler`](crate::QueryCompiler) implementations,
    /// which inline the filter into the statements they build.
    pub fn filter(&self, kind: OperationKind) -> (Option<&RowFilter>, bool) {
        match kind {
            OperationKind::Query => (self.query.filter.as_ref(), self.query.filter_not_null),
            OperationKind::Insert | OperationKind::Upsert => {
                (self.insert.filter.as_ref(), self.insert.filter_not_null)
            }
            OperationKind::Update => (self.update.filter.as_ref(), self.update.filter_not_null),
            OperationKind::Delete => (self.delete.filter.as_ref(), self.delete.filter_not_null),
        }
    }

    /// Column presets for mutations that write rows.
    ///
    /// Exposed for [`QueryCompiler`](crate::QueryCompiler) implementations;
    /// preset values are already in `{{var}}` template form.
    pub fn presets(&self, kind: OperationKind) -> Option<&MutationProfile> {
        match kind {
            OperationKind::Insert | OperationKind::Upsert => Some(&self.insert),
            OperationKind::Update => Some(&self.update),
            OperationKind::Query | OperationKind::Delete => None,
        }
    }

    fn from_config(
        query: &QueryConfig,
        insert: &InsertConfig,
        update: &UpdateConfig,
        delete: &DeleteConfig,
    ) -> Result<Self> {
        let query_filter = RowFilter::parse_all(&query.filters)?;
        let delete_filter = RowFilter::parse_all(&delete.filters)?;

        Ok(Self {
            query: QueryProfile {
                limit: query.limit,
                filter_not_null: not_null(&query_filter),
                filter: query_filter,
                columns: column_set(&query.columns),
                disable_functions: query.disable_functions,
            },
            insert: MutationProfile::from_parts(&insert.filters, &insert.columns, &insert.presets)?,
            update: MutationProfile::from_parts(&update.filters, &update.columns, &update.presets)?,
            delete: DeleteProfile {
                filter_not_null: not_null(&delete_filter),
                filter: delete_filter,
                columns: column_set(&delete.columns),
            },
        })
    }
}

impl MutationProfile {
    fn from_parts<'a>(
        filters: &[serde_json::Value],
        columns: &[String],
        presets: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self> {
        let filter = RowFilter::parse_all(filters)?;
        let presets: HashMap<String, String> = presets
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), template::from_variables(v)))
            .collect();
        let mut preset_columns: Vec<String> = presets.keys().cloned().collect();
        preset_columns.sort();

        Ok(Self {
            filter_not_null: not_null(&filter),
            filter,
            columns: column_set(columns),
            presets,
            preset_columns,
        })
    }
}

fn not_null(filter: &Option<RowFilter>) -> bool {
    filter.as_ref().is_some_and(RowFilter::requires_not_null)
}

fn column_set(columns: &[String]) -> Option<HashSet<String>> {
    if columns.is_empty() {
        None
    } else {
        Some(columns.iter().map(|c| c.to_lowercase()).collect())
    }
}

/// Immutable authorization profiles for every configured role.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationProfiles {
    roles: HashMap<Role, HashMap<String, TableProfile>>,
}

impl AuthorizationProfiles {
    /// Build profiles from role definitions.
    pub fn from_config(roles: &[RoleConfig]) -> Result<Self> {
        let mut profiles = HashMap::with_capacity(roles.len());

        for role in roles {
            let mut tables = HashMap::with_capacity(role.tables.len());
            for table in &role.tables {
                let profile =
                    TableProfile::from_config(&table.query, &table.insert, &table.update, &table.delete)?;
                tables.insert(table.name.to_lowercase(), profile);
            }
            profiles.insert(Role::new(&role.name), tables);
        }

        Ok(Self { roles: profiles })
    }

    /// Profile of a role on a table.
    pub fn table(&self, role: &str, table: &str) -> Option<&TableProfile> {
        let tables = self.roles.get(role)?;
        tables
            .get(table)
            .or_else(|| tables.get(table.to_lowercase().as_str()))
    }

    /// Allowed columns of a role on a table. `None` means unrestricted.
    pub fn allowed_columns(
        &self,
        role: &str,
        table: &str,
        kind: OperationKind,
    ) -> Option<&HashSet<String>> {
        self.table(role, table)?.allowed_columns(kind)
    }

    /// Configured role names.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.keys()
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
