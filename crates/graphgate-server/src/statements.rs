//! Statement store maintenance for the `import` and `list` subcommands.

use std::path::Path;

use graphgate_core::statement::statement_id;
use graphgate_core::{PreparedStatement, StatementStore};
use tracing::info;

use crate::error::Error;

/// Open the statement store under `data_path`.
pub fn open_store(data_path: &Path) -> Result<(sled::Db, StatementStore), Error> {
    let db = sled::open(data_path)?;
    let store = StatementStore::open(&db)?;
    Ok((db, store))
}

/// Load a JSON array of prepared statements into the store.
///
/// Every statement is checked before any is written, so a bad file leaves
/// the store untouched. Returns the number of statements imported.
pub fn import(store: &StatementStore, json: &str) -> Result<usize, Error> {
    let statements: Vec<PreparedStatement> = serde_json::from_str(json)
        .map_err(|e| Error::Config(format!("invalid statements file: {}", e)))?;

    for statement in &statements {
        let expected = statement_id(&statement.name, statement.role.as_str());
        if statement.id != expected {
            return Err(Error::Config(format!(
                "statement '{}' for role '{}' has id {} but should have {}",
                statement.name, statement.role, statement.id, expected
            )));
        }
        if statement.branches.is_empty() {
            return Err(Error::Config(format!(
                "statement '{}' for role '{}' has no branches",
                statement.name, statement.role
            )));
        }
    }

    for statement in &statements {
        store.put_statement(statement)?;
    }
    store.flush()?;

    info!(count = statements.len(), "imported statements");
    Ok(statements.len())
}

/// Import from a file on disk.
pub fn import_file(store: &StatementStore, path: &Path) -> Result<usize, Error> {
    let json = std::fs::read_to_string(path)?;
    import(store, &json)
}

/// One line per stored statement: id, name and role.
pub fn list(store: &StatementStore) -> Result<Vec<String>, Error> {
    let mut statements = store.statements()?;
    statements.sort_by(|a, b| (&a.name, &a.role).cmp(&(&b.name, &b.role)));

    Ok(statements
        .iter()
        .map(|s| format!("{:016x}\t{}\t{}", s.id, s.name, s.role))
        .collect())
}
