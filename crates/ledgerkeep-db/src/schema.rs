use std::path::PathBuf;

use ledgerkeep_common::{Error, Result};
use ledgerkeep_security::InputValidator;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

/// SQL expression for "now" with millisecond precision. Used for column
/// defaults and `updated_at` bumps.
pub(crate) const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

/// Backing storage of an attached schema database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLocation {
    Memory,
    File(PathBuf),
}

impl SchemaLocation {
    fn as_sqlite_path(&self) -> String {
        match self {
            SchemaLocation::Memory => ":memory:".to_string(),
            SchemaLocation::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// A validated target schema: its name, the role that owns it and where it
/// lives. Name and owner are safe to interpolate into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    owner: String,
    location: SchemaLocation,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        location: SchemaLocation,
    ) -> Result<Self> {
        let name = name.into();
        let owner = owner.into();
        InputValidator::validate_schema_name(&name)?;
        InputValidator::validate_identifier("schema owner", &owner)?;
        Ok(Self {
            name,
            owner,
            location,
        })
    }

    pub fn in_memory(name: impl Into<String>, owner: impl Into<String>) -> Result<Self> {
        Self::new(name, owner, SchemaLocation::Memory)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn location(&self) -> &SchemaLocation {
        &self.location
    }

    /// Schema-qualified name for a table or index, e.g. `"ledger".migrations`.
    pub fn qualify(&self, object: &str) -> String {
        format!("\"{}\".{object}", self.name)
    }
}

/// Attach the schema database to `conn` unless it is already attached.
/// Returns whether an `ATTACH` was issued.
pub fn attach(conn: &Connection, schema: &Schema) -> rusqlite::Result<bool> {
    let attached: bool = conn.query_row(
        "SELECT count(*) > 0 FROM pragma_database_list WHERE name = ?1",
        params![schema.name()],
        |row| row.get(0),
    )?;
    if attached {
        return Ok(false);
    }

    conn.execute(
        &format!("ATTACH DATABASE ?1 AS \"{}\"", schema.name()),
        params![schema.location.as_sqlite_path()],
    )?;
    debug!("attached schema {} ({:?})", schema.name(), schema.location);
    Ok(true)
}

/// Make sure the schema exists on this connection and records its owner.
///
/// This is the SQLite rendering of
/// `CREATE SCHEMA IF NOT EXISTS <schema> AUTHORIZATION <owner>`: the schema is
/// an attached database, and the owning role is kept in its
/// `schema_authorization` table. Safe to call on every startup.
pub fn ensure_schema(conn: &Connection, schema: &Schema) -> Result<()> {
    let setup = |e: rusqlite::Error| {
        Error::SchemaSetup(format!("failed to create schema {}: {e}", schema.name()))
    };

    attach(conn, schema).map_err(setup)?;

    let table = schema.qualify("schema_authorization");
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT ({NOW})
        );"
    ))
    .map_err(setup)?;

    let existing: Option<String> = conn
        .query_row(&format!("SELECT owner FROM {table} LIMIT 1"), [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(setup)?;

    match existing {
        None => {
            conn.execute(
                &format!("INSERT INTO {table} (owner) VALUES (?1)"),
                params![schema.owner()],
            )
            .map_err(setup)?;
            info!(
                "created schema {} authorization {}",
                schema.name(),
                schema.owner()
            );
        }
        Some(owner) if owner != schema.owner() => {
            // Same as an existing schema under IF NOT EXISTS: keep it as is.
            warn!(
                "schema {} already exists and is owned by {owner}, not {}",
                schema.name(),
                schema.owner()
            );
        }
        Some(_) => debug!("schema {} already exists", schema.name()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::in_memory("ledger", "ledger_admin").unwrap()
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        assert!(Schema::in_memory("ledger; DROP TABLE x", "admin").is_err());
        assert!(Schema::in_memory("ledger", "admin\" --").is_err());
        assert!(Schema::in_memory("main", "admin").is_err());
    }

    #[test]
    fn qualify_quotes_schema_name() {
        assert_eq!(schema().qualify("migrations"), "\"ledger\".migrations");
    }

    #[test]
    fn attach_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(attach(&conn, &schema()).unwrap());
        assert!(!attach(&conn, &schema()).unwrap());
    }

    #[test]
    fn ensure_schema_records_owner_once() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, &schema()).unwrap();
        ensure_schema(&conn, &schema()).unwrap();

        let owners: Vec<String> = conn
            .prepare("SELECT owner FROM \"ledger\".schema_authorization")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(owners, vec!["ledger_admin".to_string()]);
    }

    #[test]
    fn ensure_schema_keeps_existing_owner() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, &schema()).unwrap();

        let other = Schema::in_memory("ledger", "someone_else").unwrap();
        ensure_schema(&conn, &other).unwrap();

        let owner: String = conn
            .query_row(
                "SELECT owner FROM \"ledger\".schema_authorization",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(owner, "ledger_admin");
    }

    #[test]
    fn unreachable_schema_file_is_a_setup_error() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = Schema::new(
            "ledger",
            "admin",
            SchemaLocation::File(PathBuf::from("/nonexistent-dir/deeper/ledger.db")),
        )
        .unwrap();
        assert!(matches!(
            ensure_schema(&conn, &schema),
            Err(Error::SchemaSetup(_))
        ));
    }
}
