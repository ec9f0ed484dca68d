use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use ledgerkeep_common::{Error, Result};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crud::{self, BindParams, FromRow};
use crate::schema::{NOW, Schema};

/// One applied migration, as stored in the `migrations` history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub entity: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FromRow for MigrationRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity: row.get(1)?,
            version: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

struct NewRecord<'a> {
    entity: &'a str,
    version: u32,
}

impl BindParams for NewRecord<'_> {
    fn named_params(&self) -> Vec<(&'static str, &dyn ToSql)> {
        vec![
            (":entity", &self.entity as &dyn ToSql),
            (":version", &self.version as &dyn ToSql),
        ]
    }
}

const COLUMNS: &str = "id, entity, version, created_at, updated_at, deleted_at";

/// Persistence for applied-migration history inside the target schema.
///
/// Only ever appends. The engine never updates or deletes history rows, and
/// ignores `deleted_at`.
pub struct HistoryStore {
    table: String,
    sql_insert: String,
    sql_select_by_id: String,
    sql_list: String,
}

impl HistoryStore {
    pub fn new(schema: &Schema) -> Self {
        let table = schema.qualify("migrations");
        Self {
            sql_insert: format!(
                "INSERT INTO {table} (entity, version) VALUES (:entity, :version) RETURNING id"
            ),
            sql_select_by_id: format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1"),
            sql_list: format!("SELECT {COLUMNS} FROM {table}"),
            table,
        }
    }

    /// Create the history table if it does not exist.
    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity TEXT NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT ({NOW}),
                updated_at TEXT NOT NULL DEFAULT ({NOW}),
                deleted_at TEXT,
                UNIQUE (entity, version)
            );",
            table = self.table
        ))
        .map_err(|e| {
            Error::SchemaSetup(format!("failed to create migration history table: {e}"))
        })
    }

    /// Every recorded migration, in no particular order.
    pub fn list_all(&self, conn: &Connection) -> Result<Vec<MigrationRecord>> {
        crud::select_many(conn, &self.sql_list, [])
    }

    /// Append the record for a successfully executed migration.
    pub fn record(&self, conn: &Connection, entity: &str, version: u32) -> Result<MigrationRecord> {
        let record: MigrationRecord = crud::upsert(
            conn,
            &self.sql_insert,
            &self.sql_select_by_id,
            &NewRecord { entity, version },
        )?;
        debug!(entity, version, id = record.id, "recorded migration");
        Ok(record)
    }
}

/// Group history by entity: `entity -> {applied versions}`.
pub fn applied_versions(records: &[MigrationRecord]) -> HashMap<String, HashSet<u32>> {
    let mut applied: HashMap<String, HashSet<u32>> = HashMap::new();
    for record in records {
        applied
            .entry(record.entity.clone())
            .or_default()
            .insert(record.version);
    }
    applied
}
